//! Keychain lookup of the "Safe Storage" secret.

use crate::cookies::Browser;
use crate::error::DecryptError;
use security_framework::passwords::get_generic_password;

/// `errSecItemNotFound`.
const ITEM_NOT_FOUND: i32 = -25300;

/// Keychain service and account names for a browser.
fn keychain_entry(browser: Browser) -> (&'static str, &'static str) {
    match browser {
        Browser::Chromium => ("Chromium Safe Storage", "Chromium"),
        Browser::Brave => ("Brave Safe Storage", "Brave"),
        Browser::Edge => ("Microsoft Edge Safe Storage", "Microsoft Edge"),
        _ => ("Chrome Safe Storage", "Chrome"),
    }
}

pub fn keychain_secret(browser: Browser) -> Result<Vec<u8>, DecryptError> {
    let (service, account) = keychain_entry(browser);
    get_generic_password(service, account).map_err(|e| {
        if e.code() == ITEM_NOT_FOUND {
            DecryptError::KeyUnavailable(format!("no \"{}\" Keychain entry", service))
        } else {
            DecryptError::KeyUnavailable(format!("Keychain: {}", e))
        }
    })
}
