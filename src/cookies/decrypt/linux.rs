//! Secret Service (GNOME Keyring, KWallet bridge) lookup of the `v11` secret.

use crate::cookies::Browser;
use crate::error::DecryptError;
use secret_service::EncryptionType;
use secret_service::blocking::SecretService;
use std::collections::HashMap;

/// The `application` attribute Chromium stores its secret under.
fn application(browser: Browser) -> &'static str {
    match browser {
        Browser::Chrome => "chrome",
        Browser::Brave => "brave",
        _ => "chromium",
    }
}

/// The browser's keyring secret; `None` when the keyring holds no entry.
pub fn keyring_secret(browser: Browser) -> Result<Option<Vec<u8>>, DecryptError> {
    let unavailable = |e: secret_service::Error| {
        DecryptError::KeyUnavailable(format!("secret service: {}", e))
    };

    let service = SecretService::connect(EncryptionType::Dh).map_err(unavailable)?;
    let found = service
        .search_items(HashMap::from([("application", application(browser))]))
        .map_err(unavailable)?;

    let Some(item) = found.unlocked.first().or_else(|| found.locked.first()) else {
        return Ok(None);
    };
    if found.unlocked.is_empty() {
        item.unlock().map_err(unavailable)?;
    }
    item.get_secret().map(Some).map_err(unavailable)
}
