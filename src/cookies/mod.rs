//! Browser cookie extraction.
//!
//! Looks up the session cookies a logged-in browser holds for the RIDI
//! account domain, so the device list can be fetched on the user's behalf.
//! Cookie values are secrets: they are never logged and only leave this
//! module inside a [`CookieJar`].

mod browser;
mod decrypt;
mod netscape;
mod sqlite;

pub use browser::{Browser, Schema, StoreLocator};
pub use decrypt::{CipherKey, Decryptor};
pub use netscape::{NetscapeCookieFile, NetscapeError};
pub use sqlite::{CHROME_EPOCH_OFFSET_MICROS, chrome_expiry_to_unix, firefox_expiry_to_unix};

use crate::error::CookieStoreError;
use crate::platform::Platform;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Domain substring the account cookies are scoped to.
pub const COOKIE_DOMAIN: &str = "ridibooks.com";

/// Name/value pairs for one domain, taken from one browser profile.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    /// Adds a cookie; the first value seen for a name is kept.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.entry(name.into()).or_insert_with(|| value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Cookie names, for diagnostics.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cookies.keys().map(String::as_str)
    }

    /// Renders the jar as a `Cookie` request header value.
    pub fn to_header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl std::fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieJar")
            .field("names", &self.cookies.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Something that can hand out cookie jars per browser.
pub trait CookieSource: Send + Sync {
    /// Browsers with a store present, in the order they should be tried.
    fn browsers(&self) -> Vec<Browser>;

    /// Reads live cookies for `domain` from one browser's store.
    fn read(&self, browser: Browser, domain: &str) -> Result<CookieJar, CookieStoreError>;
}

/// Reads cookie databases from the local browser profiles.
#[derive(Debug, Clone)]
pub struct CookieStoreReader {
    platform: Platform,
    locator: Option<StoreLocator>,
}

impl CookieStoreReader {
    /// Creates a reader for the current user's profiles.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            locator: StoreLocator::from_env(),
        }
    }

    /// Creates a reader rooted at an explicit set of base directories.
    pub fn with_locator(platform: Platform, locator: StoreLocator) -> Self {
        Self {
            platform,
            locator: Some(locator),
        }
    }

    /// Tries each installed browser in priority order and returns the first usable jar.
    pub fn read_any(&self, domain: &str) -> Result<(Browser, CookieJar), CookieStoreError> {
        let browsers = self.browsers();
        if browsers.is_empty() {
            return Err(CookieStoreError::NoCookieStoreFound);
        }

        let mut last_error = CookieStoreError::NoCookieStoreFound;
        for browser in browsers {
            match self.read(browser, domain) {
                Ok(jar) => return Ok((browser, jar)),
                Err(err) => {
                    tracing::debug!("{} cookie store: {}", browser, err);
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }
}

impl CookieSource for CookieStoreReader {
    fn browsers(&self) -> Vec<Browser> {
        let Some(locator) = &self.locator else {
            return Vec::new();
        };
        self.platform
            .browsers()
            .iter()
            .copied()
            .filter(|browser| locator.locate(*browser, self.platform).is_some())
            .collect()
    }

    fn read(&self, browser: Browser, domain: &str) -> Result<CookieJar, CookieStoreError> {
        let path = self
            .locator
            .as_ref()
            .and_then(|locator| locator.locate(browser, self.platform))
            .ok_or_else(|| {
                CookieStoreError::StoreUnreadable(format!(
                    "no {} cookie store on {}",
                    browser, self.platform
                ))
            })?;

        tracing::debug!("reading {} cookies from {}", browser, path.display());
        let decryptor = Decryptor::system(browser, &path);
        let jar = sqlite::read_store(&path, browser.schema(), domain, unix_now(), &decryptor)?;
        tracing::debug!(
            "{} cookie store yielded {} cookie(s) for {}",
            browser,
            jar.len(),
            domain
        );
        Ok(jar)
    }
}

/// Current time in seconds since the Unix epoch.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::sqlite::fixtures::{chromium_db, firefox_db};
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_jar_header_and_debug() {
        let mut jar = CookieJar::default();
        jar.insert("b", "2");
        jar.insert("a", "1");
        jar.insert("a", "ignored");

        assert_eq!(jar.to_header_value(), "a=1; b=2");
        let debug = format!("{:?}", jar);
        assert!(debug.contains("\"a\""));
        assert!(!debug.contains('1'));
    }

    #[test]
    fn test_unknown_platform_has_no_store() {
        let home = TempDir::new().unwrap();
        let reader =
            CookieStoreReader::with_locator(Platform::Unknown, StoreLocator::with_home(home.path()));
        assert_eq!(
            reader.read_any(COOKIE_DOMAIN).unwrap_err(),
            CookieStoreError::NoCookieStoreFound
        );
    }

    #[test]
    fn test_missing_browser_is_unreadable() {
        let home = TempDir::new().unwrap();
        let reader =
            CookieStoreReader::with_locator(Platform::Linux, StoreLocator::with_home(home.path()));
        assert!(reader.browsers().is_empty());
        assert!(matches!(
            reader.read(Browser::Chrome, COOKIE_DOMAIN),
            Err(CookieStoreError::StoreUnreadable(_))
        ));
    }

    #[test]
    fn test_read_any_skips_unreadable_store() {
        let home = TempDir::new().unwrap();
        let firefox = home.path().join(".mozilla/firefox/p.default-release/cookies.sqlite");
        std::fs::create_dir_all(firefox.parent().unwrap()).unwrap();
        std::fs::write(&firefox, b"locked or corrupt, either way not a database").unwrap();

        let chrome = home.path().join(".config/google-chrome/Default/Cookies");
        chromium_db(&chrome, &[(".ridibooks.com", "ridi-at", "token", 0)]);

        let reader =
            CookieStoreReader::with_locator(Platform::Linux, StoreLocator::with_home(home.path()));
        assert_eq!(reader.browsers(), vec![Browser::Firefox, Browser::Chrome]);

        let (browser, jar) = reader.read_any(COOKIE_DOMAIN).unwrap();
        assert_eq!(browser, Browser::Chrome);
        assert_eq!(jar.get("ridi-at"), Some("token"));
    }

    #[test]
    fn test_read_firefox_store() {
        let home = TempDir::new().unwrap();
        let firefox = home.path().join(".mozilla/firefox/p.default/cookies.sqlite");
        firefox_db(&firefox, &[("ridibooks.com", "ridi-rt", "refresh", unix_now() + 600)]);

        let reader =
            CookieStoreReader::with_locator(Platform::Linux, StoreLocator::with_home(home.path()));
        let jar = reader.read(Browser::Firefox, COOKIE_DOMAIN).unwrap();
        assert_eq!(jar.get("ridi-rt"), Some("refresh"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_read_encrypted_chrome_store() {
        use super::decrypt::{PEANUTS_KEY, seal};
        use super::sqlite::fixtures::chromium_encrypted;

        let home = TempDir::new().unwrap();
        let chrome = home.path().join(".config/google-chrome/Default/Cookies");
        chromium_encrypted(
            &chrome,
            &[(".ridibooks.com", "ridi-at", seal::cbc(b"v10", &PEANUTS_KEY, b"token"), 0)],
        );

        let reader =
            CookieStoreReader::with_locator(Platform::Linux, StoreLocator::with_home(home.path()));
        let jar = reader.read(Browser::Chrome, COOKIE_DOMAIN).unwrap();
        assert_eq!(jar.get("ridi-at"), Some("token"));
    }
}
