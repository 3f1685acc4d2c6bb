//! Browser cookie store locations.
//!
//! Paths differ per browser and per operating system; this module is the
//! only place that knows about them.

use crate::platform::Platform;
use std::path::{Path, PathBuf};

/// Browsers whose cookie database can be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Browser {
    Chrome,
    Chromium,
    Brave,
    Edge,
    Firefox,
}

/// On-disk cookie database layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// `cookies` table, expiry in microseconds since 1601-01-01.
    Chromium,
    /// `moz_cookies` table, expiry in Unix seconds (milliseconds on newer builds).
    Firefox,
}

impl Browser {
    pub fn name(self) -> &'static str {
        match self {
            Browser::Chrome => "chrome",
            Browser::Chromium => "chromium",
            Browser::Brave => "brave",
            Browser::Edge => "edge",
            Browser::Firefox => "firefox",
        }
    }

    pub fn schema(self) -> Schema {
        match self {
            Browser::Firefox => Schema::Firefox,
            _ => Schema::Chromium,
        }
    }
}

impl std::fmt::Display for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Base directories that browser profiles live under.
#[derive(Debug, Clone)]
pub struct StoreLocator {
    home: PathBuf,
    /// XDG config dir (`~/.config`).
    config: PathBuf,
    /// `%LOCALAPPDATA%`.
    local_app_data: PathBuf,
    /// `%APPDATA%`.
    app_data: PathBuf,
}

impl StoreLocator {
    /// Resolves base directories for the current user.
    pub fn from_env() -> Option<Self> {
        let home = dirs::home_dir()?;
        let mut locator = Self::with_home(&home);
        if let Some(config) = dirs::config_dir() {
            locator.config = config;
        }
        if cfg!(windows) {
            if let Some(local) = dirs::data_local_dir() {
                locator.local_app_data = local;
            }
            if let Some(roaming) = dirs::data_dir() {
                locator.app_data = roaming;
            }
        }
        Some(locator)
    }

    /// Derives every base directory from a single home directory.
    pub fn with_home(home: &Path) -> Self {
        Self {
            home: home.to_path_buf(),
            config: home.join(".config"),
            local_app_data: home.join("AppData").join("Local"),
            app_data: home.join("AppData").join("Roaming"),
        }
    }

    /// Returns the cookie database for a browser, if one exists on disk.
    pub fn locate(&self, browser: Browser, platform: Platform) -> Option<PathBuf> {
        match browser.schema() {
            Schema::Chromium => self
                .chromium_candidates(browser, platform)
                .into_iter()
                .find(|path| path.is_file()),
            Schema::Firefox => self
                .firefox_profiles_dir(platform)
                .and_then(|dir| find_firefox_cookies(&dir)),
        }
    }

    fn chromium_candidates(&self, browser: Browser, platform: Platform) -> Vec<PathBuf> {
        let user_data = match (platform, browser) {
            (Platform::Linux, Browser::Chrome) => self.config.join("google-chrome"),
            (Platform::Linux, Browser::Chromium) => self.config.join("chromium"),
            (Platform::Linux, Browser::Brave) => {
                self.config.join("BraveSoftware").join("Brave-Browser")
            }
            (Platform::Linux, Browser::Edge) => self.config.join("microsoft-edge"),
            (Platform::MacOS, _) => {
                let support = self.home.join("Library").join("Application Support");
                match browser {
                    Browser::Chrome => support.join("Google").join("Chrome"),
                    Browser::Chromium => support.join("Chromium"),
                    Browser::Brave => support.join("BraveSoftware").join("Brave-Browser"),
                    _ => support.join("Microsoft Edge"),
                }
            }
            (Platform::Windows, _) => {
                let vendor = match browser {
                    Browser::Chrome => self.local_app_data.join("Google").join("Chrome"),
                    Browser::Chromium => self.local_app_data.join("Chromium"),
                    Browser::Brave => self
                        .local_app_data
                        .join("BraveSoftware")
                        .join("Brave-Browser"),
                    _ => self.local_app_data.join("Microsoft").join("Edge"),
                };
                vendor.join("User Data")
            }
            _ => return Vec::new(),
        };

        let profile = user_data.join("Default");
        vec![profile.join("Network").join("Cookies"), profile.join("Cookies")]
    }

    fn firefox_profiles_dir(&self, platform: Platform) -> Option<PathBuf> {
        match platform {
            Platform::Linux => Some(self.home.join(".mozilla").join("firefox")),
            Platform::MacOS => Some(
                self.home
                    .join("Library")
                    .join("Application Support")
                    .join("Firefox")
                    .join("Profiles"),
            ),
            Platform::Windows => Some(self.app_data.join("Mozilla").join("Firefox").join("Profiles")),
            Platform::Unknown => None,
        }
    }
}

/// Picks the `cookies.sqlite` of the most likely default profile.
fn find_firefox_cookies(profiles_dir: &Path) -> Option<PathBuf> {
    let mut best: Option<(u8, PathBuf)> = None;

    for entry in std::fs::read_dir(profiles_dir).ok()?.flatten() {
        let cookies = entry.path().join("cookies.sqlite");
        if !cookies.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        let rank = if name.ends_with(".default-release") {
            0
        } else if name.ends_with(".default") {
            1
        } else {
            2
        };

        if best.as_ref().is_none_or(|(best_rank, _)| rank < *best_rank) {
            best = Some((rank, cookies));
        }
    }

    best.map(|(_, path)| path)
}
