//! Operating system detection and the per-platform browser priority table.

use crate::cookies::Browser;

/// Operating systems with a known cookie store layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Linux,
    Windows,
    Unknown,
}

impl Platform {
    /// Detects the platform this binary was built for.
    pub fn detect() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Maps a `std::env::consts::OS` style identifier to a platform.
    pub fn from_os(os: &str) -> Self {
        match os {
            "macos" => Platform::MacOS,
            "linux" => Platform::Linux,
            "windows" => Platform::Windows,
            _ => Platform::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::MacOS => "macOS",
            Platform::Linux => "Linux",
            Platform::Windows => "Windows",
            Platform::Unknown => "unknown",
        }
    }

    /// Browsers to try, most likely first.
    pub fn browsers(self) -> &'static [Browser] {
        match self {
            Platform::MacOS => &[
                Browser::Chrome,
                Browser::Brave,
                Browser::Edge,
                Browser::Firefox,
            ],
            Platform::Linux => &[
                Browser::Firefox,
                Browser::Chrome,
                Browser::Chromium,
                Browser::Brave,
            ],
            Platform::Windows => &[
                Browser::Chrome,
                Browser::Edge,
                Browser::Brave,
                Browser::Firefox,
            ],
            Platform::Unknown => &[],
        }
    }

    /// True if a device's reported OS or name looks like this platform.
    pub fn matches_hint(self, hint: &str) -> bool {
        let hint = hint.to_ascii_lowercase();
        let tokens: &[&str] = match self {
            Platform::MacOS => &["mac", "osx", "darwin"],
            Platform::Linux => &["linux", "ubuntu", "fedora"],
            Platform::Windows => &["windows", "win32", "win64", "pc"],
            Platform::Unknown => &[],
        };
        tokens.iter().any(|token| hint.contains(token))
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
