//! Netscape HTTP cookie files, as exported by browser extensions.
//!
//! Used when the browser's own database cannot be read (encrypted values,
//! unsupported browser) and the user exports cookies by hand.

use super::CookieJar;
use std::path::Path;
use thiserror::Error;

/// Cookie entry parsed from a Netscape cookie file.
#[derive(Clone, PartialEq, Eq)]
struct NetscapeCookie {
    domain: String,
    expires_unix: Option<i64>,
    name: String,
    value: String,
}

/// Errors that can occur while loading a cookie file.
#[derive(Error, Debug)]
pub enum NetscapeError {
    /// Failed to read the file.
    #[error("Failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// Cookie file contains an invalid line.
    #[error("Invalid Netscape cookie line {0}")]
    InvalidLine(usize),
}

/// A parsed cookie file.
pub struct NetscapeCookieFile {
    cookies: Vec<NetscapeCookie>,
}

impl NetscapeCookieFile {
    /// Loads and parses the file at `path`.
    pub fn load(path: &Path) -> Result<Self, NetscapeError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses cookie file content.
    ///
    /// Errors name the offending line number only; lines carry cookie values.
    pub fn parse(content: &str) -> Result<Self, NetscapeError> {
        let mut cookies = Vec::new();

        for (index, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            let line = if let Some(stripped) = line.strip_prefix("#HttpOnly_") {
                stripped
            } else if line.starts_with('#') {
                continue;
            } else {
                line
            };

            let invalid = || NetscapeError::InvalidLine(index + 1);
            let mut parts = line.splitn(7, '\t');
            let domain = parts.next().ok_or_else(invalid)?;
            let _include_subdomains = parts.next().ok_or_else(invalid)?;
            let _path = parts.next().ok_or_else(invalid)?;
            let _secure = parts.next().ok_or_else(invalid)?;
            let expires_raw = parts.next().ok_or_else(invalid)?;
            let name = parts.next().ok_or_else(invalid)?;
            let value = parts.next().ok_or_else(invalid)?;

            let expires_unix = expires_raw
                .parse::<i64>()
                .ok()
                .filter(|ts| *ts > 0);

            cookies.push(NetscapeCookie {
                domain: domain.to_string(),
                expires_unix,
                name: name.to_string(),
                value: value.to_string(),
            });
        }

        Ok(Self { cookies })
    }

    /// Returns live cookies whose domain contains `domain`.
    pub fn jar_for(&self, domain: &str, now_unix: i64) -> CookieJar {
        let mut jar = CookieJar::default();
        for cookie in &self.cookies {
            if !cookie.domain.contains(domain) {
                continue;
            }
            if cookie.expires_unix.is_some_and(|ts| ts <= now_unix) {
                continue;
            }
            jar.insert(cookie.name.clone(), cookie.value.clone());
        }
        jar
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

impl std::fmt::Debug for NetscapeCookieFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetscapeCookieFile")
            .field(
                "names",
                &self.cookies.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_parse_netscape_cookie_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ridibooks-cookies.txt");
        let content = r#"
# Netscape HTTP Cookie File
.ridibooks.com	TRUE	/	TRUE	2145916800	ridi-at	abc123
#HttpOnly_.ridibooks.com	FALSE	/	FALSE	0	ridi-rt	idvalue
.example.com	TRUE	/	TRUE	2145916800	other	zzz
        "#;
        std::fs::write(&path, content).unwrap();

        let file = NetscapeCookieFile::load(&path).unwrap();
        assert_eq!(file.len(), 3);

        let jar = file.jar_for("ridibooks.com", NOW);
        assert_eq!(jar.len(), 2);
        assert_eq!(jar.get("ridi-at"), Some("abc123"));
        assert_eq!(jar.get("ridi-rt"), Some("idvalue"));
        assert_eq!(jar.get("other"), None);
    }

    #[test]
    fn test_expired_cookies_are_dropped() {
        let content = format!(".ridibooks.com\tTRUE\t/\tTRUE\t{}\tridi-at\told\n", NOW - 1);
        let file = NetscapeCookieFile::parse(&content).unwrap();
        assert!(file.jar_for("ridibooks.com", NOW).is_empty());
    }

    #[test]
    fn test_parse_invalid_line() {
        let err = NetscapeCookieFile::parse("# header\ninvalid-line secret").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Invalid Netscape cookie line 2"));
        assert!(!message.contains("secret"));
    }

    #[test]
    fn test_debug_hides_values() {
        let content = ".ridibooks.com\tTRUE\t/\tTRUE\t0\tridi-at\ttop-secret-token\n";
        let file = NetscapeCookieFile::parse(content).unwrap();
        let debug = format!("{:?}", file);
        assert!(debug.contains("ridi-at"));
        assert!(!debug.contains("top-secret-token"));
    }
}
