//! Candidate credential records.

use crate::validator;

/// Display name used when a payload entry has no `device_name`.
pub const UNKNOWN_DEVICE: &str = "Unknown";

/// Display name for credentials typed in by the user.
pub const MANUAL_ENTRY: &str = "Manual Entry";

/// Display name for credentials passed on the command line.
pub const COMMAND_LINE: &str = "Command Line";

/// One candidate credential set, as reported for a registered device or typed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Opaque device identifier, usually UUID-shaped.
    pub device_id: String,

    /// Numeric user index, kept as a string.
    pub user_idx: String,

    /// Human-readable label, presentation only.
    pub display_name: String,

    /// Operating system reported for the device, used for ranking hints only.
    pub os_hint: Option<String>,
}

/// Candidates in order of appearance in the source payload.
pub type CandidateSet = Vec<DeviceRecord>;

impl DeviceRecord {
    pub fn new(
        device_id: impl Into<String>,
        user_idx: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            user_idx: user_idx.into(),
            display_name: display_name.into(),
            os_hint: None,
        }
    }

    /// Attaches the reported operating system, ignoring blank values.
    pub fn with_os_hint(mut self, os: impl Into<String>) -> Self {
        let os = os.into();
        self.os_hint = if os.trim().is_empty() { None } else { Some(os) };
        self
    }

    /// True iff both fields pass the format validator.
    pub fn is_valid(&self) -> bool {
        validator::check(self).is_ok()
    }

    /// Device id shortened for display; the full value never reaches logs.
    pub fn masked_device_id(&self) -> String {
        let prefix: String = self.device_id.chars().take(8).collect();
        if prefix.len() < self.device_id.len() {
            format!("{}…", prefix)
        } else {
            prefix
        }
    }
}

impl std::fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (device {}, user {})",
            self.display_name,
            self.masked_device_id(),
            self.user_idx
        )?;
        if let Some(os) = &self.os_hint {
            write!(f, " [{}]", os)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_device_id() {
        let record = DeviceRecord::new("12345678-1234-1234-1234-123456789abc", "87654321", "Phone");
        assert_eq!(record.masked_device_id(), "12345678…");

        let short = DeviceRecord::new("abc", "87654321", "Phone");
        assert_eq!(short.masked_device_id(), "abc");
    }

    #[test]
    fn test_blank_os_hint_is_dropped() {
        let record = DeviceRecord::new("id", "123456", "Tablet").with_os_hint("  ");
        assert_eq!(record.os_hint, None);

        let record = DeviceRecord::new("id", "123456", "Tablet").with_os_hint("android");
        assert_eq!(record.os_hint.as_deref(), Some("android"));
    }

    #[test]
    fn test_display_does_not_leak_full_id() {
        let record = DeviceRecord::new("12345678-1234-1234-1234-123456789abc", "87654321", "Phone");
        let shown = record.to_string();
        assert!(shown.contains("Phone"));
        assert!(!shown.contains("123456789abc"));
    }
}
