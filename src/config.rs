//! The credential config file shared with the downstream tool.
//!
//! The file is flat TOML at `~/.ridiculous.toml`. Only `device_id` and
//! `user_idx` belong to us; every other key is a tool preference that is
//! carried through unchanged. An existing file is always copied to a
//! timestamped backup before it is replaced, and the replacement itself is
//! atomic.

use crate::error::ConfigError;
use crate::record::DeviceRecord;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use toml::{Table, Value};

/// Config filename, placed in the home directory.
pub const CONFIG_FILENAME: &str = ".ridiculous.toml";

/// Marker between the config path and the timestamp of a backup.
const BACKUP_MARKER: &str = ".backup.";

/// Tool preferences stored next to the credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences(Table);

impl Default for Preferences {
    /// Preferences for a freshly created file.
    fn default() -> Self {
        let mut table = Table::new();
        table.insert("verbose".to_string(), Value::Boolean(false));
        table.insert("organize_output".to_string(), Value::Boolean(false));
        table.insert("backup_originals".to_string(), Value::Boolean(true));
        table.insert("max_retries".to_string(), Value::Integer(3));
        table.insert("timeout_seconds".to_string(), Value::Integer(30));
        Self(table)
    }
}

impl Preferences {
    pub fn empty() -> Self {
        Self(Table::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Sets a preference; the credential keys are not preferences and are ignored.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        if !is_credential_key(&key) {
            self.0.insert(key, value.into());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn is_credential_key(key: &str) -> bool {
    key == "device_id" || key == "user_idx"
}

/// The persisted form of a credential record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigRecord {
    pub device_id: String,
    pub user_idx: String,
    pub preferences: Preferences,
}

/// What a [`ConfigStore::write`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Backup of the previous file, if one was replaced.
    pub backup: Option<PathBuf>,

    /// True when the file already held exactly this content.
    pub unchanged: bool,
}

/// Sole owner of the on-disk config file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Returns `~/.ridiculous.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(CONFIG_FILENAME))
            .ok_or(ConfigError::NoHomeDir)
    }

    /// Store at the default location.
    pub fn open_default() -> Result<Self, ConfigError> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the config file.
    pub fn read(&self) -> Result<ConfigRecord, ConfigError> {
        let mut table = self.load_table()?;

        let device_id = take_text(&mut table, "device_id")?;
        let user_idx = take_text(&mut table, "user_idx")?;

        Ok(ConfigRecord {
            device_id,
            user_idx,
            preferences: Preferences(table),
        })
    }

    /// Preferences of the current file, or the defaults when it is missing or unreadable.
    ///
    /// Blank or missing credentials do not matter here; every other key is kept.
    pub fn preferences_or_default(&self) -> Preferences {
        match self.load_table() {
            Ok(mut table) => {
                table.retain(|key, _| !is_credential_key(key));
                Preferences(table)
            }
            Err(ConfigError::NotFound(_)) => Preferences::default(),
            Err(e) => {
                tracing::warn!("ignoring preferences from {}: {}", self.path.display(), e);
                Preferences::default()
            }
        }
    }

    /// The file as a raw TOML table.
    fn load_table(&self) -> Result<Table, ConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Persists `record` with `preferences`, backing up any existing file first.
    pub fn write(
        &self,
        record: &DeviceRecord,
        preferences: &Preferences,
    ) -> Result<WriteOutcome, ConfigError> {
        let content = render(record, preferences)?;

        let existing = match std::fs::read_to_string(&self.path) {
            Ok(existing) => Some(existing),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        if existing.as_deref() == Some(content.as_str()) {
            tracing::debug!("{} already up to date", self.path.display());
            return Ok(WriteOutcome {
                backup: None,
                unchanged: true,
            });
        }

        let backup = match existing {
            Some(_) => Some(self.back_up()?),
            None => None,
        };

        self.replace(&content)?;
        tracing::info!(
            "wrote credentials for device {} to {}",
            record.masked_device_id(),
            self.path.display()
        );

        Ok(WriteOutcome {
            backup,
            unchanged: false,
        })
    }

    /// Backups of this config file, oldest first.
    pub fn backups(&self) -> Result<Vec<PathBuf>, ConfigError> {
        let Some(parent) = self.parent_dir() else {
            return Ok(Vec::new());
        };
        let Some(file_name) = self.path.file_name().and_then(|n| n.to_str()) else {
            return Ok(Vec::new());
        };
        let prefix = format!("{}{}", file_name, BACKUP_MARKER);

        let mut backups: Vec<PathBuf> = std::fs::read_dir(parent)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
            })
            .collect();
        backups.sort_by_key(|path| backup_sort_key(path, &prefix));
        Ok(backups)
    }

    fn parent_dir(&self) -> Option<&Path> {
        match self.path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Some(Path::new(".")),
            other => other,
        }
    }

    /// Copies the current file to a fresh backup path.
    fn back_up(&self) -> Result<PathBuf, ConfigError> {
        let backup = self.next_backup_path();
        std::fs::copy(&self.path, &backup).map_err(|source| ConfigError::BackupFailed {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!("backed up {} to {}", self.path.display(), backup.display());
        Ok(backup)
    }

    fn next_backup_path(&self) -> PathBuf {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let base = format!("{}{}{}", self.path.display(), BACKUP_MARKER, secs);

        let mut candidate = PathBuf::from(&base);
        let mut n = 1;
        while candidate.exists() {
            candidate = PathBuf::from(format!("{}.{}", base, n));
            n += 1;
        }
        candidate
    }

    /// Atomically replaces the config file with `content`.
    fn replace(&self, content: &str) -> Result<(), ConfigError> {
        let parent = self.parent_dir().unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent)?;

        let mut staged = NamedTempFile::new_in(parent)?;
        staged.write_all(content.as_bytes())?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|e| ConfigError::Io(e.error))?;
        Ok(())
    }
}

/// Serializes a record and its preferences as flat TOML.
fn render(record: &DeviceRecord, preferences: &Preferences) -> Result<String, ConfigError> {
    let mut table = Table::new();
    table.insert("device_id".to_string(), Value::String(record.device_id.clone()));
    table.insert("user_idx".to_string(), Value::String(record.user_idx.clone()));
    for (key, value) in &preferences.0 {
        if !is_credential_key(key) {
            table.insert(key.clone(), value.clone());
        }
    }
    toml::to_string(&table).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Removes a credential key, accepting either a string or an integer.
fn take_text(table: &mut Table, key: &str) -> Result<String, ConfigError> {
    match table.remove(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        Some(Value::Integer(n)) => Ok(n.to_string()),
        _ => Err(ConfigError::MissingValue(key.to_string())),
    }
}

/// Orders backups by timestamp, then by collision suffix.
fn backup_sort_key(path: &Path, prefix: &str) -> (u64, u32) {
    let suffix = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix(prefix))
        .unwrap_or_default();
    let mut parts = suffix.splitn(2, '.');
    let secs = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let n = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    (secs, n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record() -> DeviceRecord {
        DeviceRecord::new("12345678-1234-1234-1234-123456789abc", "87654321", "Phone")
    }

    fn store(dir: &TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().join(CONFIG_FILENAME))
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(store(&dir).read(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let outcome = store.write(&record(), &Preferences::default()).unwrap();
        assert_eq!(outcome.backup, None);
        assert!(!outcome.unchanged);

        let loaded = store.read().unwrap();
        assert_eq!(loaded.device_id, "12345678-1234-1234-1234-123456789abc");
        assert_eq!(loaded.user_idx, "87654321");
        assert_eq!(loaded.preferences, Preferences::default());
    }

    #[test]
    fn test_identical_write_makes_one_backup() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(store.path(), "device_id = \"old\"\nuser_idx = \"1\"\n").unwrap();

        let first = store.write(&record(), &Preferences::default()).unwrap();
        let after_first = std::fs::read_to_string(store.path()).unwrap();
        let second = store.write(&record(), &Preferences::default()).unwrap();
        let after_second = std::fs::read_to_string(store.path()).unwrap();

        assert!(first.backup.is_some());
        assert!(second.unchanged);
        assert_eq!(after_first, after_second);

        let backups = store.backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(
            std::fs::read_to_string(&backups[0]).unwrap(),
            "device_id = \"old\"\nuser_idx = \"1\"\n"
        );
    }

    #[test]
    fn test_backup_names_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.write(&record(), &Preferences::empty()).unwrap();
        let other = DeviceRecord::new("abcdefabcdefabcdefabcdefabcdefab", "123456789", "Laptop");
        store.write(&other, &Preferences::empty()).unwrap();
        store.write(&record(), &Preferences::empty()).unwrap();

        let backups = store.backups().unwrap();
        assert_eq!(backups.len(), 2);
        assert_ne!(backups[0], backups[1]);
        // The newest backup holds the state just before the last write.
        assert!(std::fs::read_to_string(&backups[1]).unwrap().contains("123456789"));
    }

    #[test]
    fn test_preferences_pass_through() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(
            store.path(),
            "device_id = \"old\"\nuser_idx = 42\nmax_retries = 7\noutput_dir = \"/books\"\n",
        )
        .unwrap();

        let existing = store.read().unwrap();
        assert_eq!(existing.user_idx, "42");

        let preferences = store.preferences_or_default();
        store.write(&record(), &preferences).unwrap();

        let loaded = store.read().unwrap();
        assert_eq!(loaded.preferences.get("max_retries"), Some(&Value::Integer(7)));
        assert_eq!(
            loaded.preferences.get("output_dir"),
            Some(&Value::String("/books".to_string()))
        );
        assert_eq!(loaded.preferences.get("device_id"), None);
    }

    #[test]
    fn test_missing_and_unparsable() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        std::fs::write(store.path(), "user_idx = \"87654321\"\n").unwrap();
        assert!(matches!(store.read(), Err(ConfigError::MissingValue(key)) if key == "device_id"));

        std::fs::write(store.path(), "device_id = \n").unwrap();
        assert!(matches!(store.read(), Err(ConfigError::ParseError(_))));
        assert_eq!(store.preferences_or_default(), Preferences::default());
    }

    #[test]
    fn test_blank_credentials_keep_preferences() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(
            store.path(),
            "device_id = \"\"\noutput_directory = \"/books\"\nmax_retries = 9\n",
        )
        .unwrap();
        assert!(matches!(store.read(), Err(ConfigError::MissingValue(_))));

        let preferences = store.preferences_or_default();
        assert_eq!(preferences.get("device_id"), None);
        store.write(&record(), &preferences).unwrap();

        let loaded = store.read().unwrap();
        assert_eq!(loaded.device_id, "12345678-1234-1234-1234-123456789abc");
        assert_eq!(loaded.preferences.get("max_retries"), Some(&Value::Integer(9)));
        assert_eq!(
            loaded.preferences.get("output_directory"),
            Some(&Value::String("/books".to_string()))
        );
        assert_eq!(loaded.preferences.get("verbose"), None);
    }

    #[test]
    fn test_set_ignores_credential_keys() {
        let mut preferences = Preferences::empty();
        preferences.set("device_id", "sneaky");
        preferences.set("verbose", true);
        assert_eq!(preferences.len(), 1);
        assert_eq!(preferences.get("verbose"), Some(&Value::Boolean(true)));
    }

    #[cfg(unix)]
    #[test]
    fn test_backup_failure_aborts_write() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join("home");
        std::fs::create_dir(&config_dir).unwrap();
        let store = ConfigStore::new(config_dir.join(CONFIG_FILENAME));
        std::fs::write(store.path(), "device_id = \"old\"\nuser_idx = \"1\"\n").unwrap();

        // Read-only directory: the file stays readable, the backup cannot be created.
        std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o500)).unwrap();
        let privileged = std::fs::write(config_dir.join("write-check"), "").is_ok();

        let result = store.write(&record(), &Preferences::default());
        std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700)).unwrap();
        if privileged {
            return;
        }

        assert!(matches!(result, Err(ConfigError::BackupFailed { .. })));
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "device_id = \"old\"\nuser_idx = \"1\"\n"
        );
        assert!(store.backups().unwrap().is_empty());
    }
}
