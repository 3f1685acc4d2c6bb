//! Error types for ridikey.
//!
//! Uses `thiserror` for structured error definitions. Every acquisition
//! strategy has its own error type so the pipeline can turn a failure into
//! a precise entry of the attempt trail instead of an opaque message.

use crate::pipeline::Attempt;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single request against the device-list endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Transport failure, timeout or an unexpected server status.
    #[error("API unreachable: {0}")]
    Unreachable(String),

    /// Valid JSON, but the device list is missing, null or empty.
    #[error("API returned an empty device list (not logged in)")]
    EmptyResult,

    /// The server rejected the request or answered with a login page.
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),
}

/// Failure while reading a browser cookie database.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CookieStoreError {
    /// No cookie database exists for any browser on this platform.
    #[error("No browser cookie store found")]
    NoCookieStoreFound,

    /// The store is missing for this browser, locked, or has an unknown schema.
    #[error("Cookie store unreadable: {0}")]
    StoreUnreadable(String),

    /// The store was read, but holds no live cookie for the domain.
    #[error("No unexpired cookies matching '{0}'")]
    NoMatchingCookies(String),

    /// Live cookies exist, but none of their encrypted values could be opened.
    #[error("{skipped} encrypted cookie(s) could not be decrypted: {reason}")]
    Undecryptable { skipped: usize, reason: DecryptError },
}

/// Failure to open one OS-encrypted Chromium cookie value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecryptError {
    /// The key protecting the value could not be fetched from the OS.
    #[error("encryption key unavailable: {0}")]
    KeyUnavailable(String),

    /// The value uses a scheme we cannot open.
    #[error("unsupported encryption scheme: {0}")]
    Unsupported(String),

    /// No available key opened the value.
    #[error("value did not decrypt with any available key")]
    WrongKey,

    /// The decrypted bytes are not text.
    #[error("decrypted value is not UTF-8")]
    NotUtf8,
}

impl From<rusqlite::Error> for CookieStoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                CookieStoreError::StoreUnreadable("database is locked".to_string())
            }
            _ => CookieStoreError::StoreUnreadable(err.to_string()),
        }
    }
}

/// Failure to turn a payload into candidate device records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// No backend could decode the payload.
    #[error("Malformed JSON payload: {0}")]
    MalformedJson(String),

    /// The payload decoded, but no element carries both `device_id` and `user_idx`.
    #[error("No device entry exposes both device_id and user_idx")]
    NoDeviceFields,
}

/// Format warning for a credential pair. Never fatal on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Credential format mismatch (device_id ok: {device_id_ok}, user_idx ok: {user_idx_ok})")]
pub struct ValidationMismatch {
    pub device_id_ok: bool,
    pub user_idx_ok: bool,
}

/// Error type for config store operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file does not exist yet.
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Failed to read or write the config file.
    #[error("Config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// A required key is absent from the config file.
    #[error("Missing required config value: {0}")]
    MissingValue(String),

    /// The previous config could not be backed up; nothing was written.
    #[error("Failed to back up {} before overwriting: {source}", .path.display())]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Home directory could not be determined.
    #[error("Could not determine home directory")]
    NoHomeDir,
}

/// Run-terminating failures of the acquisition pipeline.
///
/// Both variants carry the attempts made so far.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The user gave up during manual entry.
    #[error("Credential entry aborted by user after {} attempt(s)", .attempts.len())]
    UserAborted { attempts: Vec<Attempt> },

    /// The run was interrupted (Ctrl-C).
    #[error("Credential discovery cancelled after {} attempt(s)", .attempts.len())]
    Cancelled { attempts: Vec<Attempt> },
}

impl PipelineError {
    /// Returns the attempt trail collected before the failure.
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            PipelineError::UserAborted { attempts } | PipelineError::Cancelled { attempts } => {
                attempts
            }
        }
    }
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
