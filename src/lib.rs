//! ridikey - finds the RIDI device credentials the `ridiculous` decryption
//! tool needs.
//!
//! This library provides:
//! - Probing the RIDI device-list API with or without browser cookies
//! - Reading session cookies from Chromium-family and Firefox stores
//! - Extracting and validating `device_id`/`user_idx` candidates
//! - Persisting the chosen pair to `~/.ridiculous.toml` with backups

pub mod config;
pub mod console;
pub mod cookies;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod platform;
pub mod probe;
pub mod prompt;
pub mod ranking;
pub mod record;
pub mod validator;
pub mod verify;

// Re-export commonly used types
pub use config::{ConfigRecord, ConfigStore, Preferences};
pub use console::Console;
pub use cookies::{Browser, CookieJar, CookieSource, CookieStoreReader};
pub use error::{ConfigError, CookieStoreError, DecryptError, ExtractError, PipelineError, ProbeError};
pub use extract::CredentialExtractor;
pub use pipeline::{AcquisitionPipeline, Acquisition, Attempt, Interaction, PipelineOptions};
pub use platform::Platform;
pub use probe::{SessionProbe, SessionProber};
pub use record::DeviceRecord;
