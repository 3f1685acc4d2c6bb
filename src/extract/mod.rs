//! Turning a device-list payload into candidate records.
//!
//! Parsing backends form a fixed-priority chain that is assembled once
//! per extractor, then each backend is asked in turn. A backend that decodes
//! the payload gives the final verdict; only a decode failure passes the
//! payload on to the next, more forgiving backend.

mod jq;
mod json;
mod regex_scan;

pub use jq::JqBackend;
pub use json::JsonBackend;
pub use regex_scan::RegexBackend;

use crate::error::ExtractError;
use crate::record::{CandidateSet, DeviceRecord, UNKNOWN_DEVICE};
use async_trait::async_trait;

/// A strategy for pulling device records out of a payload.
#[async_trait]
pub trait ExtractorBackend: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Extracts candidates in payload order.
    ///
    /// Returns `MalformedJson` when the payload cannot be decoded at all,
    /// and `NoDeviceFields` when it decodes but holds no usable entry.
    async fn extract(&self, payload: &str) -> Result<CandidateSet, ExtractError>;
}

/// Ordered chain of extractor backends.
pub struct CredentialExtractor {
    backends: Vec<Box<dyn ExtractorBackend>>,
}

impl Default for CredentialExtractor {
    fn default() -> Self {
        Self::detect()
    }
}

impl CredentialExtractor {
    /// Builds the chain from what is available: JSON library, `jq`, then regex.
    pub fn detect() -> Self {
        let mut backends: Vec<Box<dyn ExtractorBackend>> = vec![Box::new(JsonBackend::new())];
        if let Some(jq) = JqBackend::locate() {
            backends.push(Box::new(jq));
        }
        backends.push(Box::new(RegexBackend));
        Self { backends }
    }

    /// Builds a chain from explicit backends.
    pub fn with_backends(backends: Vec<Box<dyn ExtractorBackend>>) -> Self {
        Self { backends }
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Runs the chain over `payload`.
    pub async fn extract(&self, payload: &str) -> Result<CandidateSet, ExtractError> {
        let mut failures = Vec::new();

        for backend in &self.backends {
            match backend.extract(payload).await {
                Ok(candidates) => {
                    tracing::debug!(
                        "{} backend extracted {} candidate(s)",
                        backend.name(),
                        candidates.len()
                    );
                    return Ok(candidates);
                }
                Err(ExtractError::NoDeviceFields) => {
                    tracing::debug!("{} backend: no device fields", backend.name());
                    return Err(ExtractError::NoDeviceFields);
                }
                Err(ExtractError::MalformedJson(reason)) => {
                    tracing::debug!("{} backend could not decode payload: {}", backend.name(), reason);
                    failures.push(format!("{}: {}", backend.name(), reason));
                }
            }
        }

        Err(ExtractError::MalformedJson(if failures.is_empty() {
            "no extractor backend available".to_string()
        } else {
            failures.join("; ")
        }))
    }
}

/// Builds a record from raw fields, applying the display-name default.
fn candidate(
    device_id: &str,
    user_idx: &str,
    device_name: Option<&str>,
    os: Option<&str>,
) -> DeviceRecord {
    let name = device_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_DEVICE);
    DeviceRecord::new(device_id.trim(), user_idx.trim(), name).with_os_hint(os.unwrap_or_default())
}
