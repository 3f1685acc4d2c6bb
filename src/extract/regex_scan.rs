//! Last-resort extraction by scanning the raw text.
//!
//! The payload is cut into per-object records at closing braces and each
//! record is scanned for the key/value pairs. Canonical UUIDs are looked
//! for first; the looser pattern can pick up fragments of surrounding
//! JSON, so it is only used when no canonical id appears anywhere.

use super::{ExtractorBackend, candidate};
use crate::error::ExtractError;
use crate::record::CandidateSet;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

static CANONICAL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#""device_id"\s*:\s*"([a-fA-F0-9]{8}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{12})""#,
    )
    .expect("Invalid CANONICAL_ID regex")
});

static LOOSE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""device_id"\s*:\s*"([A-Za-z0-9-]{20,50})""#).expect("Invalid LOOSE_ID regex")
});

static USER_IDX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""user_idx"\s*:\s*"?([0-9]+)"?"#).expect("Invalid USER_IDX regex")
});

static DEVICE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""device_name"\s*:\s*"([^"]*)""#).expect("Invalid DEVICE_NAME regex")
});

static OS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""os"\s*:\s*"([^"]*)""#).expect("Invalid OS regex"));

/// Regex scan over the raw payload text.
pub struct RegexBackend;

impl RegexBackend {
    fn scan(payload: &str, id_pattern: &Regex) -> CandidateSet {
        payload
            .split('}')
            .filter_map(|record| {
                let device_id = id_pattern.captures(record)?.get(1)?.as_str();
                let user_idx = USER_IDX.captures(record)?.get(1)?.as_str();
                let name = DEVICE_NAME
                    .captures(record)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str());
                let os = OS.captures(record).and_then(|c| c.get(1)).map(|m| m.as_str());
                Some(candidate(device_id, user_idx, name, os))
            })
            .collect()
    }
}

#[async_trait]
impl ExtractorBackend for RegexBackend {
    fn name(&self) -> &'static str {
        "regex"
    }

    async fn extract(&self, payload: &str) -> Result<CandidateSet, ExtractError> {
        let canonical = Self::scan(payload, &CANONICAL_ID);
        if !canonical.is_empty() {
            return Ok(canonical);
        }

        let loose = Self::scan(payload, &LOOSE_ID);
        if !loose.is_empty() {
            return Ok(loose);
        }

        Err(ExtractError::MalformedJson(
            "no device_id/user_idx pair found in text".to_string(),
        ))
    }
}
