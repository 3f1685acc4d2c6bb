//! Structured extraction with `serde_json` and a JSON pointer query.

use super::{ExtractorBackend, candidate};
use crate::error::ExtractError;
use crate::probe::DEVICE_LIST_FIELD;
use crate::record::CandidateSet;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Decodes the payload fully and walks the device list.
pub struct JsonBackend {
    pointer: String,
}

impl Default for JsonBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonBackend {
    /// Backend reading the standard `/result` device list.
    pub fn new() -> Self {
        Self::with_pointer(format!("/{}", DEVICE_LIST_FIELD))
    }

    /// Backend reading the list at an arbitrary JSON pointer.
    pub fn with_pointer(pointer: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
        }
    }
}

#[async_trait]
impl ExtractorBackend for JsonBackend {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn extract(&self, payload: &str) -> Result<CandidateSet, ExtractError> {
        let json: JsonValue = serde_json::from_str(payload)
            .map_err(|e| ExtractError::MalformedJson(e.to_string()))?;

        let Some(JsonValue::Array(devices)) = json.pointer(&self.pointer) else {
            return Err(ExtractError::NoDeviceFields);
        };

        let candidates: CandidateSet = devices
            .iter()
            .filter_map(|device| {
                let device_id = device.get("device_id")?.as_str()?;
                let user_idx = scalar_text(device.get("user_idx")?)?;
                if device_id.trim().is_empty() || user_idx.trim().is_empty() {
                    return None;
                }
                Some(candidate(
                    device_id,
                    &user_idx,
                    device.get("device_name").and_then(JsonValue::as_str),
                    device.get("os").and_then(JsonValue::as_str),
                ))
            })
            .collect();

        if candidates.is_empty() {
            return Err(ExtractError::NoDeviceFields);
        }
        Ok(candidates)
    }
}

/// `user_idx` arrives as a string or as a bare integer.
fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) if n.is_u64() || n.is_i64() => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_multiple_devices_keep_order() {
        let payload = r#"{
            "result": [
                {"device_id": "aaaaaaaa-1111-2222-3333-444444444444", "user_idx": 1234567, "device_name": "Tablet", "os": "android"},
                {"device_id": "bbbbbbbb-1111-2222-3333-444444444444", "user_idx": "7654321"},
                {"device_name": "Broken"}
            ]
        }"#;

        let candidates = JsonBackend::new().extract(payload).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].user_idx, "1234567");
        assert_eq!(candidates[0].os_hint.as_deref(), Some("android"));
        assert_eq!(candidates[1].display_name, "Unknown");
    }

    #[tokio::test]
    async fn test_null_or_missing_list() {
        let backend = JsonBackend::new();
        assert_eq!(backend.extract(r#"{"result":null}"#).await, Err(ExtractError::NoDeviceFields));
        assert_eq!(backend.extract(r#"{"devices":[]}"#).await, Err(ExtractError::NoDeviceFields));
        assert_eq!(
            backend.extract(r#"{"result":[{"device_id":"x"}]}"#).await,
            Err(ExtractError::NoDeviceFields)
        );
    }

    #[tokio::test]
    async fn test_invalid_json() {
        assert!(matches!(
            JsonBackend::new().extract("{\"result\": [").await,
            Err(ExtractError::MalformedJson(_))
        ));
    }

    #[tokio::test]
    async fn test_custom_pointer() {
        let payload = r#"{"data":{"items":[{"device_id":"d-1","user_idx":"123456"}]}}"#;
        let candidates = JsonBackend::with_pointer("/data/items").extract(payload).await.unwrap();
        assert_eq!(candidates[0].device_id, "d-1");
    }
}
