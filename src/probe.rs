//! Session probing against the RIDI device-list endpoint.
//!
//! A probe is a single GET with a bounded timeout. It never retries;
//! falling back to another strategy is the pipeline's job.

use crate::cookies::CookieJar;
use crate::error::ProbeError;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, COOKIE, HeaderValue};
use serde_json::Value as JsonValue;
use std::time::Duration;
use url::Url;

/// Device list endpoint.
pub const DEVICES_ENDPOINT: &str = "https://account.ridibooks.com/api/user-devices/app";

/// Field of the response holding the device list.
pub const DEVICE_LIST_FIELD: &str = "result";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Anything that can fetch the raw device-list payload.
#[async_trait]
pub trait SessionProbe: Send + Sync {
    /// Fetches the device list, optionally presenting browser cookies.
    async fn probe(&self, jar: Option<&CookieJar>) -> Result<String, ProbeError>;
}

/// HTTP prober for the device-list endpoint.
pub struct SessionProber {
    client: reqwest::Client,
    endpoint: Url,
}

impl SessionProber {
    /// Creates a prober for `endpoint` with the given request timeout.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ridikey/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Unreachable(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    /// Prober for the production endpoint.
    pub fn ridibooks() -> Result<Self, ProbeError> {
        let endpoint = Url::parse(DEVICES_ENDPOINT)
            .map_err(|e| ProbeError::Unreachable(format!("invalid endpoint: {}", e)))?;
        Self::new(endpoint, DEFAULT_TIMEOUT)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl SessionProbe for SessionProber {
    async fn probe(&self, jar: Option<&CookieJar>) -> Result<String, ProbeError> {
        let mut request = self
            .client
            .get(self.endpoint.clone())
            .header(ACCEPT, "application/json");

        if let Some(jar) = jar.filter(|jar| !jar.is_empty()) {
            let value = HeaderValue::from_str(&jar.to_header_value()).map_err(|_| {
                ProbeError::NotAuthenticated("cookie values are not valid header text".to_string())
            })?;
            request = request.header(COOKIE, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Unreachable("request timed out".to_string())
            } else {
                ProbeError::Unreachable(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProbeError::Unreachable(format!("failed to read body: {}", e)))?;

        tracing::debug!(
            "probe {} -> HTTP {} ({} bytes, cookies: {})",
            self.endpoint,
            status.as_u16(),
            body.len(),
            jar.map_or(0, CookieJar::len)
        );

        classify_response(status, &body)?;
        Ok(body)
    }
}

/// Decides whether a response carries a usable device list.
///
/// A 2xx body that is not strict JSON still goes to the extractor chain when
/// it names both device fields; its fallback backends read such text.
pub fn classify_response(status: StatusCode, body: &str) -> Result<(), ProbeError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ProbeError::NotAuthenticated(format!("HTTP {}", status.as_u16())));
    }
    if !status.is_success() {
        return Err(ProbeError::Unreachable(format!("HTTP {}", status.as_u16())));
    }

    let json: JsonValue = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(_) if mentions_device_fields(body) => {
            tracing::debug!("device list is not strict JSON; leaving it to the fallback parsers");
            return Ok(());
        }
        Err(_) => {
            return Err(ProbeError::NotAuthenticated(
                "response is not JSON (login page?)".to_string(),
            ));
        }
    };

    match json.get(DEVICE_LIST_FIELD) {
        Some(JsonValue::Array(devices)) if !devices.is_empty() => Ok(()),
        _ => Err(ProbeError::EmptyResult),
    }
}

fn mentions_device_fields(body: &str) -> bool {
    body.contains("\"device_id\"") && body.contains("\"user_idx\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAYLOAD: &str = r#"{"result":[{"device_id":"12345678-1234-1234-1234-123456789abc","user_idx":"87654321","device_name":"Phone"}]}"#;

    #[test]
    fn test_empty_and_null_lists_are_empty_result() {
        for body in [r#"{"result":[]}"#, r#"{"result":null}"#, r#"{"other":1}"#] {
            assert_eq!(
                classify_response(StatusCode::OK, body),
                Err(ProbeError::EmptyResult),
                "{}",
                body
            );
        }
    }

    #[test]
    fn test_non_empty_list_is_accepted() {
        assert_eq!(classify_response(StatusCode::OK, PAYLOAD), Ok(()));
    }

    #[test]
    fn test_auth_and_server_errors() {
        assert!(matches!(
            classify_response(StatusCode::UNAUTHORIZED, ""),
            Err(ProbeError::NotAuthenticated(_))
        ));
        assert!(matches!(
            classify_response(StatusCode::OK, "<html>login</html>"),
            Err(ProbeError::NotAuthenticated(_))
        ));
        assert!(matches!(
            classify_response(StatusCode::BAD_GATEWAY, "{}"),
            Err(ProbeError::Unreachable(_))
        ));
    }

    #[test]
    fn test_near_json_with_device_fields_is_passed_on() {
        let truncated = &PAYLOAD[..PAYLOAD.len() - 2];
        assert_eq!(classify_response(StatusCode::OK, truncated), Ok(()));
        assert_eq!(
            classify_response(StatusCode::OK, &format!("{},,,", PAYLOAD)),
            Ok(())
        );
        assert!(matches!(
            classify_response(StatusCode::OK, "<html>device_id user_idx</html>"),
            Err(ProbeError::NotAuthenticated(_))
        ));
    }

    async fn prober_for(server: &MockServer) -> SessionProber {
        let endpoint = Url::parse(&format!("{}/api/user-devices/app", server.uri())).unwrap();
        SessionProber::new(endpoint, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_probe_sends_cookie_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user-devices/app"))
            .and(header("cookie", "ridi-at=token; ridi-rt=refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAYLOAD))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"result":[]}"#))
            .mount(&server)
            .await;

        let prober = prober_for(&server).await;
        assert_eq!(prober.probe(None).await, Err(ProbeError::EmptyResult));

        let mut jar = CookieJar::default();
        jar.insert("ridi-at", "token");
        jar.insert("ridi-rt", "refresh");
        assert_eq!(prober.probe(Some(&jar)).await.unwrap(), PAYLOAD);
    }

    #[tokio::test]
    async fn test_probe_timeout_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(PAYLOAD)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let endpoint = Url::parse(&server.uri()).unwrap();
        let prober = SessionProber::new(endpoint, Duration::from_millis(200)).unwrap();
        assert!(matches!(prober.probe(None).await, Err(ProbeError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_probe_connection_refused_is_unreachable() {
        let endpoint = Url::parse("http://127.0.0.1:9/api/user-devices/app").unwrap();
        let prober = SessionProber::new(endpoint, Duration::from_secs(2)).unwrap();
        assert!(matches!(prober.probe(None).await, Err(ProbeError::Unreachable(_))));
    }
}
