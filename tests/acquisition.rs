//! End-to-end: discovery fails everywhere, the user types the pair in, and
//! the config file written afterwards reads back unchanged.

use async_trait::async_trait;
use ridikey::config::{ConfigStore, Preferences};
use ridikey::cookies::{Browser, CookieJar, CookieSource, CookieStoreReader, StoreLocator};
use ridikey::error::{CookieStoreError, ProbeError};
use ridikey::extract::{CredentialExtractor, JsonBackend, RegexBackend};
use ridikey::pipeline::{AcquisitionPipeline, Interaction, PipelineOptions, Source, Stage};
use ridikey::platform::Platform;
use ridikey::probe::{SessionProbe, SessionProber};
use ridikey::record::DeviceRecord;
use std::collections::VecDeque;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Offline;

#[async_trait]
impl SessionProbe for Offline {
    async fn probe(&self, _jar: Option<&CookieJar>) -> Result<String, ProbeError> {
        Err(ProbeError::Unreachable("network disabled".to_string()))
    }
}

struct NoBrowsers;

impl CookieSource for NoBrowsers {
    fn browsers(&self) -> Vec<Browser> {
        Vec::new()
    }

    fn read(&self, _browser: Browser, _domain: &str) -> Result<CookieJar, CookieStoreError> {
        Err(CookieStoreError::NoCookieStoreFound)
    }
}

struct Typist {
    answers: VecDeque<String>,
    logins: usize,
}

#[async_trait]
impl Interaction for Typist {
    async fn wait_for_login(&mut self, _login_url: &str) {
        self.logins += 1;
    }

    async fn ask(&mut self, _prompt: &str) -> Option<String> {
        self.answers.pop_front()
    }

    async fn confirm(&mut self, _prompt: &str) -> bool {
        false
    }

    async fn choose(&mut self, _candidates: &[DeviceRecord]) -> Option<usize> {
        None
    }

    fn notify(&mut self, _message: &str) {}
}

#[tokio::test]
async fn manual_entry_is_persisted_and_read_back() {
    let pipeline = AcquisitionPipeline::new(
        Arc::new(Offline),
        Arc::new(NoBrowsers),
        CredentialExtractor::detect(),
        PipelineOptions {
            platform: Platform::Linux,
            ..PipelineOptions::default()
        },
    );
    let mut typist = Typist {
        answers: VecDeque::from(vec![
            "  abcdefabcdefabcdefabcdefabcdefab ".to_string(),
            "123456789".to_string(),
        ]),
        logins: 0,
    };

    let acquisition = pipeline
        .run(&mut typist, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(typist.logins, 1);
    assert_eq!(acquisition.source, Source::Manual);
    assert_eq!(acquisition.stage, Stage::ManualEntry);
    assert!(acquisition.validated);
    assert!(
        acquisition.attempts[..acquisition.attempts.len() - 1]
            .iter()
            .all(|attempt| !attempt.succeeded || attempt.stage == Stage::PromptLogin)
    );

    let dir = TempDir::new().unwrap();
    let store = ConfigStore::new(dir.path().join(".ridiculous.toml"));
    store
        .write(&acquisition.record, &store.preferences_or_default())
        .unwrap();

    let saved = std::fs::read_to_string(store.path()).unwrap();
    assert!(saved.contains("abcdefabcdefabcdefabcdefabcdefab"));
    assert!(saved.contains("123456789"));

    let loaded = store.read().unwrap();
    assert_eq!(loaded.device_id, "abcdefabcdefabcdefabcdefabcdefab");
    assert_eq!(loaded.user_idx, "123456789");
    assert_eq!(loaded.preferences, Preferences::default());
}

#[tokio::test]
async fn cancelled_run_writes_nothing() {
    let pipeline = AcquisitionPipeline::new(
        Arc::new(Offline),
        Arc::new(NoBrowsers),
        CredentialExtractor::detect(),
        PipelineOptions {
            platform: Platform::Linux,
            ..PipelineOptions::default()
        },
    );
    let mut typist = Typist {
        answers: VecDeque::new(),
        logins: 0,
    };
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline.run(&mut typist, &cancel).await.unwrap_err();
    assert!(matches!(err, ridikey::PipelineError::Cancelled { .. }));
    assert!(err.attempts().is_empty());
}

#[test]
fn empty_home_has_no_cookie_stores() {
    let home = TempDir::new().unwrap();
    let reader = CookieStoreReader::with_locator(Platform::Linux, StoreLocator::with_home(home.path()));
    assert!(reader.browsers().is_empty());
    assert_eq!(
        reader.read_any("ridibooks.com"),
        Err(CookieStoreError::NoCookieStoreFound)
    );
}

#[tokio::test]
async fn truncated_device_list_is_recovered_by_regex_fallback() {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(
            r#"{"result":[{"device_id":"12345678-1234-1234-1234-123456789abc","user_idx":"87654321","device_nick":"Phone"},{"device_id":"#,
        ))
        .mount(&server)
        .await;

    let endpoint = url::Url::parse(&server.uri()).unwrap();
    let pipeline = AcquisitionPipeline::new(
        Arc::new(SessionProber::new(endpoint, std::time::Duration::from_secs(5)).unwrap()),
        Arc::new(NoBrowsers),
        CredentialExtractor::with_backends(vec![Box::new(JsonBackend::new()), Box::new(RegexBackend)]),
        PipelineOptions {
            platform: Platform::Linux,
            ..PipelineOptions::default()
        },
    );
    let mut typist = Typist {
        answers: VecDeque::new(),
        logins: 0,
    };

    let acquisition = pipeline
        .run(&mut typist, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(acquisition.source, Source::Session);
    assert_eq!(acquisition.record.device_id, "12345678-1234-1234-1234-123456789abc");
    assert_eq!(acquisition.record.user_idx, "87654321");
    assert_eq!(typist.logins, 0);
}
