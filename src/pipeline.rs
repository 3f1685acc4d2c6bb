//! The credential acquisition pipeline.
//!
//! Strategies run one after another, from fully automatic to fully manual:
//!
//! 1. probe the device-list endpoint with no cookies,
//! 2. probe it with cookies from each installed browser,
//! 3. ask the user to log in, then repeat 1 and 2 once,
//! 4. ask the user to type the two fields.
//!
//! Network, cookie and parsing failures never end the run; they are
//! recorded in the attempt trail and the next strategy starts. Only a
//! user abort during manual entry or an interrupt ends it early.

use crate::cookies::{Browser, COOKIE_DOMAIN, CookieJar, CookieSource};
use crate::error::{CookieStoreError, PipelineError};
use crate::extract::CredentialExtractor;
use crate::platform::Platform;
use crate::probe::SessionProbe;
use crate::ranking;
use crate::record::{CandidateSet, DeviceRecord, MANUAL_ENTRY};
use crate::validator;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Login page shown to the user when no session is found.
pub const LOGIN_URL: &str = "https://ridibooks.com/account/login";

/// Pipeline stage an attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ProbeSession,
    ProbeCookies,
    PromptLogin,
    ProbeAfterLogin,
    ManualEntry,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::ProbeSession => "probe-session",
            Stage::ProbeCookies => "probe-cookies",
            Stage::PromptLogin => "prompt-login",
            Stage::ProbeAfterLogin => "probe-after-login",
            Stage::ManualEntry => "manual-entry",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Where the winning record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Session,
    Cookies(Browser),
    CookieFile,
    Manual,
    CommandLine,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Session => f.write_str("session"),
            Source::Cookies(browser) => write!(f, "{} cookies", browser),
            Source::CookieFile => f.write_str("cookie file"),
            Source::Manual => f.write_str("manual entry"),
            Source::CommandLine => f.write_str("command line"),
        }
    }
}

/// One strategy attempt and what came of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub stage: Stage,
    pub strategy: String,
    pub succeeded: bool,
    pub detail: String,
}

impl Attempt {
    fn ok(stage: Stage, strategy: impl ToString, detail: impl Into<String>) -> Self {
        Self {
            stage,
            strategy: strategy.to_string(),
            succeeded: true,
            detail: detail.into(),
        }
    }

    fn failed(stage: Stage, strategy: impl ToString, detail: impl ToString) -> Self {
        Self {
            stage,
            strategy: strategy.to_string(),
            succeeded: false,
            detail: detail.to_string(),
        }
    }
}

impl std::fmt::Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.strategy, self.detail)
    }
}

/// How to pick among several candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Take the first valid candidate without asking.
    #[default]
    FirstValid,
    /// Let the user pick whenever there is more than one candidate.
    Ask,
}

/// Tunables for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub platform: Platform,
    pub domain: String,
    pub login_url: String,
    /// Whether to ask the user to log in before falling back to manual entry.
    pub prompt_login: bool,
    pub policy: SelectionPolicy,
    /// Cookies imported from a file, tried before any browser store.
    pub imported_cookies: Option<CookieJar>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            platform: Platform::detect(),
            domain: COOKIE_DOMAIN.to_string(),
            login_url: LOGIN_URL.to_string(),
            prompt_login: true,
            policy: SelectionPolicy::FirstValid,
            imported_cookies: None,
        }
    }
}

/// A successful run.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub record: DeviceRecord,
    pub source: Source,
    pub stage: Stage,
    /// False when the user accepted a record that failed format validation.
    pub validated: bool,
    /// Everything the winning strategy found, in payload order.
    pub candidates: CandidateSet,
    /// Advisory alternative matching this machine's platform.
    pub recommendation: Option<DeviceRecord>,
    pub attempts: Vec<Attempt>,
}

/// The user-facing side of the pipeline.
#[async_trait]
pub trait Interaction: Send {
    /// Tells the user to log in at `login_url` and waits until they are done.
    async fn wait_for_login(&mut self, login_url: &str);

    /// Asks for a line of input; `None` means the user gave up.
    async fn ask(&mut self, prompt: &str) -> Option<String>;

    /// Yes/no question.
    async fn confirm(&mut self, prompt: &str) -> bool;

    /// Lets the user pick a candidate; `None` keeps the default ranking.
    async fn choose(&mut self, candidates: &[DeviceRecord]) -> Option<usize>;

    /// Shows an informational message.
    fn notify(&mut self, message: &str);
}

/// Why a run stopped without a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Cancelled,
    Aborted,
}

/// A record picked by some stage, before the attempt trail is attached.
struct Selected {
    record: DeviceRecord,
    source: Source,
    stage: Stage,
    validated: bool,
    candidates: CandidateSet,
    recommendation: Option<DeviceRecord>,
}

enum State {
    ProbeSession,
    ProbeCookies,
    PromptLogin,
    ProbeAfterLogin,
    ManualEntry,
    Done(Box<Selected>),
    Failed(Halt),
}

/// Drives the acquisition strategies in order.
pub struct AcquisitionPipeline {
    prober: Arc<dyn SessionProbe>,
    cookies: Arc<dyn CookieSource>,
    extractor: CredentialExtractor,
    options: PipelineOptions,
}

impl AcquisitionPipeline {
    pub fn new(
        prober: Arc<dyn SessionProbe>,
        cookies: Arc<dyn CookieSource>,
        extractor: CredentialExtractor,
        options: PipelineOptions,
    ) -> Self {
        Self {
            prober,
            cookies,
            extractor,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Runs the pipeline to completion.
    pub async fn run(
        &self,
        ui: &mut dyn Interaction,
        cancel: &CancellationToken,
    ) -> Result<Acquisition, PipelineError> {
        let mut attempts = Vec::new();
        let mut state = State::ProbeSession;

        loop {
            state = match state {
                State::ProbeSession => {
                    match self.probe_session(Stage::ProbeSession, &mut attempts, ui, cancel).await {
                        Ok(Some(selected)) => State::Done(Box::new(selected)),
                        Ok(None) => State::ProbeCookies,
                        Err(halt) => State::Failed(halt),
                    }
                }
                State::ProbeCookies => {
                    match self.probe_cookies(Stage::ProbeCookies, &mut attempts, ui, cancel).await {
                        Ok(Some(selected)) => State::Done(Box::new(selected)),
                        Ok(None) if self.options.prompt_login => State::PromptLogin,
                        Ok(None) => State::ManualEntry,
                        Err(halt) => State::Failed(halt),
                    }
                }
                State::PromptLogin => {
                    match until_cancelled(cancel, ui.wait_for_login(&self.options.login_url)).await {
                        Some(()) => {
                            attempts.push(Attempt::ok(
                                Stage::PromptLogin,
                                "login",
                                format!("user finished logging in at {}", self.options.login_url),
                            ));
                            State::ProbeAfterLogin
                        }
                        None => State::Failed(Halt::Cancelled),
                    }
                }
                State::ProbeAfterLogin => {
                    let stage = Stage::ProbeAfterLogin;
                    match self.probe_session(stage, &mut attempts, ui, cancel).await {
                        Ok(Some(selected)) => State::Done(Box::new(selected)),
                        Ok(None) => match self.probe_cookies(stage, &mut attempts, ui, cancel).await {
                            Ok(Some(selected)) => State::Done(Box::new(selected)),
                            Ok(None) => State::ManualEntry,
                            Err(halt) => State::Failed(halt),
                        },
                        Err(halt) => State::Failed(halt),
                    }
                }
                State::ManualEntry => match self.manual_entry(&mut attempts, ui, cancel).await {
                    Ok(selected) => State::Done(Box::new(selected)),
                    Err(halt) => State::Failed(halt),
                },
                State::Done(selected) => {
                    let Selected {
                        record,
                        source,
                        stage,
                        validated,
                        candidates,
                        recommendation,
                    } = *selected;
                    return Ok(Acquisition {
                        record,
                        source,
                        stage,
                        validated,
                        candidates,
                        recommendation,
                        attempts,
                    });
                }
                State::Failed(Halt::Aborted) => {
                    return Err(PipelineError::UserAborted { attempts });
                }
                State::Failed(Halt::Cancelled) => {
                    return Err(PipelineError::Cancelled { attempts });
                }
            };
        }
    }

    /// Accepts credentials supplied up front, confirming them if they look wrong.
    pub async fn accept_supplied(
        &self,
        record: DeviceRecord,
        ui: &mut dyn Interaction,
        cancel: &CancellationToken,
    ) -> Result<Acquisition, PipelineError> {
        let mut attempts = Vec::new();
        let validated = record.is_valid();

        if !validated {
            let prompt = format!(
                "{} does not look like a valid credential pair. Use it anyway?",
                record
            );
            match until_cancelled(cancel, ui.confirm(&prompt)).await {
                Some(true) => {}
                Some(false) => {
                    attempts.push(Attempt::failed(
                        Stage::ManualEntry,
                        Source::CommandLine,
                        "supplied credentials failed format validation and were declined",
                    ));
                    return Err(PipelineError::UserAborted { attempts });
                }
                None => return Err(PipelineError::Cancelled { attempts }),
            }
        }

        attempts.push(Attempt::ok(
            Stage::ManualEntry,
            Source::CommandLine,
            if validated {
                "credentials supplied"
            } else {
                "credentials supplied, format override confirmed"
            },
        ));

        Ok(Acquisition {
            candidates: vec![record.clone()],
            record,
            source: Source::CommandLine,
            stage: Stage::ManualEntry,
            validated,
            recommendation: None,
            attempts,
        })
    }

    async fn probe_session(
        &self,
        stage: Stage,
        attempts: &mut Vec<Attempt>,
        ui: &mut dyn Interaction,
        cancel: &CancellationToken,
    ) -> Result<Option<Selected>, Halt> {
        let result = until_cancelled(cancel, self.prober.probe(None))
            .await
            .ok_or(Halt::Cancelled)?;

        match result {
            Ok(payload) => {
                self.settle(stage, Source::Session, &payload, attempts, ui, cancel)
                    .await
            }
            Err(err) => {
                attempts.push(Attempt::failed(stage, Source::Session, err));
                Ok(None)
            }
        }
    }

    async fn probe_cookies(
        &self,
        stage: Stage,
        attempts: &mut Vec<Attempt>,
        ui: &mut dyn Interaction,
        cancel: &CancellationToken,
    ) -> Result<Option<Selected>, Halt> {
        if let Some(jar) = &self.options.imported_cookies {
            if let Some(selected) = self
                .probe_with_jar(stage, Source::CookieFile, jar, attempts, ui, cancel)
                .await?
            {
                return Ok(Some(selected));
            }
        }

        let browsers = self.cookies.browsers();
        if browsers.is_empty() {
            attempts.push(Attempt::failed(
                stage,
                "cookies",
                format!("{} on {}", CookieStoreError::NoCookieStoreFound, self.options.platform),
            ));
            return Ok(None);
        }

        for browser in browsers {
            let source = Arc::clone(&self.cookies);
            let domain = self.options.domain.clone();
            let read = tokio::task::spawn_blocking(move || source.read(browser, &domain));

            let jar = match until_cancelled(cancel, read).await.ok_or(Halt::Cancelled)? {
                Ok(Ok(jar)) => jar,
                Ok(Err(err)) => {
                    attempts.push(Attempt::failed(stage, Source::Cookies(browser), err));
                    continue;
                }
                Err(join_error) => {
                    attempts.push(Attempt::failed(
                        stage,
                        Source::Cookies(browser),
                        format!("cookie reader failed: {}", join_error),
                    ));
                    continue;
                }
            };

            if let Some(selected) = self
                .probe_with_jar(stage, Source::Cookies(browser), &jar, attempts, ui, cancel)
                .await?
            {
                return Ok(Some(selected));
            }
        }

        Ok(None)
    }

    async fn probe_with_jar(
        &self,
        stage: Stage,
        source: Source,
        jar: &CookieJar,
        attempts: &mut Vec<Attempt>,
        ui: &mut dyn Interaction,
        cancel: &CancellationToken,
    ) -> Result<Option<Selected>, Halt> {
        if jar.is_empty() {
            attempts.push(Attempt::failed(stage, source, "no cookies to present"));
            return Ok(None);
        }

        let result = until_cancelled(cancel, self.prober.probe(Some(jar)))
            .await
            .ok_or(Halt::Cancelled)?;

        match result {
            Ok(payload) => self.settle(stage, source, &payload, attempts, ui, cancel).await,
            Err(err) => {
                attempts.push(Attempt::failed(
                    stage,
                    source,
                    format!("{} ({} cookie(s) presented)", err, jar.len()),
                ));
                Ok(None)
            }
        }
    }

    /// Parses a payload and picks a record from it.
    async fn settle(
        &self,
        stage: Stage,
        source: Source,
        payload: &str,
        attempts: &mut Vec<Attempt>,
        ui: &mut dyn Interaction,
        cancel: &CancellationToken,
    ) -> Result<Option<Selected>, Halt> {
        let extracted = until_cancelled(cancel, self.extractor.extract(payload))
            .await
            .ok_or(Halt::Cancelled)?;
        let candidates = match extracted {
            Ok(candidates) => candidates,
            Err(err) => {
                attempts.push(Attempt::failed(stage, source, err));
                return Ok(None);
            }
        };

        let Some(ranking) = ranking::rank(&candidates, self.options.platform) else {
            attempts.push(Attempt::failed(stage, source, "payload listed no devices"));
            return Ok(None);
        };

        let mut chosen = ranking.chosen;
        let mut validated = ranking.validated;

        if self.options.policy == SelectionPolicy::Ask && candidates.len() > 1 {
            let pick = until_cancelled(cancel, ui.choose(&candidates))
                .await
                .ok_or(Halt::Cancelled)?;
            if let Some(index) = pick.filter(|index| *index < candidates.len()) {
                chosen = index;
                validated = candidates[index].is_valid();
            }
        }

        if !validated {
            let prompt = format!(
                "{} does not look like a valid credential pair. Use it anyway?",
                candidates[chosen]
            );
            let accepted = until_cancelled(cancel, ui.confirm(&prompt))
                .await
                .ok_or(Halt::Cancelled)?;
            if !accepted {
                attempts.push(Attempt::failed(
                    stage,
                    source,
                    "candidate failed format validation and was declined",
                ));
                return Ok(None);
            }
        }

        let recommendation = ranking
            .recommended
            .filter(|index| *index != chosen)
            .map(|index| candidates[index].clone());
        if let Some(recommended) = &recommendation {
            ui.notify(&format!(
                "{} looks like this {} machine; rerun with --choose to use it instead",
                recommended, self.options.platform
            ));
        }

        let record = candidates[chosen].clone();
        attempts.push(Attempt::ok(
            stage,
            source,
            format!(
                "{} candidate(s), chose {}",
                candidates.len(),
                record.display_name
            ),
        ));

        Ok(Some(Selected {
            record,
            source,
            stage,
            validated,
            candidates,
            recommendation,
        }))
    }

    async fn manual_entry(
        &self,
        attempts: &mut Vec<Attempt>,
        ui: &mut dyn Interaction,
        cancel: &CancellationToken,
    ) -> Result<Selected, Halt> {
        ui.notify(&format!(
            "Open {} while logged in and copy device_id and user_idx from the response",
            crate::probe::DEVICES_ENDPOINT
        ));

        let (device_id, user_idx) = match ask_credentials(ui, cancel).await {
            Ok(fields) => fields,
            Err(halt) => {
                let detail = match halt {
                    Halt::Aborted => "user aborted entry",
                    Halt::Cancelled => "interrupted",
                };
                attempts.push(Attempt::failed(Stage::ManualEntry, Source::Manual, detail));
                return Err(halt);
            }
        };

        let record = DeviceRecord::new(device_id, user_idx, MANUAL_ENTRY);
        let validated = record.is_valid();
        attempts.push(Attempt::ok(
            Stage::ManualEntry,
            Source::Manual,
            if validated {
                "credentials entered"
            } else {
                "credentials entered, format override confirmed"
            },
        ));

        Ok(Selected {
            candidates: vec![record.clone()],
            record,
            source: Source::Manual,
            stage: Stage::ManualEntry,
            validated,
            recommendation: None,
        })
    }
}

async fn ask_credentials(
    ui: &mut dyn Interaction,
    cancel: &CancellationToken,
) -> Result<(String, String), Halt> {
    let device_id = ask_field(
        &mut *ui,
        cancel,
        "Device ID",
        "device ID (UUID or 32 hex digits)",
        |value| validator::classify(value).is_valid(),
    )
    .await?;
    let user_idx = ask_field(
        ui,
        cancel,
        "User index",
        "user index (6 to 15 digits)",
        validator::validate_user_idx,
    )
    .await?;
    Ok((device_id, user_idx))
}

/// Asks until a non-empty value is accepted; a bad format needs one confirmation.
async fn ask_field(
    ui: &mut dyn Interaction,
    cancel: &CancellationToken,
    prompt: &str,
    what: &str,
    is_valid: impl Fn(&str) -> bool,
) -> Result<String, Halt> {
    loop {
        let answer = until_cancelled(cancel, ui.ask(prompt))
            .await
            .ok_or(Halt::Cancelled)?
            .ok_or(Halt::Aborted)?;

        let value = answer.trim();
        if value.is_empty() {
            continue;
        }
        if is_valid(value) {
            return Ok(value.to_string());
        }

        let question = format!("That does not look like a valid {}. Use it anyway?", what);
        let accepted = until_cancelled(cancel, ui.confirm(&question))
            .await
            .ok_or(Halt::Cancelled)?;
        if accepted {
            return Ok(value.to_string());
        }
    }
}

/// Races `fut` against the cancellation token; `None` if cancelled first.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}
