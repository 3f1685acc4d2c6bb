//! Extraction through an installed `jq` interpreter.
//!
//! The payload is handed to `jq` through an owner-only temporary file
//! that is removed when the extraction returns.

use super::{ExtractorBackend, candidate};
use crate::error::ExtractError;
use crate::record::CandidateSet;
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const FILTER: &str = r#".result[]? | select(type == "object" and .device_id != null and .user_idx != null) | [(.device_id | tostring), (.user_idx | tostring), (.device_name // "" | tostring), (.os // "" | tostring)] | @tsv"#;

/// Prefix of the payload dump handed to `jq`.
pub const DUMP_PREFIX: &str = "ridikey-payload-";

/// Upper bound for one `jq` run.
pub const JQ_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend delegating JSON decoding to `jq`.
pub struct JqBackend {
    program: PathBuf,
    timeout: Duration,
    scratch_dir: Option<PathBuf>,
}

impl JqBackend {
    /// Finds `jq` on `PATH`.
    pub fn locate() -> Option<Self> {
        which::which("jq").ok().map(Self::new)
    }

    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            timeout: JQ_TIMEOUT,
            scratch_dir: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Places the payload dump in `dir` instead of the system temp dir.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl ExtractorBackend for JqBackend {
    fn name(&self) -> &'static str {
        "jq"
    }

    async fn extract(&self, payload: &str) -> Result<CandidateSet, ExtractError> {
        let temp_error = |e: std::io::Error| ExtractError::MalformedJson(format!("temp file: {}", e));

        // Removed on drop, including when this future is dropped mid-run.
        let mut builder = tempfile::Builder::new();
        builder.prefix(DUMP_PREFIX).suffix(".json");
        let mut dump = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(temp_error)?;
        dump.write_all(payload.as_bytes())
            .and_then(|_| dump.flush())
            .map_err(temp_error)?;

        let run = Command::new(&self.program)
            .arg("-r")
            .arg(FILTER)
            .arg(dump.path())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Err(_) => {
                return Err(ExtractError::MalformedJson(format!(
                    "jq gave no answer within {}ms",
                    self.timeout.as_millis()
                )));
            }
            Ok(Err(e)) => {
                return Err(ExtractError::MalformedJson(format!("failed to run jq: {}", e)));
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::MalformedJson(
                stderr.lines().next().unwrap_or("jq failed").to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let candidates: CandidateSet = stdout
            .lines()
            .filter_map(|line| {
                let mut fields = line.split('\t');
                let device_id = fields.next()?;
                let user_idx = fields.next()?;
                if device_id.trim().is_empty() || user_idx.trim().is_empty() {
                    return None;
                }
                let name = fields.next();
                let os = fields.next();
                Some(candidate(device_id, user_idx, name, os))
            })
            .collect();

        if candidates.is_empty() {
            return Err(ExtractError::NoDeviceFields);
        }
        Ok(candidates)
    }
}
