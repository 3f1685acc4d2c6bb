//! Optional post-acquisition check with the downstream decryption tool.
//!
//! Runs `ridiculous --validate-only` against the chosen credentials. The
//! verdict is informational; a failed or missing check never stops the
//! credentials from being saved.

use crate::record::DeviceRecord;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Downstream tool binary name.
pub const TOOL_NAME: &str = "ridiculous";

/// Upper bound for one validation run.
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of asking the downstream tool about a credential pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Confirmed,
    Unconfirmed(String),
    ToolMissing,
}

impl std::fmt::Display for Verification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verification::Confirmed => write!(f, "accepted by {}", TOOL_NAME),
            Verification::Unconfirmed(reason) => write!(f, "not confirmed: {}", reason),
            Verification::ToolMissing => write!(f, "{} not found on PATH", TOOL_NAME),
        }
    }
}

/// Handle on the downstream tool.
pub struct DownstreamTool {
    program: Option<PathBuf>,
    timeout: Duration,
}

impl DownstreamTool {
    /// Looks the tool up on `PATH`.
    pub fn locate() -> Self {
        Self {
            program: which::which(TOOL_NAME).ok(),
            timeout: VERIFY_TIMEOUT,
        }
    }

    pub fn with_program(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: Some(program.into()),
            timeout,
        }
    }

    pub fn is_available(&self) -> bool {
        self.program.is_some()
    }

    /// Runs the tool's validation mode for `record`.
    pub async fn verify(&self, record: &DeviceRecord) -> Verification {
        let Some(program) = &self.program else {
            return Verification::ToolMissing;
        };

        tracing::debug!(
            "validating device {} with {}",
            record.masked_device_id(),
            program.display()
        );

        let child = Command::new(program)
            .arg("--validate-only")
            .arg("--device-id")
            .arg(&record.device_id)
            .arg("--user-idx")
            .arg(&record.user_idx)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Err(_) => Verification::Unconfirmed(format!(
                "no answer within {}s",
                self.timeout.as_secs()
            )),
            Ok(Err(e)) => Verification::Unconfirmed(format!("failed to run: {}", e)),
            Ok(Ok(output)) if output.status.success() => Verification::Confirmed,
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let reason = stderr
                    .lines()
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("exited with {}", output.status));
                Verification::Unconfirmed(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DeviceRecord {
        DeviceRecord::new("12345678-1234-1234-1234-123456789abc", "87654321", "Phone")
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let tool = DownstreamTool {
            program: None,
            timeout: VERIFY_TIMEOUT,
        };
        assert!(!tool.is_available());
        assert_eq!(tool.verify(&record()).await, Verification::ToolMissing);
    }

    #[tokio::test]
    async fn test_unrunnable_program() {
        let tool = DownstreamTool::with_program("/nonexistent/ridiculous", VERIFY_TIMEOUT);
        assert!(matches!(
            tool.verify(&record()).await,
            Verification::Unconfirmed(_)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_decides() {
        let Ok(truthy) = which::which("true") else {
            return;
        };
        let Ok(falsy) = which::which("false") else {
            return;
        };
        assert_eq!(
            DownstreamTool::with_program(truthy, VERIFY_TIMEOUT).verify(&record()).await,
            Verification::Confirmed
        );
        assert!(matches!(
            DownstreamTool::with_program(falsy, VERIFY_TIMEOUT).verify(&record()).await,
            Verification::Unconfirmed(reason) if reason.contains("exited")
        ));
    }
}
