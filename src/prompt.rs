//! Terminal implementation of the pipeline's user interaction.

use crate::console::Console;
use crate::pipeline::Interaction;
use crate::record::DeviceRecord;
use async_trait::async_trait;
use std::io::BufRead;
use tokio::sync::mpsc;

/// Prompts on stdout and reads answers from stdin. End of input aborts.
///
/// Lines are read on a detached thread and handed over through a channel,
/// so an interrupted prompt leaves nothing behind that runtime shutdown
/// would have to wait for.
pub struct TerminalPrompt {
    console: Console,
    lines: mpsc::Receiver<std::io::Result<String>>,
}

impl TerminalPrompt {
    pub fn new(console: Console) -> Self {
        Self::with_reader(console, std::io::BufReader::new(std::io::stdin()))
    }

    /// Reads answers from `input` instead of stdin.
    pub fn with_reader(console: Console, input: impl BufRead + Send + 'static) -> Self {
        let (tx, lines) = mpsc::channel(1);
        let spawned = std::thread::Builder::new()
            .name("ridikey-stdin".to_string())
            .spawn(move || forward_lines(input, tx));
        if let Err(e) = spawned {
            // The sender went down with the closure; every read sees end of input.
            tracing::warn!("cannot start input reader: {}", e);
        }
        Self { console, lines }
    }

    async fn read_line(&mut self) -> Option<String> {
        match self.lines.recv().await? {
            Ok(line) => Some(line),
            Err(e) => {
                tracing::warn!("failed to read from stdin: {}", e);
                None
            }
        }
    }
}

/// Sends lines until end of input, a read error, or the prompt going away.
fn forward_lines(mut input: impl BufRead, tx: mpsc::Sender<std::io::Result<String>>) {
    loop {
        let mut line = String::new();
        let item = match input.read_line(&mut line) {
            Ok(0) => return,
            Ok(_) => Ok(line.trim_end_matches(['\r', '\n']).to_string()),
            Err(e) => Err(e),
        };
        let failed = item.is_err();
        if tx.blocking_send(item).is_err() || failed {
            return;
        }
    }
}

#[async_trait]
impl Interaction for TerminalPrompt {
    async fn wait_for_login(&mut self, login_url: &str) {
        self.console.section("Login required");
        self.console.info("No logged-in session was found in any browser.");
        self.console.info(&format!(
            "Log in at {} in your browser.",
            self.console.value(login_url)
        ));
        self.console.prompt("Press Enter once you are logged in");
        let _ = self.read_line().await;
    }

    async fn ask(&mut self, prompt: &str) -> Option<String> {
        self.console.prompt(&format!("{}:", prompt));
        self.read_line().await
    }

    async fn confirm(&mut self, prompt: &str) -> bool {
        self.console.prompt(&format!("{} [y/N]", prompt));
        self.read_line()
            .await
            .is_some_and(|answer| is_yes(&answer))
    }

    async fn choose(&mut self, candidates: &[DeviceRecord]) -> Option<usize> {
        self.console.section("Registered devices");
        self.console.candidates(candidates);
        self.console.prompt(&format!(
            "Pick a device [1-{}, Enter for the first valid one]",
            candidates.len()
        ));
        let answer = self.read_line().await?;
        parse_choice(&answer, candidates.len())
    }

    fn notify(&mut self, message: &str) {
        self.console.info(message);
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Parses a 1-based menu choice into an index.
fn parse_choice(answer: &str, len: usize) -> Option<usize> {
    let n: usize = answer.trim().parse().ok()?;
    (1..=len).contains(&n).then(|| n - 1)
}
