//! Console output formatting with ANSI color support.
//!
//! Provides styled terminal output with automatic TTY detection
//! and respect for the NO_COLOR environment variable. Diagnostics go
//! through `tracing`; this is only for what the user is meant to read.

use crate::pipeline::Attempt;
use crate::record::DeviceRecord;
use std::io::{self, IsTerminal, Write};

/// ANSI style codes for terminal formatting.
#[derive(Debug, Clone, Copy)]
pub enum Style {
    Bold,
    Dim,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    Gray,
}

impl Style {
    /// Returns the ANSI escape code for this style.
    fn code(self) -> &'static str {
        match self {
            Style::Bold => "1",
            Style::Dim => "2",
            Style::Red => "31",
            Style::Green => "32",
            Style::Yellow => "33",
            Style::Blue => "34",
            Style::Magenta => "35",
            Style::Cyan => "36",
            Style::Gray => "90",
        }
    }
}

const RESET: &str = "\x1b[0m";

/// Console output handler with color support detection.
#[derive(Debug)]
pub struct Console {
    colors_enabled: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    /// Creates a new Console instance, detecting color support.
    ///
    /// Colors are disabled if:
    /// - The `NO_COLOR` environment variable is set
    /// - stdout is not a terminal (TTY)
    pub fn new() -> Self {
        let colors_enabled = std::env::var("NO_COLOR").is_err() && io::stdout().is_terminal();

        Self { colors_enabled }
    }

    /// Creates a Console with colors explicitly enabled or disabled.
    pub fn with_colors(enabled: bool) -> Self {
        Self {
            colors_enabled: enabled,
        }
    }

    /// Applies ANSI styles to text if colors are enabled.
    pub fn style(&self, text: &str, styles: &[Style]) -> String {
        if !self.colors_enabled || styles.is_empty() {
            return text.to_string();
        }

        let codes: Vec<&str> = styles.iter().map(|s| s.code()).collect();
        format!("\x1b[{}m{}{}", codes.join(";"), text, RESET)
    }

    /// Creates a colored label like `[INFO]`.
    pub fn label(&self, label: &str, color: Style) -> String {
        let styled = self.style(label, &[color, Style::Bold]);
        format!("[{}]", styled)
    }

    /// Prints an info message with blue `[INFO]` label.
    pub fn info(&self, message: &str) {
        println!("{} {}", self.label("INFO", Style::Blue), message);
    }

    /// Prints a success message with green `[OK]` label.
    pub fn success(&self, message: &str) {
        println!("{} {}", self.label("OK", Style::Green), message);
    }

    /// Prints a warning message with yellow `[WARN]` label.
    pub fn warning(&self, message: &str) {
        println!("{} {}", self.label("WARN", Style::Yellow), message);
    }

    /// Prints an error message with red `[ERROR]` label.
    pub fn error(&self, message: &str) {
        eprintln!("{}", self.error_line(message));
    }

    fn error_line(&self, message: &str) -> String {
        format!("{} {}", self.label("ERROR", Style::Red), message)
    }

    /// Prints a step message with cyan `[STEP]` label.
    pub fn step(&self, message: &str) {
        println!("{} {}", self.label("STEP", Style::Cyan), message);
    }

    /// Prints a section header in magenta bold.
    pub fn section(&self, message: &str) {
        println!();
        println!("{}", self.style(message, &[Style::Magenta, Style::Bold]));
    }

    /// Returns text styled as muted (dim gray).
    pub fn muted(&self, text: &str) -> String {
        self.style(text, &[Style::Gray, Style::Dim])
    }

    /// Prints a question without a newline and flushes stdout.
    pub fn prompt(&self, question: &str) {
        print!("{} {} ", self.label("??", Style::Cyan), question);
        let _ = io::stdout().flush();
    }

    /// Prints a numbered list of candidate devices.
    pub fn candidates(&self, candidates: &[DeviceRecord]) {
        for (index, record) in candidates.iter().enumerate() {
            let marker = if record.is_valid() {
                self.style("valid", &[Style::Green])
            } else {
                self.style("unrecognised format", &[Style::Yellow])
            };
            println!(
                "  {} {} {}",
                self.style(&format!("{:>2}.", index + 1), &[Style::Bold]),
                record,
                self.muted(&format!("({})", marker))
            );
        }
    }

    /// Prints the strategies tried during a run, one per line.
    pub fn attempt_trail(&self, attempts: &[Attempt]) {
        for attempt in attempts {
            let mark = if attempt.succeeded {
                self.style("ok", &[Style::Green, Style::Bold])
            } else {
                self.style("--", &[Style::Gray])
            };
            println!(
                "  {} {} {}",
                mark,
                self.style(&format!("{:<18}", attempt.stage.label()), &[Style::Cyan]),
                self.muted(&format!("{}: {}", attempt.strategy, attempt.detail))
            );
        }
    }

    /// Formats a credential field value for display.
    pub fn value(&self, text: &str) -> String {
        self.style(text, &[Style::Green, Style::Bold])
    }
}
