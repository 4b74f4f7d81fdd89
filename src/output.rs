// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes; streams image results.

use crate::checker::{ImageCheckResult, ResultSink, Summary};
use serde::Serialize;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print one image result as it arrives.
    pub fn image_result(&self, result: &ImageCheckResult) {
        match self.mode {
            OutputMode::Normal => println!("{}", format_image_line(result)),
            OutputMode::Quiet => {}
            OutputMode::Json => print_json(&ImageEvent {
                event: "image",
                result,
            }),
        }
    }

    /// Print the batch summary.
    pub fn summary(&self, summary: &Summary) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => println!("Checked {summary}"),
            OutputMode::Json => print_json(&SummaryEvent {
                event: "summary",
                summary,
            }),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => {
                if let Ok(json) = serde_json::to_string(&MessageEvent {
                    event: "error",
                    message,
                }) {
                    eprintln!("{json}");
                }
            }
        }
    }

    /// Print a non-fatal warning.
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => eprintln!("Warning: {message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => print_json(&MessageEvent {
                event: "warning",
                message,
            }),
        }
    }
}

impl ResultSink for Output {
    fn on_result(&self, result: &ImageCheckResult) {
        self.image_result(result);
    }
}

fn format_image_line(result: &ImageCheckResult) -> String {
    match (&result.error, result.update_available) {
        (Some(error), _) => format!("  ✗ {}: {error}", result.image),
        (None, true) => format!("  ↑ {} has a newer image", result.image),
        (None, false) => format!("  ✓ {} is up to date", result.image),
    }
}

fn print_json<T: Serialize>(event: &T) {
    if let Ok(json) = serde_json::to_string(event) {
        println!("{json}");
    }
}

#[derive(Serialize)]
struct ImageEvent<'a> {
    event: &'a str,
    #[serde(flatten)]
    result: &'a ImageCheckResult,
}

#[derive(Serialize)]
struct SummaryEvent<'a> {
    event: &'a str,
    #[serde(flatten)]
    summary: &'a Summary,
}

#[derive(Serialize)]
struct MessageEvent<'a> {
    event: &'a str,
    message: &'a str,
}
