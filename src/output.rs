// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON-lines output modes.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::Instant;

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
    start_time: Instant,
    captured: Option<Mutex<Vec<String>>>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: Instant::now(),
            captured: None,
        }
    }

    /// Normal-mode output kept in memory instead of written to stdout.
    pub fn captured() -> Self {
        Self {
            captured: Some(Mutex::new(Vec::new())),
            ..Self::new(OutputMode::Normal)
        }
    }

    /// Lines kept by a [`Output::captured`] output.
    pub fn lines(&self) -> Vec<String> {
        self.captured
            .as_ref()
            .map(|lines| lines.lock().clone())
            .unwrap_or_default()
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Seconds since this output was created.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Announce a phase of the transfer.
    pub fn step(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => self.print(format!("==> {message}")),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit_stdout("step", message),
        }
    }

    /// Print a progress detail (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            self.print(format!("    {message}"));
        }
    }

    /// Print a success message with timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => self.print(format!("{message} ({:.1}s)", self.elapsed_secs())),
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.emit_stdout("success", message),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => self.emit_stderr("error", message),
        }
    }

    fn print(&self, line: String) {
        match &self.captured {
            Some(lines) => lines.lock().push(line),
            None => println!("{line}"),
        }
    }

    fn event<'a>(&self, event: &'a str, message: &'a str) -> JsonEvent<'a> {
        JsonEvent {
            event,
            message,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            duration_secs: self.elapsed_secs(),
        }
    }

    fn emit_stdout(&self, event: &str, message: &str) {
        if let Ok(json) = serde_json::to_string(&self.event(event, message)) {
            println!("{json}");
        }
    }

    fn emit_stderr(&self, event: &str, message: &str) {
        if let Ok(json) = serde_json::to_string(&self.event(event, message)) {
            eprintln!("{json}");
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    timestamp: String,
    duration_secs: f64,
}
