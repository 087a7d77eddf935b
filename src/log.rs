//! Logging collaborator injected into the recorder

use std::sync::{Mutex, PoisonError};

use tracing::{info, warn};

/// Sink for the recorder's log lines
pub trait RecorderLog: Send + Sync {
    /// One line per inbound request
    fn info(&self, message: &str);

    /// Unmatched requests and unsatisfied expectations
    fn warn(&self, message: &str);
}

/// Forwards log lines to `tracing` under the `recorder` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl RecorderLog for TracingLog {
    fn info(&self, message: &str) {
        info!(target: "recorder", "{message}");
    }

    fn warn(&self, message: &str) {
        warn!(target: "recorder", "{message}");
    }
}

/// Severity of a captured log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Informational
    Info,
    /// Warning
    Warn,
}

/// Keeps every line in memory so tests can assert on log output
#[derive(Debug, Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemoryLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured lines in emission order
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Captured lines at exactly `level`
    pub fn at(&self, level: LogLevel) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(line_level, _)| *line_level == level)
            .map(|(_, line)| line)
            .collect()
    }

    fn push(&self, level: LogLevel, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message.to_string()));
    }
}

impl RecorderLog for MemoryLog {
    fn info(&self, message: &str) {
        self.push(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(LogLevel::Warn, message);
    }
}
