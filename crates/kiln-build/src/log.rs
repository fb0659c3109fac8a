//! Logging sink injected into the pipeline
//!
//! The pipeline reports progress as `(severity, message)` pairs and leaves
//! presentation (colors, prefixes, filtering) to the sink.

use std::fmt;
use std::sync::{Arc, Mutex};

/// Message severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Tool command lines and cache decisions
    Debug,
    /// Stage progress
    Info,
    /// A stage or the whole run completed
    Success,
    /// Best-effort stage failed, or a cache file was unreadable
    Warning,
    /// Fatal failure
    Error,
}

impl Severity {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Success => "ok",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Destination for pipeline log messages
///
/// Called from worker threads during compilation, hence `Send + Sync`.
pub trait LogSink: Send + Sync {
    fn log(&self, severity: Severity, message: &str);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _severity: Severity, _message: &str) {}
}

/// Keeps every record in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<(Severity, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records so far
    pub fn records(&self) -> Vec<(Severity, String)> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Messages logged at exactly `severity`
    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, m)| m)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn log(&self, severity: Severity, message: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.push((severity, message.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_filters_by_severity() {
        let sink = MemorySink::new();
        sink.log(Severity::Info, "compiling");
        sink.log(Severity::Warning, "compression failed");
        sink.log(Severity::Info, "linking");

        assert_eq!(sink.records().len(), 3);
        assert_eq!(sink.messages(Severity::Info), vec!["compiling", "linking"]);
        assert_eq!(sink.messages(Severity::Warning), vec!["compression failed"]);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Warning < Severity::Error);
        assert_eq!(Severity::Success.to_string(), "ok");
    }
}
