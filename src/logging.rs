//! Diagnostic logging for record and replay sessions
//!
//! Log entries are collected in memory and never written as a side effect,
//! so enabling diagnostics cannot change the behavior being recorded or
//! replayed. The session fills the log when its diagnostic-detail flag is on;
//! external tooling reads it after the run.

use crate::types::Fingerprint;
use serde::{Deserialize, Serialize};

/// Log level for diagnostic entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Per-attempt detail
    Debug,
    /// Session lifecycle and match results
    Info,
    /// Divergence and other anomalies
    Warn,
}

/// One diagnostic event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    /// Position of this entry within the log
    pub sequence: u64,
    /// Call id if the event concerns one interaction
    pub call_id: Option<u64>,
    /// Attempt index if the event concerns one attempt
    pub attempt_index: Option<u32>,
    /// Fingerprint of the request involved, hex-encoded
    pub fingerprint: Option<String>,
    pub message: String,
}

impl LogEntry {
    /// Create an entry with no interaction context
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            sequence: 0,
            call_id: None,
            attempt_index: None,
            fingerprint: None,
            message: message.into(),
        }
    }

    /// Attach the interaction this entry concerns
    pub fn with_call(mut self, call_id: u64, attempt_index: u32) -> Self {
        self.call_id = Some(call_id);
        self.attempt_index = Some(attempt_index);
        self
    }

    /// Attach the request fingerprint
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint.to_string());
        self
    }
}

/// In-memory diagnostic log with level filtering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticLog {
    entries: Vec<LogEntry>,
    min_level: LogLevel,
}

impl DiagnosticLog {
    /// Create a log recording entries at or above `min_level`
    pub fn new(min_level: LogLevel) -> Self {
        Self {
            entries: Vec::new(),
            min_level,
        }
    }

    /// Log that records everything
    pub fn verbose() -> Self {
        Self::new(LogLevel::Debug)
    }

    /// Append an entry if it meets the minimum level
    pub fn push(&mut self, mut entry: LogEntry) {
        if entry.level as u8 >= self.min_level as u8 {
            entry.sequence = self.entries.len() as u64;
            self.entries.push(entry);
        }
    }

    /// All collected entries in order
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries at one level
    pub fn filter_by_level(&self, level: LogLevel) -> Vec<&LogEntry> {
        self.entries.iter().filter(|e| e.level == level).collect()
    }

    /// Entries concerning one recorded call
    pub fn filter_by_call(&self, call_id: u64) -> Vec<&LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.call_id == Some(call_id))
            .collect()
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}
