//! Session orchestration: mode selection, trace lifecycle, interception
//!
//! A `Session` owns the trace store for its whole lifetime. In record mode
//! `intercept` performs the real call through the shim's dispatcher and
//! captures the outcome; in replay mode it resolves the outcome from the
//! loaded trace and never touches the network. Finalization runs on drop, so
//! a panicking program still leaves a usable trace of the interactions that
//! completed.

use crate::activation::Activation;
use crate::error::{EngineError, StateError};
use crate::fingerprint::Fingerprinter;
use crate::logging::{DiagnosticLog, LogEntry, LogLevel};
use crate::matcher::{AttemptTracker, CallState, Matcher};
use crate::trace_store::{Trace, TraceWriter};
use crate::traits::Dispatcher;
use crate::types::{Mode, Outcome, RequestRecord, TraceMetadata};
use std::path::PathBuf;
use std::sync::Mutex;

/// Record/replay session controller
///
/// All methods take `&self`; the session is safe to share across worker
/// threads issuing calls concurrently.
#[derive(Debug)]
pub struct Session {
    fingerprinter: Fingerprinter,
    state: SessionState,
    log: Option<Mutex<DiagnosticLog>>,
}

#[derive(Debug)]
enum SessionState {
    Recording {
        writer: TraceWriter,
        tracker: AttemptTracker,
        metadata: TraceMetadata,
    },
    Replaying {
        matcher: Matcher,
    },
}

impl Session {
    /// Open a recording session with default options
    pub fn record(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        Self::builder().mode(Mode::Record).trace_path(path).build()
    }

    /// Open a replay session with default options
    pub fn replay(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        Self::builder().mode(Mode::Replay).trace_path(path).build()
    }

    /// Start building a session
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Open the session described by the process-wide activation handle
    pub fn from_activation(activation: &Activation) -> Result<Self, EngineError> {
        Self::builder()
            .mode(activation.mode())
            .trace_path(activation.trace_path())
            .diagnostics(activation.diagnostics())
            .build()
    }

    /// Intercept one outbound call
    ///
    /// Record mode performs the real call and captures its outcome; replay
    /// mode returns the captured outcome without any network activity. In
    /// both modes a real-call failure comes back as `Outcome::Failure`, not
    /// as an engine error, so caller retry logic behaves identically.
    pub fn intercept(
        &self,
        request: &RequestRecord,
        dispatcher: &dyn Dispatcher,
    ) -> Result<Outcome, EngineError> {
        match &self.state {
            SessionState::Recording {
                writer, tracker, ..
            } => {
                let fingerprint = self.fingerprinter.fingerprint(request);
                let (call_id, attempt_index) = tracker.begin_attempt(fingerprint);
                self.log(
                    LogEntry::new(
                        LogLevel::Debug,
                        format!("dispatching {} {}", request.method, request.url),
                    )
                    .with_call(call_id, attempt_index)
                    .with_fingerprint(fingerprint),
                );

                let outcome = dispatcher.perform(request);
                // Append before reopening the call so a concurrent identical
                // request cannot slot a later attempt ahead of this one.
                writer.append(call_id, attempt_index, fingerprint, outcome.clone())?;
                tracker.complete_attempt(fingerprint, call_id, attempt_index, &outcome);

                self.log(
                    LogEntry::new(
                        LogLevel::Info,
                        format!(
                            "recorded {} for {} {}",
                            if outcome.is_success() { "success" } else { "failure" },
                            request.method,
                            request.url
                        ),
                    )
                    .with_call(call_id, attempt_index)
                    .with_fingerprint(fingerprint),
                );
                Ok(outcome)
            }
            SessionState::Replaying { matcher } => match matcher.resolve(request) {
                Ok(resolved) => {
                    self.log(
                        LogEntry::new(
                            LogLevel::Info,
                            format!(
                                "replayed {} for {} {}",
                                if resolved.outcome.is_success() { "success" } else { "failure" },
                                request.method,
                                request.url
                            ),
                        )
                        .with_call(resolved.call_id, resolved.attempt_index),
                    );
                    Ok(resolved.outcome)
                }
                Err(mismatch) => {
                    self.log(LogEntry::new(
                        LogLevel::Warn,
                        format!("replay diverged: {}", mismatch),
                    ));
                    Err(mismatch.into())
                }
            },
        }
    }

    /// Flush and close the trace; idempotent, a no-op in replay mode
    pub fn finalize(&self) -> Result<(), EngineError> {
        match &self.state {
            SessionState::Recording { writer, .. } => writer.finalize(),
            SessionState::Replaying { .. } => Ok(()),
        }
    }

    /// The session's mode
    pub fn mode(&self) -> Mode {
        match &self.state {
            SessionState::Recording { .. } => Mode::Record,
            SessionState::Replaying { .. } => Mode::Replay,
        }
    }

    /// Session metadata: the trace being written or the trace loaded
    pub fn metadata(&self) -> &TraceMetadata {
        match &self.state {
            SessionState::Recording { metadata, .. } => metadata,
            SessionState::Replaying { matcher } => matcher.trace().metadata(),
        }
    }

    /// Free-form session tags for external tooling
    pub fn tags(&self) -> &[String] {
        &self.metadata().tags
    }

    /// Replay state of a recorded call; `None` in record mode
    pub fn call_state(&self, call_id: u64) -> Option<CallState> {
        match &self.state {
            SessionState::Recording { .. } => None,
            SessionState::Replaying { matcher } => Some(matcher.call_state(call_id)),
        }
    }

    /// Recorded interactions not yet replayed; `None` in record mode
    pub fn remaining(&self) -> Option<usize> {
        match &self.state {
            SessionState::Recording { .. } => None,
            SessionState::Replaying { matcher } => Some(matcher.remaining()),
        }
    }

    /// Collected diagnostic entries; empty unless diagnostics were enabled
    pub fn diagnostics(&self) -> Vec<LogEntry> {
        self.log
            .as_ref()
            .map(|log| log.lock().expect("diagnostic log lock poisoned").entries().to_vec())
            .unwrap_or_default()
    }

    fn log(&self, entry: LogEntry) {
        if let Some(log) = &self.log {
            log.lock().expect("diagnostic log lock poisoned").push(entry);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Guaranteed release on every exit path, panics included.
        let _ = self.finalize();
    }
}

/// Builder for sessions with a fluent API
#[derive(Debug)]
pub struct SessionBuilder {
    mode: Option<Mode>,
    trace_path: Option<PathBuf>,
    tags: Vec<String>,
    diagnostics: bool,
    fingerprinter: Fingerprinter,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            mode: None,
            trace_path: None,
            tags: Vec::new(),
            diagnostics: false,
            fingerprinter: Fingerprinter::new(),
        }
    }

    /// Set the session mode
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the trace file path
    pub fn trace_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.trace_path = Some(path.into());
        self
    }

    /// Add a free-form tag to the recorded metadata
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Enable or disable diagnostic-detail collection
    pub fn diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Use a customized fingerprinter
    pub fn fingerprinter(mut self, fingerprinter: Fingerprinter) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    /// Open the session
    pub fn build(self) -> Result<Session, EngineError> {
        let mode = self.mode.ok_or(StateError::Incomplete { field: "mode" })?;
        let path = self
            .trace_path
            .ok_or(StateError::Incomplete { field: "trace_path" })?;

        let state = match mode {
            Mode::Record => {
                let metadata = TraceMetadata::new(self.tags);
                let writer = TraceWriter::open_for_record(&path, metadata.clone())?;
                SessionState::Recording {
                    writer,
                    tracker: AttemptTracker::new(),
                    metadata,
                }
            }
            Mode::Replay => {
                let trace = Trace::open_for_replay(&path)?;
                SessionState::Replaying {
                    matcher: Matcher::new(trace, self.fingerprinter.clone()),
                }
            }
            Mode::Off => {
                return Err(StateError::WrongMode {
                    required: "record or replay".to_string(),
                    actual: Mode::Off.to_string(),
                }
                .into())
            }
        };

        let log = self
            .diagnostics
            .then(|| Mutex::new(DiagnosticLog::verbose()));

        Ok(Session {
            fingerprinter: self.fingerprinter,
            state,
            log,
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
