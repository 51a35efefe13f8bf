//! Retrace — deterministic record/replay for outbound network calls
//!
//! In record mode the engine forwards intercepted requests to the real
//! network and persists every request/response pair, ordering and retry
//! outcomes included, into a portable trace file. In replay mode the same
//! call sites are resolved against the trace and receive the captured
//! outcomes, failures included, without any network access, so a replayed
//! run steps through the same control flow and state as the original.

pub mod activation;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod matcher;
pub mod session;
pub mod trace_store;
pub mod traits;
pub mod types;

// Re-export core types and traits
pub use activation::{current_mode, install, is_active, Activation, ActivationConfig};
pub use error::{
    EngineError, FormatError, IoError, NotFoundError, ReplayMismatchError, StateError,
};
pub use fingerprint::Fingerprinter;
pub use logging::{DiagnosticLog, LogEntry, LogLevel};
pub use matcher::{AttemptTracker, CallState, Matcher, ResolvedAttempt};
pub use session::{Session, SessionBuilder};
pub use trace_store::{Trace, TraceWriter, FORMAT_VERSION};
pub use traits::Dispatcher;
pub use types::{
    FailureKind, FailureRecord, Fingerprint, InteractionRecord, Mode, Outcome, RequestRecord,
    ResponseRecord, TraceMetadata,
};
