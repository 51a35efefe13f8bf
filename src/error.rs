//! Error types for the record/replay engine

use crate::types::Fingerprint;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Replay mismatch: {0}")]
    Mismatch(#[from] ReplayMismatchError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),
}

/// Trace file unreadable or unwritable
#[derive(Debug, Error)]
pub enum IoError {
    #[error("cannot open {path} for writing: {reason}")]
    OpenForWrite { path: PathBuf, reason: String },

    #[error("cannot read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("write to {path} failed: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("flush of {path} failed: {reason}")]
    Flush { path: PathBuf, reason: String },
}

/// Corrupt or incompatible trace content
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("not a trace file: bad magic")]
    BadMagic,

    #[error("unsupported trace format version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u16, supported: u16 },

    #[error("trace truncated at byte offset {offset}")]
    Truncated { offset: u64 },

    #[error("checksum mismatch in frame at byte offset {offset}")]
    ChecksumMismatch { offset: u64 },

    #[error("frame decode failed at byte offset {offset}: {reason}")]
    Decode { offset: u64, reason: String },

    #[error("frame encode failed: {reason}")]
    Encode { reason: String },

    #[error("record invariant violated: {reason}")]
    InvariantViolated { reason: String },
}

/// Operation invalid for the current session phase
#[derive(Debug, Error)]
pub enum StateError {
    #[error("append rejected: trace already finalized")]
    AppendAfterFinalize,

    #[error("session builder incomplete: {field} is required")]
    Incomplete { field: &'static str },

    #[error("operation requires {required} mode, session is in {actual} mode")]
    WrongMode { required: String, actual: String },
}

/// Live call sequence diverged from the trace; always fatal to the session
#[derive(Debug, Error)]
pub enum ReplayMismatchError {
    #[error(
        "no recorded interaction for {method} {url} (fingerprint {fingerprint}): \
         {consumed} of {recorded} recorded interactions already consumed"
    )]
    Exhausted {
        method: String,
        url: String,
        fingerprint: Fingerprint,
        recorded: usize,
        consumed: usize,
    },
}

/// Trace path absent at replay open
#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("trace file {path} does not exist")]
    TraceMissing { path: PathBuf },
}
