//! Process-wide activation boundary
//!
//! Interception must be installed exactly once, before any instrumented call
//! site runs. Installation is explicit and idempotent: the first `install`
//! wins and returns a handle; repeats are no-ops that return the same handle.
//! The configuration values come from an external collaborator (typically an
//! environment-variable parser); the engine only honors them.

use crate::types::Mode;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Values the external configuration layer hands to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationConfig {
    /// Whether interception records, replays, or stays inert
    pub mode: Mode,
    /// Trace file to write (record) or read (replay)
    pub trace_path: PathBuf,
    /// Collect per-attempt diagnostic detail
    pub diagnostics: bool,
}

/// Handle produced by installation, passed to the session controller
#[derive(Debug)]
pub struct Activation {
    config: ActivationConfig,
}

impl Activation {
    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn trace_path(&self) -> &std::path::Path {
        &self.config.trace_path
    }

    pub fn diagnostics(&self) -> bool {
        self.config.diagnostics
    }
}

static ACTIVATION: OnceLock<Activation> = OnceLock::new();

/// Install interception for this process
///
/// The first call stores the configuration; later calls ignore theirs and
/// return the handle installed first. Never an error.
pub fn install(config: ActivationConfig) -> &'static Activation {
    ACTIVATION.get_or_init(|| Activation { config })
}

/// The installed handle, if any
pub fn installed() -> Option<&'static Activation> {
    ACTIVATION.get()
}

/// Whether interception is installed and not inert
pub fn is_active() -> bool {
    matches!(current_mode(), Mode::Record | Mode::Replay)
}

/// The process-wide mode; `Off` when nothing is installed
pub fn current_mode() -> Mode {
    ACTIVATION.get().map_or(Mode::Off, |a| a.config.mode)
}
