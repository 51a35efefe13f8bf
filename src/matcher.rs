//! Matching and retry reproduction
//!
//! The replay half correlates each live request to the interaction captured
//! for it: requests are keyed by fingerprint, and records sharing a
//! fingerprint are consumed strictly in recorded order. Because a retried
//! call was captured as consecutive attempts of one `call_id`, FIFO
//! consumption hands the caller the recorded failure first and the recorded
//! success on the retry, reproducing the original control flow.
//!
//! The recording half assigns `call_id`s and correlates a program's own
//! retries into attempt sequences as they happen.

use crate::error::ReplayMismatchError;
use crate::fingerprint::Fingerprinter;
use crate::trace_store::Trace;
use crate::types::{Fingerprint, Outcome, RequestRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Replay progress of one recorded logical call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// No attempt consumed yet
    NotStarted,
    /// A failure was consumed and a further recorded attempt remains
    Retrying,
    /// The recorded success was consumed
    Succeeded,
    /// The final recorded attempt was consumed and it was a failure
    Exhausted,
}

/// Per-fingerprint replay state: matching records and the next unconsumed one
#[derive(Debug)]
struct MatchCursor {
    /// Indices into the trace record sequence, in recorded order
    indices: Vec<usize>,
    next: usize,
}

impl MatchCursor {
    fn collect(trace: &Trace, fingerprint: Fingerprint) -> Self {
        let indices = trace
            .records()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.fingerprint == fingerprint)
            .map(|(i, _)| i)
            .collect();
        Self { indices, next: 0 }
    }
}

/// Resolves live requests against a loaded trace
///
/// Safe to share across threads: the cursor advance is a critical section,
/// so concurrent callers with one fingerprint each consume a distinct record
/// and never consume out of recorded order.
#[derive(Debug)]
pub struct Matcher {
    trace: Trace,
    fingerprinter: Fingerprinter,
    cursors: Mutex<HashMap<Fingerprint, MatchCursor>>,
    call_states: Mutex<HashMap<u64, CallState>>,
    /// Attempts recorded per call, fixed at load
    attempt_counts: HashMap<u64, u32>,
}

impl Matcher {
    /// Create a matcher over a validated trace
    pub fn new(trace: Trace, fingerprinter: Fingerprinter) -> Self {
        let mut attempt_counts: HashMap<u64, u32> = HashMap::new();
        for record in trace.records() {
            let count = attempt_counts.entry(record.call_id).or_insert(0);
            *count = (*count).max(record.attempt_index + 1);
        }

        Self {
            trace,
            fingerprinter,
            cursors: Mutex::new(HashMap::new()),
            call_states: Mutex::new(HashMap::new()),
            attempt_counts,
        }
    }

    /// Resolve a live request to its recorded outcome
    ///
    /// Returns the captured response or failure verbatim. A request whose
    /// fingerprint has no unconsumed record diverges from the recorded run
    /// and yields a `ReplayMismatchError`, which is fatal to the session.
    pub fn resolve(&self, request: &RequestRecord) -> Result<ResolvedAttempt, ReplayMismatchError> {
        let fingerprint = self.fingerprinter.fingerprint(request);

        // Critical section: read the next unconsumed index and advance it.
        let (call_id, attempt_index, outcome) = {
            let mut cursors = self.cursors.lock().expect("cursor lock poisoned");
            let cursor = cursors
                .entry(fingerprint)
                .or_insert_with(|| MatchCursor::collect(&self.trace, fingerprint));

            if cursor.next >= cursor.indices.len() {
                return Err(ReplayMismatchError::Exhausted {
                    method: request.method.clone(),
                    url: request.url.clone(),
                    fingerprint,
                    recorded: cursor.indices.len(),
                    consumed: cursor.next,
                });
            }

            let record = &self.trace.records()[cursor.indices[cursor.next]];
            cursor.next += 1;
            (record.call_id, record.attempt_index, record.outcome.clone())
        };

        let state = self.transition(call_id, attempt_index, &outcome);

        Ok(ResolvedAttempt {
            call_id,
            attempt_index,
            state,
            outcome,
        })
    }

    /// Replay state of a recorded call
    pub fn call_state(&self, call_id: u64) -> CallState {
        self.call_states
            .lock()
            .expect("call state lock poisoned")
            .get(&call_id)
            .copied()
            .unwrap_or(CallState::NotStarted)
    }

    /// Number of recorded interactions not yet consumed
    pub fn remaining(&self) -> usize {
        let consumed: usize = self
            .cursors
            .lock()
            .expect("cursor lock poisoned")
            .values()
            .map(|c| c.next)
            .sum();
        self.trace.len() - consumed
    }

    /// Whether every recorded interaction has been consumed
    pub fn is_fully_consumed(&self) -> bool {
        self.remaining() == 0
    }

    /// The trace this matcher resolves against
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    fn transition(&self, call_id: u64, attempt_index: u32, outcome: &Outcome) -> CallState {
        let recorded_attempts = self.attempt_counts.get(&call_id).copied().unwrap_or(0);
        let state = match outcome {
            Outcome::Success(_) => CallState::Succeeded,
            Outcome::Failure(_) if attempt_index + 1 < recorded_attempts => CallState::Retrying,
            Outcome::Failure(_) => CallState::Exhausted,
        };
        self.call_states
            .lock()
            .expect("call state lock poisoned")
            .insert(call_id, state);
        state
    }
}

/// One consumed recorded attempt and the call state it produced
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttempt {
    pub call_id: u64,
    pub attempt_index: u32,
    pub state: CallState,
    pub outcome: Outcome,
}

/// Recording-side attempt correlation
///
/// Assigns a fresh `call_id` to each new logical call and folds a program's
/// own retries into the same call: while the most recent attempt for a
/// fingerprint ended in failure, the next identical-fingerprint request is
/// that call's next attempt. A success concludes the call, so the sequence
/// invariant (all attempts but the last are failures) holds by construction.
#[derive(Debug, Default)]
pub struct AttemptTracker {
    next_call_id: AtomicU64,
    open_calls: Mutex<HashMap<Fingerprint, OpenCall>>,
}

#[derive(Debug, Clone, Copy)]
struct OpenCall {
    call_id: u64,
    next_attempt: u32,
}

impl AttemptTracker {
    pub fn new() -> Self {
        Self {
            next_call_id: AtomicU64::new(0),
            open_calls: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the (call_id, attempt_index) slot for an attempt about to run
    ///
    /// Taking the open entry out of the map means a concurrent identical
    /// request is treated as a distinct logical call, not a retry.
    pub fn begin_attempt(&self, fingerprint: Fingerprint) -> (u64, u32) {
        let mut open = self.open_calls.lock().expect("open call lock poisoned");
        match open.remove(&fingerprint) {
            Some(call) => (call.call_id, call.next_attempt),
            None => (self.next_call_id.fetch_add(1, Ordering::SeqCst), 0),
        }
    }

    /// Record how an attempt ended; failures keep the call open for a retry
    pub fn complete_attempt(
        &self,
        fingerprint: Fingerprint,
        call_id: u64,
        attempt_index: u32,
        outcome: &Outcome,
    ) {
        if outcome.is_failure() {
            let mut open = self.open_calls.lock().expect("open call lock poisoned");
            open.insert(
                fingerprint,
                OpenCall {
                    call_id,
                    next_attempt: attempt_index + 1,
                },
            );
        }
    }
}
