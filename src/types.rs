//! Core data types for the record/replay engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable matching key derived from a request's deterministic fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Engine mode for a process or session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Live-network execution with capture
    Record,
    /// No-network execution driven entirely by a prior trace
    Replay,
    /// Interception installed but inert
    Off,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Record => write!(f, "record"),
            Mode::Replay => write!(f, "replay"),
            Mode::Off => write!(f, "off"),
        }
    }
}

/// Library-neutral representation of one outbound request
///
/// Call-site shims translate their networking library's request object into
/// this shape before handing it to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RequestRecord {
    /// Create a request with no headers and an empty body
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request body
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Captured response payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Classification of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The call exceeded its deadline
    Timeout,
    /// Connection could not be established
    Connect,
    /// Name resolution failed
    Dns,
    /// TLS handshake or certificate failure
    Tls,
    /// Malformed wire data
    Protocol,
    /// The shim treats an HTTP error status as a failure
    Status,
    /// Anything the shim could not classify further
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connect => "connect",
            FailureKind::Dns => "dns",
            FailureKind::Tls => "tls",
            FailureKind::Protocol => "protocol",
            FailureKind::Status => "status",
            FailureKind::Other => "other",
        };
        write!(f, "{}", name)
    }
}

/// Captured failure condition, re-raised verbatim on replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureRecord {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of one attempt, captured during recording and reproduced on replay
///
/// A failing real call is not an engine error; it is data. Conversion to a
/// library-specific error type happens only in the call-site shim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success(ResponseRecord),
    Failure(FailureRecord),
}

impl Outcome {
    /// Whether this outcome is a success
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Whether this outcome is a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }
}

/// One captured call attempt
///
/// A retried call produces multiple records sharing `call_id` with contiguous
/// `attempt_index` values; every attempt but the last in such a sequence is a
/// `Failure`. `sequence_position` is the global recording order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub call_id: u64,
    pub attempt_index: u32,
    pub fingerprint: Fingerprint,
    pub outcome: Outcome,
    pub sequence_position: u64,
}

/// Session metadata stored alongside the record sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceMetadata {
    /// Random token minted when the recording session opened
    pub session_id: String,
    /// Wall-clock creation time of the recording session
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Free-form markers, e.g. "trigger-bug", surfaced to external tooling
    pub tags: Vec<String>,
}

impl TraceMetadata {
    /// Metadata for a fresh recording session with a random session id
    pub fn new(tags: Vec<String>) -> Self {
        Self {
            session_id: format!("{:016x}", rand::random::<u64>()),
            created_at: chrono::Utc::now(),
            tags,
        }
    }

    /// Whether a tag is present
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_display_is_hex() {
        let fp = Fingerprint([0xab; 32]);
        assert_eq!(fp.to_string(), "ab".repeat(32));
    }

    #[test]
    fn test_request_builder() {
        let request = RequestRecord::new("GET", "https://api.example.com/users/1")
            .with_header("Accept", "application/json")
            .with_body(b"".to_vec());

        assert_eq!(request.method, "GET");
        assert_eq!(request.headers.len(), 1);
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_outcome_predicates() {
        let success = Outcome::Success(ResponseRecord {
            status: 200,
            headers: vec![],
            body: b"ok".to_vec(),
        });
        let failure = Outcome::Failure(FailureRecord::new(FailureKind::Timeout, "deadline"));

        assert!(success.is_success());
        assert!(!success.is_failure());
        assert!(failure.is_failure());
    }

    #[test]
    fn test_metadata_tags() {
        let metadata = TraceMetadata::new(vec!["trigger-bug".to_string()]);
        assert!(metadata.has_tag("trigger-bug"));
        assert!(!metadata.has_tag("other"));
        assert_eq!(metadata.session_id.len(), 16);
    }

    #[test]
    fn test_record_serde_round_trip() {
        let record = InteractionRecord {
            call_id: 2,
            attempt_index: 1,
            fingerprint: Fingerprint([7; 32]),
            outcome: Outcome::Failure(FailureRecord::new(FailureKind::Status, "503")),
            sequence_position: 3,
        };

        let bytes = bincode::serialize(&record).unwrap();
        let decoded: InteractionRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(record, decoded);
    }
}
