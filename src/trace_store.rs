//! Trace persistence: append-only writer and validating reader
//!
//! A trace is a single portable file: a self-describing header followed by a
//! metadata frame and then one frame per interaction record. Every frame is a
//! little-endian u32 payload length, the bincode payload, and a 32-byte
//! blake3 checksum of the payload. Frames are complete or absent, so a
//! session that dies mid-run still leaves a readable trace of the
//! interactions that finished; a file cut mid-frame is rejected whole.

use crate::error::{EngineError, FormatError, IoError, NotFoundError, StateError};
use crate::types::{Fingerprint, InteractionRecord, Outcome, TraceMetadata};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// File magic, first four bytes of every trace
const MAGIC: [u8; 4] = *b"RTRC";

/// Current trace format version
///
/// Readers accept any version up to this one; newer versions are rejected
/// with a `FormatError`. Additions within a version append fields to frame
/// payloads, which old readers ignore as trailing bytes.
pub const FORMAT_VERSION: u16 = 1;

const CHECKSUM_LEN: usize = 32;
const LEN_PREFIX: usize = 4;

/// Append-only trace writer for a recording session
///
/// `append` is safe to call from multiple threads; `sequence_position` is
/// assigned under the writer lock so file order and sequence order agree.
#[derive(Debug)]
pub struct TraceWriter {
    path: PathBuf,
    inner: Mutex<WriterInner>,
}

#[derive(Debug)]
struct WriterInner {
    // None once finalized
    file: Option<BufWriter<File>>,
    next_sequence: u64,
}

impl TraceWriter {
    /// Create a trace file and write its header and metadata
    pub fn open_for_record(
        path: impl AsRef<Path>,
        metadata: TraceMetadata,
    ) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| IoError::OpenForWrite {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let mut writer = BufWriter::new(file);

        writer
            .write_all(&MAGIC)
            .and_then(|_| writer.write_all(&FORMAT_VERSION.to_le_bytes()))
            .map_err(|e| IoError::Write {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let metadata_bytes = bincode::serialize(&metadata).map_err(|e| FormatError::Encode {
            reason: format!("metadata encode failed: {}", e),
        })?;
        write_frame(&mut writer, &metadata_bytes).map_err(|e| IoError::Write {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            path,
            inner: Mutex::new(WriterInner {
                file: Some(writer),
                next_sequence: 0,
            }),
        })
    }

    /// Append one interaction, assigning the next `sequence_position`
    pub fn append(
        &self,
        call_id: u64,
        attempt_index: u32,
        fingerprint: Fingerprint,
        outcome: Outcome,
    ) -> Result<u64, EngineError> {
        let mut inner = self.inner.lock().expect("trace writer lock poisoned");
        let sequence_position = inner.next_sequence;

        let record = InteractionRecord {
            call_id,
            attempt_index,
            fingerprint,
            outcome,
            sequence_position,
        };
        let payload = bincode::serialize(&record).map_err(|e| FormatError::Encode {
            reason: format!("record encode failed: {}", e),
        })?;

        let file = inner
            .file
            .as_mut()
            .ok_or(StateError::AppendAfterFinalize)?;
        write_frame(file, &payload).map_err(|e| IoError::Write {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        inner.next_sequence += 1;
        Ok(sequence_position)
    }

    /// Flush and durably persist all appended records, then close the trace
    ///
    /// Idempotent; any later `append` fails with a `StateError`.
    pub fn finalize(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().expect("trace writer lock poisoned");
        let Some(mut file) = inner.file.take() else {
            return Ok(());
        };

        file.flush().map_err(|e| IoError::Flush {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        file.get_ref().sync_all().map_err(|e| IoError::Flush {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Whether `finalize` has run
    pub fn is_finalized(&self) -> bool {
        self.inner
            .lock()
            .expect("trace writer lock poisoned")
            .file
            .is_none()
    }

    /// Number of records appended so far
    pub fn len(&self) -> u64 {
        self.inner
            .lock()
            .expect("trace writer lock poisoned")
            .next_sequence
    }

    /// Whether any record has been appended
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of the trace file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TraceWriter {
    fn drop(&mut self) {
        // Keep the trace usable when the session unwinds without finalizing.
        let _ = self.finalize();
    }
}

/// Fully-loaded, immutable trace for a replay session
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    metadata: TraceMetadata,
    records: Vec<InteractionRecord>,
}

impl Trace {
    /// Load and validate a complete trace file
    pub fn open_for_replay(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(NotFoundError::TraceMissing {
                path: path.to_path_buf(),
            }
            .into());
        }
        let bytes = std::fs::read(path).map_err(|e| IoError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_bytes(&bytes)
    }

    /// Build a trace from already-decoded parts, enforcing record invariants
    pub fn from_parts(
        metadata: TraceMetadata,
        records: Vec<InteractionRecord>,
    ) -> Result<Self, EngineError> {
        validate_records(&records)?;
        Ok(Self { metadata, records })
    }

    /// Decode a trace from raw file content
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        let header_len = MAGIC.len() + 2;
        if bytes.len() < header_len {
            return Err(FormatError::Truncated { offset: 0 }.into());
        }
        if bytes[..MAGIC.len()] != MAGIC {
            return Err(FormatError::BadMagic.into());
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version > FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion {
                found: version,
                supported: FORMAT_VERSION,
            }
            .into());
        }

        let mut offset = header_len;
        let metadata_frame = read_frame(bytes, &mut offset)?;
        let metadata: TraceMetadata =
            bincode::deserialize(metadata_frame).map_err(|e| FormatError::Decode {
                offset: header_len as u64,
                reason: format!("metadata decode failed: {}", e),
            })?;

        let mut records = Vec::new();
        while offset < bytes.len() {
            let frame_offset = offset as u64;
            let payload = read_frame(bytes, &mut offset)?;
            // bincode::deserialize permits trailing bytes, so payloads from a
            // same-version writer with appended fields still decode.
            let record: InteractionRecord =
                bincode::deserialize(payload).map_err(|e| FormatError::Decode {
                    offset: frame_offset,
                    reason: format!("record decode failed: {}", e),
                })?;
            records.push(record);
        }

        validate_records(&records)?;
        Ok(Self { metadata, records })
    }

    /// Session metadata, read-only
    pub fn metadata(&self) -> &TraceMetadata {
        &self.metadata
    }

    /// Free-form session tags, read-only
    pub fn tags(&self) -> &[String] {
        &self.metadata.tags
    }

    /// All interaction records in recorded order
    pub fn records(&self) -> &[InteractionRecord] {
        &self.records
    }

    /// Number of records in the trace
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the trace holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> std::io::Result<()> {
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(payload)?;
    writer.write_all(blake3::hash(payload).as_bytes())?;
    Ok(())
}

fn read_frame<'a>(bytes: &'a [u8], offset: &mut usize) -> Result<&'a [u8], FormatError> {
    let frame_offset = *offset as u64;
    let remaining = &bytes[*offset..];
    if remaining.len() < LEN_PREFIX {
        return Err(FormatError::Truncated {
            offset: frame_offset,
        });
    }
    let len = u32::from_le_bytes([remaining[0], remaining[1], remaining[2], remaining[3]]) as usize;
    if remaining.len() < LEN_PREFIX + len + CHECKSUM_LEN {
        return Err(FormatError::Truncated {
            offset: frame_offset,
        });
    }

    let payload = &remaining[LEN_PREFIX..LEN_PREFIX + len];
    let stored = &remaining[LEN_PREFIX + len..LEN_PREFIX + len + CHECKSUM_LEN];
    if blake3::hash(payload).as_bytes() != stored {
        return Err(FormatError::ChecksumMismatch {
            offset: frame_offset,
        });
    }

    *offset += LEN_PREFIX + len + CHECKSUM_LEN;
    Ok(payload)
}

/// Enforce the record invariants a valid trace must satisfy
///
/// Rejects the whole file on the first violation; a trace that fails here is
/// corrupt or was produced by a broken writer, and partial replay from it
/// would not be trustworthy.
fn validate_records(records: &[InteractionRecord]) -> Result<(), FormatError> {
    let mut last_sequence: Option<u64> = None;
    // call_id -> (next expected attempt, fingerprint, last outcome was success)
    let mut calls: HashMap<u64, (u32, Fingerprint, bool)> = HashMap::new();

    for record in records {
        if let Some(last) = last_sequence {
            if record.sequence_position <= last {
                return Err(FormatError::InvariantViolated {
                    reason: format!(
                        "sequence_position {} after {} is not strictly increasing",
                        record.sequence_position, last
                    ),
                });
            }
        }
        last_sequence = Some(record.sequence_position);

        match calls.get_mut(&record.call_id) {
            None => {
                if record.attempt_index != 0 {
                    return Err(FormatError::InvariantViolated {
                        reason: format!(
                            "call {} starts at attempt {} instead of 0",
                            record.call_id, record.attempt_index
                        ),
                    });
                }
                calls.insert(
                    record.call_id,
                    (1, record.fingerprint, record.outcome.is_success()),
                );
            }
            Some((next_attempt, fingerprint, concluded)) => {
                if record.attempt_index != *next_attempt {
                    return Err(FormatError::InvariantViolated {
                        reason: format!(
                            "call {} attempt {} is not contiguous (expected {})",
                            record.call_id, record.attempt_index, next_attempt
                        ),
                    });
                }
                if *concluded {
                    return Err(FormatError::InvariantViolated {
                        reason: format!(
                            "call {} has an attempt after a success",
                            record.call_id
                        ),
                    });
                }
                if record.fingerprint != *fingerprint {
                    return Err(FormatError::InvariantViolated {
                        reason: format!(
                            "call {} changes fingerprint between attempts",
                            record.call_id
                        ),
                    });
                }
                *next_attempt += 1;
                *concluded = record.outcome.is_success();
            }
        }
    }

    Ok(())
}
