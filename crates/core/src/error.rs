use vpr_types::{RecordKind, TextError};
use vpr_uuid::{RecordId, TimestampId, UuidError};

/// Errors raised by the gate's collaborators.
///
/// Denials are *not* errors: a denied transition is an ordinary [`crate::Decision`] value.
/// This enum covers the things that genuinely fail: configuration that cannot be loaded,
/// audit storage that cannot be written, proofs that do not check out when a downstream
/// collaborator tries to apply a transition.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to serialize JSON: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize JSON: {0}")]
    Deserialization(serde_json::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),
    #[error("invalid text: {0}")]
    Text(#[from] TextError),
    #[error("invalid identifier: {0}")]
    Id(#[from] UuidError),

    #[error("not authorised: {0}")]
    Unauthorised(String),

    #[error("{kind} record already registered: {id}")]
    RecordExists { kind: RecordKind, id: RecordId },
    #[error("{kind} record not found: {id}")]
    RecordNotFound { kind: RecordKind, id: RecordId },
    #[error("record invariant violated: {0}")]
    RecordInvariant(String),

    #[error("decision proof rejected: {0}")]
    ProofRejected(String),
    #[error("stale from-state for {id}: expected {expected}, current {actual}")]
    StaleFromState {
        id: RecordId,
        expected: String,
        actual: String,
    },
}

pub type GateResult<T> = std::result::Result<T, GateError>;

/// Errors specific to the append-only audit stream.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit immutability violation: entry {0} already exists")]
    DuplicateEntry(TimestampId),
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("audit log corrupt at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
    #[error("audit hash chain broken at entry {0}")]
    ChainBroken(TimestampId),
}

pub type AuditResult<T> = std::result::Result<T, AuditError>;
