//! Identifier types for the VPR gate.
//!
//! Every identifier that crosses the gate boundary (records, sessions, requests, correlation
//! chains) uses a *canonical* UUID representation: **32 lowercase hexadecimal characters**
//! with no hyphens. Externally supplied identifiers that are not already canonical are
//! rejected rather than normalised, so the same logical id can never appear in the audit
//! stream under two spellings.
//!
//! Audit entries are keyed by a [`TimestampId`], a time-prefixed identifier that sorts in
//! the order entries were written. [`TimestampIdGenerator`] guarantees strictly increasing
//! timestamps even when several entries are written within the same millisecond.
//!
//! ## Canonical UUID form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`

mod ids;
mod service;

pub use ids::{CorrelationId, RecordId, RequestId, SessionId};
pub use service::{CanonicalUuid, TimestampId, TimestampIdGenerator, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
