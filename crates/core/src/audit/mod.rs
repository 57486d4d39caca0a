//! Append-only audit evidence.
//!
//! Every gate decision, applied transition, configuration change and subsystem block is
//! written here exactly once. Sinks expose `append` and reads; there is no update or delete.
//! Each stored entry is sealed into a SHA-256 hash chain so that a rewritten or removed line is
//! detectable by [`verify_chain`].

mod jsonl;
mod memory;
mod recorder;

pub use jsonl::JsonlAuditSink;
pub use memory::InMemoryAuditSink;
pub use recorder::AuditRecorder;

use crate::actor::Actor;
use crate::{AuditError, AuditResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use vpr_types::RecordKind;
use vpr_uuid::{CorrelationId, RecordId, RequestId, SessionId, TimestampId};

/// Reference to a written audit entry, handed back as proof of a decision.
pub type AuditRef = TimestampId;

/// Previous-hash value of the first entry in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    TransitionDecision,
    TransitionApplied,
    ConfigurationChange,
    SubsystemBlocked,
}

/// Where `recorded_at` came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    Trusted,
    /// The trusted clock had no reading; the host clock was used and the entry says so.
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultingState {
    State(String),
    Denied,
    NotApplicable,
}

/// Audit content before it is stamped with an id and time.
#[derive(Clone, Debug, PartialEq)]
pub struct EntryDraft {
    pub entry_type: EntryType,
    pub actor_id: String,
    pub actor_role: String,
    pub session_id: Option<SessionId>,
    pub correlation_id: Option<CorrelationId>,
    pub request_id: Option<RequestId>,
    pub record_kind: Option<RecordKind>,
    pub record_id: Option<RecordId>,
    pub action: String,
    pub prior_state: Option<String>,
    pub resulting_state: ResultingState,
    pub machine_authored: Option<bool>,
    pub evidence: serde_json::Value,
}

impl EntryDraft {
    /// A draft attributed to the gate process itself.
    pub fn system(entry_type: EntryType, action: impl Into<String>) -> Self {
        Self {
            entry_type,
            actor_id: "vpr-gate".to_owned(),
            actor_role: "System".to_owned(),
            session_id: None,
            correlation_id: None,
            request_id: None,
            record_kind: None,
            record_id: None,
            action: action.into(),
            prior_state: None,
            resulting_state: ResultingState::NotApplicable,
            machine_authored: None,
            evidence: serde_json::Value::Null,
        }
    }

    /// A draft attributed to `actor`.
    pub fn for_actor(entry_type: EntryType, action: impl Into<String>, actor: &Actor) -> Self {
        Self {
            actor_id: actor.id.to_string(),
            actor_role: actor.principal.label(),
            session_id: Some(actor.session_id),
            ..Self::system(entry_type, action)
        }
    }

    pub(crate) fn stamp(
        self,
        entry_id: TimestampId,
        recorded_at: DateTime<Utc>,
        timestamp_source: TimestampSource,
    ) -> AuditEntry {
        AuditEntry {
            entry_id,
            entry_type: self.entry_type,
            recorded_at,
            timestamp_source,
            actor_id: self.actor_id,
            actor_role: self.actor_role,
            session_id: self.session_id,
            correlation_id: self.correlation_id,
            request_id: self.request_id,
            record_kind: self.record_kind,
            record_id: self.record_id,
            action: self.action,
            prior_state: self.prior_state,
            resulting_state: self.resulting_state,
            machine_authored: self.machine_authored,
            evidence: self.evidence,
        }
    }
}

/// An immutable audit entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: TimestampId,
    pub entry_type: EntryType,
    pub recorded_at: DateTime<Utc>,
    pub timestamp_source: TimestampSource,
    pub actor_id: String,
    pub actor_role: String,
    pub session_id: Option<SessionId>,
    pub correlation_id: Option<CorrelationId>,
    pub request_id: Option<RequestId>,
    pub record_kind: Option<RecordKind>,
    pub record_id: Option<RecordId>,
    pub action: String,
    pub prior_state: Option<String>,
    pub resulting_state: ResultingState,
    pub machine_authored: Option<bool>,
    pub evidence: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integrity {
    pub previous_hash: String,
    pub entry_hash: String,
}

/// An entry as stored: content plus its position in the hash chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SealedEntry {
    #[serde(flatten)]
    pub entry: AuditEntry,
    pub integrity: Integrity,
}

impl SealedEntry {
    pub(crate) fn seal(entry: AuditEntry, previous_hash: &str) -> AuditResult<Self> {
        let entry_hash = entry_hash(previous_hash, &entry)?;
        Ok(Self {
            entry,
            integrity: Integrity {
                previous_hash: previous_hash.to_owned(),
                entry_hash,
            },
        })
    }
}

/// Hash of an entry chained onto `previous_hash`.
pub fn entry_hash(previous_hash: &str, entry: &AuditEntry) -> AuditResult<String> {
    let body = serde_json::to_vec(entry)?;
    let mut hasher = Sha256::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(&body);
    Ok(hex::encode(hasher.finalize()))
}

/// Checks that `entries` form an unbroken chain from [`GENESIS_HASH`].
///
/// # Errors
///
/// Returns [`AuditError::ChainBroken`] naming the first entry that does not verify.
pub fn verify_chain(entries: &[SealedEntry]) -> AuditResult<()> {
    let mut previous_hash = GENESIS_HASH.to_owned();
    for sealed in entries {
        if sealed.integrity.previous_hash != previous_hash
            || entry_hash(&previous_hash, &sealed.entry)? != sealed.integrity.entry_hash
        {
            return Err(AuditError::ChainBroken(sealed.entry.entry_id.clone()));
        }
        previous_hash = sealed.integrity.entry_hash.clone();
    }
    Ok(())
}

/// Append-only audit storage.
///
/// Implementations serialise appends internally; an append is all-or-nothing.
pub trait AuditSink: Send + Sync {
    /// Seals and appends `entry`.
    ///
    /// # Errors
    ///
    /// [`AuditError::DuplicateEntry`] if an entry with the same id exists, or an I/O or
    /// availability error if the entry could not be durably written.
    fn append(&self, entry: AuditEntry) -> AuditResult<AuditRef>;

    /// Whether the sink can currently accept writes.
    fn probe(&self) -> AuditResult<()>;

    fn entry(&self, id: &AuditRef) -> AuditResult<Option<SealedEntry>>;

    fn by_correlation(&self, correlation_id: &CorrelationId) -> AuditResult<Vec<SealedEntry>>;

    /// Every entry in append order.
    fn entries(&self) -> AuditResult<Vec<SealedEntry>>;

    /// Id of the most recent entry, used to resume id generation after a restart.
    fn last_id(&self) -> Option<AuditRef>;
}
