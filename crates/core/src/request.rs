//! Proposed transitions as submitted to the gate.
//!
//! State names travel as strings and are resolved inside the gate, so a request naming a state
//! that does not exist (such as `Executed`) is still evaluated, audited and denied rather than
//! rejected at the parsing boundary.

use crate::actor::{Actor, Principal};
use crate::config::DataClassification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vpr_types::{NonEmptyText, RecordKind};
use vpr_uuid::{CorrelationId, RecordId, RequestId, SessionId};

/// A human confirmation as attested by the identity collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HumanConfirmation {
    pub confirmer_id: NonEmptyText,
    pub principal: Principal,
    /// Set by the identity collaborator once it has verified the confirmer.
    pub verified: bool,
    pub record_id: RecordId,
    pub from_state: String,
    pub to_state: String,
    pub confirmed_at: DateTime<Utc>,
}

/// Boundary the request claims to operate within.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoundaryContext {
    pub environment: String,
    pub tenant_id: String,
    pub data_classification: DataClassification,
    pub session_id: SessionId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionRequest {
    pub record_kind: RecordKind,
    pub record_id: RecordId,
    pub from_state: String,
    pub to_state: String,
    pub actor: Actor,
    #[serde(default)]
    pub rationale: String,
    pub correlation_id: CorrelationId,
    pub request_id: RequestId,
    #[serde(default)]
    pub confirmation: Option<HumanConfirmation>,
    pub boundary: BoundaryContext,
}

impl TransitionRequest {
    /// Short action label used in logs and audit entries.
    pub fn action(&self) -> String {
        format!(
            "{}:{}->{}",
            self.record_kind, self.from_state, self.to_state
        )
    }
}
