//! Scheduling and order records.
//!
//! Records are authored elsewhere and handed to the gate for evaluation. The gate reads them;
//! only [`crate::registry::RecordRegistry`] ever changes their state, and it does so by
//! appending to `history` rather than rewriting anything already recorded.

use crate::audit::AuditRef;
use crate::state::{LifecycleState, OrderState, RecordState, SchedulingState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vpr_types::{NonEmptyText, RecordKind};
use vpr_uuid::{CorrelationId, RecordId};

/// One applied transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry<S> {
    pub from: S,
    pub to: S,
    pub correlation_id: CorrelationId,
    pub actor_id: NonEmptyText,
    pub audit_ref: AuditRef,
    pub applied_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleParameters {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub participant_ids: Vec<NonEmptyText>,
    #[serde(default)]
    pub resource_ids: Vec<NonEmptyText>,
    #[serde(default)]
    pub purpose: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulingRecord {
    pub id: RecordId,
    pub tenant_id: NonEmptyText,
    pub state: SchedulingState,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub submitter: NonEmptyText,
    #[serde(default)]
    pub confirmer: Option<NonEmptyText>,
    /// Correlation id of the request that created the proposal.
    pub correlation_id: CorrelationId,
    pub parameters: ScheduleParameters,
    #[serde(default)]
    pub history: Vec<HistoryEntry<SchedulingState>>,
}

/// Clinical priority of an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Routine,
    Urgent,
    Stat,
}

impl Urgency {
    /// Urgent and stat orders must carry a documented rationale.
    pub fn requires_rationale(self) -> bool {
        matches!(self, Urgency::Urgent | Urgency::Stat)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderContent {
    pub order_type: NonEmptyText,
    pub subject_id: NonEmptyText,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub urgency: Urgency,
    #[serde(default)]
    pub rationale: Option<String>,
}

impl OrderContent {
    pub fn has_documented_rationale(&self) -> bool {
        self.rationale
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderRecord {
    pub id: RecordId,
    pub tenant_id: NonEmptyText,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub creator: NonEmptyText,
    #[serde(default)]
    pub confirmer: Option<NonEmptyText>,
    pub correlation_id: CorrelationId,
    pub content: OrderContent,
    /// Set when the order was drafted by automation. Always surfaced downstream.
    pub machine_authored: bool,
    #[serde(default)]
    pub history: Vec<HistoryEntry<OrderState>>,
}

/// A record of either kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Scheduling(SchedulingRecord),
    Order(OrderRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Scheduling(_) => RecordKind::Scheduling,
            Record::Order(_) => RecordKind::Order,
        }
    }

    pub fn id(&self) -> RecordId {
        match self {
            Record::Scheduling(r) => r.id,
            Record::Order(r) => r.id,
        }
    }

    pub fn tenant_id(&self) -> &NonEmptyText {
        match self {
            Record::Scheduling(r) => &r.tenant_id,
            Record::Order(r) => &r.tenant_id,
        }
    }

    pub fn state(&self) -> RecordState {
        match self {
            Record::Scheduling(r) => r.state.into(),
            Record::Order(r) => r.state.into(),
        }
    }

    pub fn confirmer(&self) -> Option<&NonEmptyText> {
        match self {
            Record::Scheduling(r) => r.confirmer.as_ref(),
            Record::Order(r) => r.confirmer.as_ref(),
        }
    }

    /// `Some` for orders only.
    pub fn machine_authored(&self) -> Option<bool> {
        match self {
            Record::Scheduling(_) => None,
            Record::Order(r) => Some(r.machine_authored),
        }
    }

    /// Whether `actor_id` is a participant in (scheduling) or the subject of (order) this
    /// record. Used to scope the Patient role to its own records.
    pub fn involves(&self, actor_id: &NonEmptyText) -> bool {
        match self {
            Record::Scheduling(r) => {
                r.submitter == *actor_id || r.parameters.participant_ids.contains(actor_id)
            }
            Record::Order(r) => r.content.subject_id == *actor_id,
        }
    }

    /// The correlation chain: the originating proposal followed by every applied transition.
    pub fn correlation_chain(&self) -> Vec<CorrelationId> {
        fn chain<S>(origin: CorrelationId, history: &[HistoryEntry<S>]) -> Vec<CorrelationId> {
            std::iter::once(origin)
                .chain(history.iter().map(|h| h.correlation_id))
                .collect()
        }
        match self {
            Record::Scheduling(r) => chain(r.correlation_id, &r.history),
            Record::Order(r) => chain(r.correlation_id, &r.history),
        }
    }

    pub fn history_len(&self) -> usize {
        match self {
            Record::Scheduling(r) => r.history.len(),
            Record::Order(r) => r.history.len(),
        }
    }

    /// Checks the structural invariants a record must hold at rest.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn check_invariants(&self) -> Result<(), String> {
        let state = self.state();
        if self.modified_at() < self.created_at() {
            return Err(format!("record {} modified before it was created", self.id()));
        }
        let confirmed_before = self.has_been_confirmed();
        match (state.is_confirmed_state(), self.confirmer().is_some()) {
            (true, false) => {
                return Err(format!(
                    "record {} is {} without a confirmer",
                    self.id(),
                    state
                ));
            }
            (false, true) if !confirmed_before && !state.is_terminal() => {
                return Err(format!(
                    "record {} has a confirmer but has not been confirmed",
                    self.id()
                ));
            }
            _ => {}
        }
        match self.last_applied_state() {
            Some(last) if last != state => Err(format!(
                "record {} state {} does not match its last history entry {}",
                self.id(),
                state,
                last
            )),
            _ => Ok(()),
        }
    }

    fn created_at(&self) -> DateTime<Utc> {
        match self {
            Record::Scheduling(r) => r.created_at,
            Record::Order(r) => r.created_at,
        }
    }

    fn modified_at(&self) -> DateTime<Utc> {
        match self {
            Record::Scheduling(r) => r.modified_at,
            Record::Order(r) => r.modified_at,
        }
    }

    fn has_been_confirmed(&self) -> bool {
        match self {
            Record::Scheduling(r) => r.history.iter().any(|h| h.to.is_confirmed_state()),
            Record::Order(r) => r.history.iter().any(|h| h.to.is_confirmed_state()),
        }
    }

    /// Decision proofs that moved this record, oldest first.
    pub fn applied_proofs(&self) -> Vec<AuditRef> {
        match self {
            Record::Scheduling(r) => r.history.iter().map(|h| h.audit_ref.clone()).collect(),
            Record::Order(r) => r.history.iter().map(|h| h.audit_ref.clone()).collect(),
        }
    }

    pub(crate) fn last_applied_state(&self) -> Option<RecordState> {
        match self {
            Record::Scheduling(r) => r.history.last().map(|h| h.to.into()),
            Record::Order(r) => r.history.last().map(|h| h.to.into()),
        }
    }
}

/// Moves a typed record to `to` and appends the history entry.
///
/// The confirmer is stamped when the record enters a confirmed state and kept afterwards.
pub(crate) fn advance<S: LifecycleState>(
    state: &mut S,
    confirmer: &mut Option<NonEmptyText>,
    modified_at: &mut DateTime<Utc>,
    history: &mut Vec<HistoryEntry<S>>,
    entry: HistoryEntry<S>,
) {
    if entry.to.is_confirmed_state() && confirmer.is_none() {
        *confirmer = Some(entry.actor_id.clone());
    }
    *state = entry.to;
    *modified_at = entry.applied_at;
    history.push(entry);
}
