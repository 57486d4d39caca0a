//! Record state source and the in-process record registry.
//!
//! The gate only ever reads records, through [`RecordStateSource`]. Applying an allowed
//! decision is a separate step owned by the registry: it checks the decision's audit proof,
//! compares the record's current state with the request's from-state under a lock, writes a
//! `TransitionApplied` audit entry and only then moves the record.

use crate::audit::{AuditRecorder, AuditRef, EntryDraft, EntryType, ResultingState};
use crate::decision::Decision;
use crate::error::{GateError, GateResult};
use crate::records::{advance, HistoryEntry, Record};
use crate::request::TransitionRequest;
use crate::state::RecordState;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use vpr_types::RecordKind;
use vpr_uuid::RecordId;

/// Authoritative current state of records, as read by the gate.
pub trait RecordStateSource: Send + Sync {
    /// A snapshot of the record, or `None` when it cannot be established.
    fn current(&self, kind: RecordKind, id: RecordId) -> Option<Record>;
}

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<(RecordKind, RecordId), Record>,
    consumed_proofs: BTreeSet<AuditRef>,
}

/// In-process record store.
#[derive(Debug, Default)]
pub struct RecordRegistry {
    inner: Mutex<Inner>,
}

impl RecordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly authored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is terminal, violates a record invariant, or is already
    /// registered.
    pub fn register(&self, record: Record) -> GateResult<()> {
        if record.state().is_terminal() {
            return Err(GateError::InvalidInput(format!(
                "cannot register {} record {} in terminal state {}",
                record.kind(),
                record.id(),
                record.state()
            )));
        }
        record.check_invariants().map_err(GateError::RecordInvariant)?;

        let mut inner = self.lock();
        let key = (record.kind(), record.id());
        if inner.records.contains_key(&key) {
            return Err(GateError::RecordExists {
                kind: key.0,
                id: key.1,
            });
        }
        tracing::info!(kind = %key.0, id = %key.1, state = %record.state(), "record registered");
        inner.records.insert(key, record);
        Ok(())
    }

    /// Restores a record previously read out of [`records`](Self::records).
    ///
    /// Terminal records are accepted when their history ends in the state they claim. The
    /// decision proofs in the history are marked used so they cannot be applied again.
    ///
    /// # Errors
    ///
    /// Returns an error if the record violates a record invariant, claims a terminal state no
    /// history entry reached, or is already registered.
    pub fn restore(&self, record: Record) -> GateResult<()> {
        record.check_invariants().map_err(GateError::RecordInvariant)?;
        let state = record.state();
        if state.is_terminal() && record.last_applied_state() != Some(state) {
            return Err(GateError::RecordInvariant(format!(
                "{} record {} is {} but no applied transition reached it",
                record.kind(),
                record.id(),
                state
            )));
        }

        let mut inner = self.lock();
        let key = (record.kind(), record.id());
        if inner.records.contains_key(&key) {
            return Err(GateError::RecordExists {
                kind: key.0,
                id: key.1,
            });
        }
        inner.consumed_proofs.extend(record.applied_proofs());
        tracing::debug!(kind = %key.0, id = %key.1, %state, "record restored");
        inner.records.insert(key, record);
        Ok(())
    }

    /// Every registered record, ordered by kind then id.
    pub fn records(&self) -> Vec<Record> {
        self.lock().records.values().cloned().collect()
    }

    /// Applies an allowed decision to its record.
    ///
    /// The decision's audit reference must resolve to the `TransitionDecision` entry that
    /// allowed exactly this request, and can be used once.
    ///
    /// # Errors
    ///
    /// - [`GateError::ProofRejected`] if the decision does not prove an allowed transition for
    ///   this request, or the proof has already been used.
    /// - [`GateError::RecordNotFound`] if the record is not registered.
    /// - [`GateError::StaleFromState`] if the record moved on since the decision.
    /// - [`GateError::Audit`] if the audit stream cannot be read or written.
    pub fn apply(
        &self,
        decision: &Decision,
        request: &TransitionRequest,
        recorder: &AuditRecorder,
    ) -> GateResult<Record> {
        let proof = verify_proof(decision, request, recorder)?;
        let to = RecordState::parse(request.record_kind, &request.to_state)
            .map_err(|e| GateError::ProofRejected(e.to_string()))?;

        let mut inner = self.lock();
        if inner.consumed_proofs.contains(&proof) {
            return Err(GateError::ProofRejected(format!(
                "decision {proof} has already been applied"
            )));
        }

        let key = (request.record_kind, request.record_id);
        let current = inner
            .records
            .get(&key)
            .ok_or(GateError::RecordNotFound {
                kind: key.0,
                id: key.1,
            })?;
        if current.state().name() != request.from_state {
            return Err(GateError::StaleFromState {
                id: request.record_id,
                expected: request.from_state.clone(),
                actual: current.state().name().to_owned(),
            });
        }

        let mut updated = current.clone();
        let applied_at = recorder.clock().now().unwrap_or_else(Utc::now);
        move_record(&mut updated, to, request, &proof, applied_at)?;
        updated
            .check_invariants()
            .map_err(GateError::RecordInvariant)?;

        let mut draft =
            EntryDraft::for_actor(EntryType::TransitionApplied, request.action(), &request.actor);
        draft.correlation_id = Some(request.correlation_id);
        draft.request_id = Some(request.request_id);
        draft.record_kind = Some(request.record_kind);
        draft.record_id = Some(request.record_id);
        draft.prior_state = Some(request.from_state.clone());
        draft.resulting_state = ResultingState::State(request.to_state.clone());
        draft.machine_authored = updated.machine_authored();
        draft.evidence = serde_json::json!({ "decision": proof });
        let applied_ref = recorder.record(draft)?;

        inner.consumed_proofs.insert(proof.clone());
        inner.records.insert(key, updated.clone());
        tracing::info!(
            decision = %proof,
            applied = %applied_ref,
            action = %request.action(),
            "transition applied"
        );
        Ok(updated)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl RecordStateSource for RecordRegistry {
    fn current(&self, kind: RecordKind, id: RecordId) -> Option<Record> {
        self.lock().records.get(&(kind, id)).cloned()
    }
}

/// Checks that `decision` is an audited allow of exactly `request`.
fn verify_proof(
    decision: &Decision,
    request: &TransitionRequest,
    recorder: &AuditRecorder,
) -> GateResult<AuditRef> {
    let reject = |reason: &str| Err(GateError::ProofRejected(reason.to_owned()));

    if !decision.is_allowed() {
        return reject("decision did not allow the transition");
    }
    let Some(proof) = decision.audit_ref.clone() else {
        return reject("decision carries no audit reference");
    };
    if decision.correlation_id != request.correlation_id
        || decision.request_id != request.request_id
    {
        return reject("decision belongs to a different request");
    }

    let Some(sealed) = recorder.sink().entry(&proof)? else {
        return reject("audit reference does not resolve");
    };
    let entry = &sealed.entry;
    let matches = entry.entry_type == EntryType::TransitionDecision
        && entry.correlation_id == Some(request.correlation_id)
        && entry.request_id == Some(request.request_id)
        && entry.record_kind == Some(request.record_kind)
        && entry.record_id == Some(request.record_id)
        && entry.prior_state.as_deref() == Some(request.from_state.as_str())
        && entry.resulting_state == ResultingState::State(request.to_state.clone());
    if !matches {
        return reject("audit entry does not record an allow of this transition");
    }
    Ok(proof)
}

fn move_record(
    record: &mut Record,
    to: RecordState,
    request: &TransitionRequest,
    proof: &AuditRef,
    applied_at: chrono::DateTime<Utc>,
) -> GateResult<()> {
    match (record, to) {
        (Record::Scheduling(r), RecordState::Scheduling(to)) => {
            let entry = HistoryEntry {
                from: r.state,
                to,
                correlation_id: request.correlation_id,
                actor_id: request.actor.id.clone(),
                audit_ref: proof.clone(),
                applied_at,
            };
            advance(
                &mut r.state,
                &mut r.confirmer,
                &mut r.modified_at,
                &mut r.history,
                entry,
            );
        }
        (Record::Order(r), RecordState::Order(to)) => {
            let entry = HistoryEntry {
                from: r.state,
                to,
                correlation_id: request.correlation_id,
                actor_id: request.actor.id.clone(),
                audit_ref: proof.clone(),
                applied_at,
            };
            advance(
                &mut r.state,
                &mut r.confirmer,
                &mut r.modified_at,
                &mut r.history,
                entry,
            );
        }
        (record, to) => {
            return Err(GateError::ProofRejected(format!(
                "{} record cannot move to {} state {}",
                record.kind(),
                to.kind(),
                to
            )))
        }
    }
    Ok(())
}
