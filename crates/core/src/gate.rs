//! The execution gate.
//!
//! [`ExecutionGate::evaluate`] is the single entry point for deciding a proposed transition.
//! It only exists on `ExecutionGate<Enabled>`, which can only be obtained from
//! [`ExecutionGate::assert_subsystem_enabled`], so per-request logic is unreachable while the
//! subsystem is blocked.
//!
//! Evaluation order:
//! 1. Domain control gate. A denial here is final and no other stage runs.
//! 2. Current record state, compared against the request's from-state.
//! 3. Transition table.
//! 4. Authority, skipped when the transition is not valid.
//! 5. Safeguard chain.
//!
//! Stages 2 to 5 all run once the domain gate passes, so a denial carries every contributing
//! reason. Exactly one audit entry is written per decision.

use crate::audit::{AuditRecorder, EntryDraft, EntryType, ResultingState, TimestampSource};
use crate::authority::{authorise, required_authority, RequiredAuthority};
use crate::block::BlockCondition;
use crate::config::GovernanceConfig;
use crate::control::ControlPlane;
use crate::decision::{Decision, DenialCode, DenialReason, Outcome};
use crate::domain::evaluate_domain;
use crate::records::Record;
use crate::registry::RecordStateSource;
use crate::request::TransitionRequest;
use crate::safeguards::{evaluate_chain, SafeguardContext};
use crate::state::RecordState;
use crate::transitions::{check_transition, TransitionViolation};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// Marker type: the subsystem has not been asserted enabled.
///
/// Only [`ExecutionGate::assert_subsystem_enabled`] can be called in this state.
#[derive(Clone, Copy, Debug)]
pub struct Unverified;

/// Marker type: the subsystem assertion passed.
#[derive(Clone, Copy, Debug)]
pub struct Enabled {
    asserted_at: DateTime<Utc>,
}

impl Enabled {
    pub(crate) fn new(asserted_at: DateTime<Utc>) -> Self {
        Self { asserted_at }
    }
}

/// Governs transitions on scheduling and order records.
///
/// Generic parameter `S` is either [`Unverified`] or [`Enabled`].
#[derive(Clone)]
pub struct ExecutionGate<S> {
    pub(crate) config: Arc<GovernanceConfig>,
    pub(crate) control: Arc<dyn ControlPlane>,
    pub(crate) records: Arc<dyn RecordStateSource>,
    pub(crate) recorder: Arc<AuditRecorder>,
    /// The block most recently written to the audit stream, shared by clones of this gate.
    pub(crate) last_block: Arc<Mutex<Option<BlockCondition>>>,
    pub(crate) state: S,
}

impl<S: std::fmt::Debug> std::fmt::Debug for ExecutionGate<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGate")
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExecutionGate<Unverified> {
    pub fn new(
        config: Arc<GovernanceConfig>,
        control: Arc<dyn ControlPlane>,
        records: Arc<dyn RecordStateSource>,
        recorder: Arc<AuditRecorder>,
    ) -> Self {
        Self {
            config,
            control,
            records,
            recorder,
            last_block: Arc::new(Mutex::new(None)),
            state: Unverified,
        }
    }
}

impl<S> ExecutionGate<S> {
    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn recorder(&self) -> &Arc<AuditRecorder> {
        &self.recorder
    }

    pub fn control(&self) -> &Arc<dyn ControlPlane> {
        &self.control
    }
}

impl ExecutionGate<Enabled> {
    /// When the subsystem assertion that produced this gate passed.
    pub fn asserted_at(&self) -> DateTime<Utc> {
        self.state.asserted_at
    }

    /// Decides `request`. Never mutates a record.
    pub fn evaluate(&self, request: &TransitionRequest) -> Decision {
        let span = tracing::info_span!(
            "evaluate_transition",
            correlation_id = %request.correlation_id,
            request_id = %request.request_id,
            action = %request.action(),
        );
        let _entered = span.enter();

        let now = self.recorder.clock().now();
        let kind = request.record_kind;
        let record = self.records.current(kind, request.record_id);
        let machine_authored = record.as_ref().and_then(Record::machine_authored);

        let domain = evaluate_domain(kind, &self.config, self.control.as_ref(), now);
        let domain_allowed = domain.outcome == Outcome::Allowed;
        let mut reasons = domain.reasons.clone();
        let mut evidence = serde_json::json!({
            "domain_gate": domain,
            "rationale": request.rationale,
            "boundary": request.boundary,
            "confirmation": request.confirmation,
        });

        if domain_allowed {
            let stages = self.evaluate_stages(request, record.as_ref(), now, &mut reasons);
            if let serde_json::Value::Object(map) = &mut evidence {
                map.extend(stages);
            }
        } else {
            tracing::info!("domain control gate denied; safeguards not evaluated");
        }

        let mut outcome = if reasons.is_empty() {
            Outcome::Allowed
        } else {
            Outcome::Denied
        };
        if let serde_json::Value::Object(map) = &mut evidence {
            map.insert("outcome".into(), serde_json::json!(outcome));
            map.insert("reasons".into(), serde_json::json!(reasons));
        }

        let mut draft =
            EntryDraft::for_actor(EntryType::TransitionDecision, request.action(), &request.actor);
        draft.correlation_id = Some(request.correlation_id);
        draft.request_id = Some(request.request_id);
        draft.record_kind = Some(kind);
        draft.record_id = Some(request.record_id);
        draft.prior_state = Some(request.from_state.clone());
        draft.resulting_state = match outcome {
            Outcome::Allowed => ResultingState::State(request.to_state.clone()),
            Outcome::Denied => ResultingState::Denied,
        };
        draft.machine_authored = machine_authored;
        draft.evidence = evidence;

        let audit_ref = match self.recorder.record(draft) {
            Ok(audit_ref) => Some(audit_ref),
            Err(e) => {
                tracing::error!(error = %e, "decision could not be audited; denying");
                outcome = Outcome::Denied;
                reasons.push(DenialReason::new(
                    DenialCode::AuditUnavailable,
                    format!("decision could not be recorded: {e}"),
                ));
                None
            }
        };

        match outcome {
            Outcome::Allowed => tracing::info!(audit_ref = ?audit_ref, "transition allowed"),
            Outcome::Denied => tracing::warn!(
                audit_ref = ?audit_ref,
                codes = ?reasons.iter().map(|r| r.code).collect::<Vec<_>>(),
                "transition denied"
            ),
        }

        let (evaluated_at, timestamp_source) = match now {
            Some(now) => (now, TimestampSource::Trusted),
            None => (Utc::now(), TimestampSource::Fallback),
        };
        Decision {
            outcome,
            reasons,
            audit_ref,
            correlation_id: request.correlation_id,
            request_id: request.request_id,
            evaluated_at,
            timestamp_source,
            machine_authored,
        }
    }

    /// Stages 2 to 5. Returns their evidence.
    fn evaluate_stages(
        &self,
        request: &TransitionRequest,
        record: Option<&Record>,
        now: Option<DateTime<Utc>>,
        reasons: &mut Vec<DenialReason>,
    ) -> serde_json::Map<String, serde_json::Value> {
        let kind = request.record_kind;

        match record {
            None => reasons.push(DenialReason::new(
                DenialCode::StaleFromState,
                format!(
                    "current state of {kind} record {} could not be established",
                    request.record_id
                ),
            )),
            Some(record) if record.state().name() != request.from_state => {
                reasons.push(DenialReason::new(
                    DenialCode::StaleFromState,
                    format!(
                        "request names from-state {} but the record is {}",
                        request.from_state,
                        record.state()
                    ),
                ));
            }
            Some(_) => {}
        }

        let from = RecordState::parse(kind, &request.from_state);
        let to = RecordState::parse(kind, &request.to_state);
        let required = match (&from, &to) {
            (Ok(from), _) if from.is_terminal() => {
                reasons.push(DenialReason::new(
                    DenialCode::TerminalStateViolation,
                    TransitionViolation::TerminalState { from: *from }.to_string(),
                ));
                RequiredAuthority::NotApplicable
            }
            (Ok(from), Ok(to)) => match check_transition(*from, *to) {
                Ok(_) => required_authority(*from, *to),
                Err(violation) => {
                    reasons.push(DenialReason::new(
                        DenialCode::InvalidTransition,
                        violation.to_string(),
                    ));
                    RequiredAuthority::NotApplicable
                }
            },
            (from, to) => {
                for unknown in [from.as_ref().err(), to.as_ref().err()].into_iter().flatten() {
                    reasons.push(DenialReason::new(
                        DenialCode::InvalidTransition,
                        unknown.to_string(),
                    ));
                }
                RequiredAuthority::NotApplicable
            }
        };

        let authority = if required == RequiredAuthority::NotApplicable {
            serde_json::json!({"status": "not_applicable"})
        } else {
            match authorise(&request.actor, required, record) {
                Ok(()) => serde_json::json!({"status": "satisfied", "required": required}),
                Err(violation) => {
                    reasons.push(DenialReason::new(
                        DenialCode::InsufficientAuthority,
                        violation.to_string(),
                    ));
                    serde_json::json!({
                        "status": "insufficient",
                        "required": required,
                        "detail": violation.to_string(),
                    })
                }
            }
        };

        let ctx = SafeguardContext {
            request,
            record,
            from: from.ok(),
            to: to.ok(),
            required,
            config: &self.config,
            control: self.control.as_ref(),
            sink: self.recorder.sink().as_ref(),
            now,
        };
        let chain = evaluate_chain(&ctx);
        for (category, reason) in chain.failures() {
            reasons.push(DenialReason::new(
                DenialCode::for_safeguard(category),
                format!("{category}: {reason}"),
            ));
        }

        let mut stages = serde_json::Map::new();
        stages.insert(
            "record_state".into(),
            serde_json::json!(record.map(|r| r.state().name())),
        );
        stages.insert("authority".into(), authority);
        stages.insert("safeguards".into(), serde_json::json!(chain));
        stages
    }
}
