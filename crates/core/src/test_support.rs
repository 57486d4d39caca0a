//! Fixtures shared by the unit tests.

use crate::actor::{Actor, Principal};
use crate::audit::{AuditRecorder, InMemoryAuditSink};
use crate::authority::{required_authority, RequiredAuthority};
use crate::clock::{Clock, ManualClock};
use crate::config::{DataClassification, GovernanceConfig};
use crate::control::{
    ControlSnapshot, InMemoryControlPlane, KillSwitchScope, KillSwitchState, OperationalState,
};
use crate::gate::{Enabled, ExecutionGate, Unverified};
use crate::records::{
    OrderContent, OrderRecord, Record, ScheduleParameters, SchedulingRecord, Urgency,
};
use crate::registry::RecordRegistry;
use crate::request::{BoundaryContext, HumanConfirmation, TransitionRequest};
use crate::safeguards::SafeguardContext;
use crate::state::{OrderState, RecordState, SchedulingState};
use crate::transitions::check_transition;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use vpr_types::{NonEmptyText, RecordKind, Role};
use vpr_uuid::{CorrelationId, RecordId, RequestId, SessionId};

pub(crate) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
}

fn text(value: &str) -> NonEmptyText {
    NonEmptyText::new(value).unwrap()
}

/// An actor whose session runs for an hour from [`now`] with consent for both record kinds.
pub(crate) fn actor(id: &str, principal: Principal) -> Actor {
    Actor {
        id: text(id),
        principal,
        session_id: SessionId::generate(),
        session_expires_at: now() + Duration::hours(1),
        consent_scope: RecordKind::ALL.into_iter().collect(),
    }
}

pub(crate) fn scheduling_record(state: SchedulingState) -> SchedulingRecord {
    let created_at = now() - Duration::days(1);
    let start = now() + Duration::days(1);
    SchedulingRecord {
        id: RecordId::generate(),
        tenant_id: text("clinic-a"),
        state,
        created_at,
        modified_at: created_at,
        submitter: text("patient-1"),
        confirmer: None,
        correlation_id: CorrelationId::generate(),
        parameters: ScheduleParameters {
            start,
            end: start + Duration::minutes(30),
            participant_ids: vec![text("patient-1"), text("dr-smith")],
            resource_ids: Vec::new(),
            purpose: "Follow-up consultation".into(),
        },
        history: Vec::new(),
    }
}

pub(crate) fn order_record(state: OrderState) -> OrderRecord {
    let created_at = now() - Duration::hours(2);
    let mut parameters = serde_json::Map::new();
    parameters.insert("specimen".into(), serde_json::json!("venous blood"));
    OrderRecord {
        id: RecordId::generate(),
        tenant_id: text("clinic-a"),
        state,
        created_at,
        modified_at: created_at,
        creator: text("dr-smith"),
        confirmer: None,
        correlation_id: CorrelationId::generate(),
        content: OrderContent {
            order_type: text("lab.full_blood_count"),
            subject_id: text("patient-1"),
            parameters,
            urgency: Urgency::Routine,
            rationale: Some("Monitoring after medication change".into()),
        },
        machine_authored: false,
        history: Vec::new(),
    }
}

/// Configuration with the subsystem and both domains on. Has no `policy` key so tests can
/// append one.
pub(crate) fn enabled_config_yaml() -> String {
    r#"subsystem_enabled: true
domains:
  scheduling:
    enabled: true
  order:
    enabled: true
environment: test
allowed_tenants: [clinic-a]
max_data_classification: confidential
confirmation_max_age_secs: 300"#
        .to_owned()
}

pub(crate) fn enabled_config() -> GovernanceConfig {
    GovernanceConfig::from_yaml_str(&enabled_config_yaml()).unwrap()
}

/// [`enabled_config`] with only `kinds` enabled.
pub(crate) fn config_with_domains(kinds: &[RecordKind]) -> GovernanceConfig {
    let mut yaml = String::from(
        "subsystem_enabled: true\nenvironment: test\nallowed_tenants: [clinic-a]\nmax_data_classification: confidential\ndomains:\n",
    );
    for kind in kinds {
        yaml.push_str(&format!("  {kind}:\n    enabled: true\n"));
    }
    GovernanceConfig::from_yaml_str(&yaml).unwrap()
}

/// Every switch affirmatively off and both domains operational.
pub(crate) fn open_control_plane() -> InMemoryControlPlane {
    let mut snapshot = ControlSnapshot {
        global: Some(KillSwitchState::Inactive),
        ..ControlSnapshot::default()
    };
    snapshot.set_kill_switch(
        KillSwitchScope::Environment("test".into()),
        KillSwitchState::Inactive,
    );
    snapshot.set_kill_switch(
        KillSwitchScope::Tenant("clinic-a".into()),
        KillSwitchState::Inactive,
    );
    for kind in RecordKind::ALL {
        snapshot.set_kill_switch(KillSwitchScope::Domain(kind), KillSwitchState::Inactive);
        snapshot
            .operational
            .insert(kind, OperationalState::Operational);
    }
    InMemoryControlPlane::new(snapshot)
}

/// A fully wired gate with one scheduling record in `Intent` and one order in `Draft`.
pub(crate) struct Harness {
    pub config: GovernanceConfig,
    pub control: Arc<InMemoryControlPlane>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<InMemoryAuditSink>,
    pub recorder: Arc<AuditRecorder>,
    pub registry: Arc<RecordRegistry>,
    /// The records as registered. Tests may edit these to shape safeguard input; the registry
    /// keeps its own copies.
    pub schedule: Record,
    pub order: Record,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(enabled_config(), order_record(OrderState::Draft))
    }

    pub fn with_config(config: GovernanceConfig) -> Self {
        Self::build(config, order_record(OrderState::Draft))
    }

    pub fn new_with_machine_order() -> Self {
        let mut order = order_record(OrderState::Draft);
        order.machine_authored = true;
        order.creator = text("ai-drafter");
        Self::build(enabled_config(), order)
    }

    fn build(config: GovernanceConfig, order: OrderRecord) -> Self {
        let clock = Arc::new(ManualClock::at(now()));
        let sink = Arc::new(InMemoryAuditSink::new());
        let recorder = Arc::new(AuditRecorder::new(sink.clone(), clock.clone()));
        let registry = Arc::new(RecordRegistry::new());
        let schedule = Record::Scheduling(scheduling_record(SchedulingState::Intent));
        let order = Record::Order(order);
        registry.register(schedule.clone()).unwrap();
        registry.register(order.clone()).unwrap();
        Self {
            config,
            control: Arc::new(open_control_plane()),
            clock,
            sink,
            recorder,
            registry,
            schedule,
            order,
        }
    }

    pub fn unverified_gate(&self) -> ExecutionGate<Unverified> {
        ExecutionGate::new(
            Arc::new(self.config.clone()),
            self.control.clone(),
            self.registry.clone(),
            self.recorder.clone(),
        )
    }

    pub fn gate(&self) -> ExecutionGate<Enabled> {
        self.unverified_gate()
            .assert_subsystem_enabled()
            .expect("harness subsystem should be enabled")
    }

    /// Evaluates and applies `request`, which must be allowed.
    pub fn drive(&self, request: &TransitionRequest) -> Record {
        let decision = self.gate().evaluate(request);
        assert!(decision.is_allowed(), "{:?}", decision.reasons);
        self.registry
            .apply(&decision, request, &self.recorder)
            .expect("allowed decision should apply")
    }

    /// A well-formed request on `record` by `actor`, confirmed by that same actor just now.
    pub fn request(&self, record: &Record, from: &str, to: &str, actor: Actor) -> TransitionRequest {
        let confirmation = HumanConfirmation {
            confirmer_id: actor.id.clone(),
            principal: actor.principal,
            verified: true,
            record_id: record.id(),
            from_state: from.to_owned(),
            to_state: to.to_owned(),
            confirmed_at: self.clock.now().unwrap_or_else(now),
        };
        let boundary = BoundaryContext {
            environment: "test".into(),
            tenant_id: "clinic-a".into(),
            data_classification: DataClassification::Confidential,
            session_id: actor.session_id,
        };
        TransitionRequest {
            record_kind: record.kind(),
            record_id: record.id(),
            from_state: from.to_owned(),
            to_state: to.to_owned(),
            actor,
            rationale: "Agreed with the patient at the front desk".into(),
            correlation_id: CorrelationId::generate(),
            request_id: RequestId::generate(),
            confirmation: Some(confirmation),
            boundary,
        }
    }

    pub fn propose_schedule(&self) -> TransitionRequest {
        let patient = actor("patient-1", Principal::Human { role: Role::Patient });
        self.request(&self.schedule, "Intent", "ProposalPending", patient)
    }

    pub fn submit_order(&self) -> TransitionRequest {
        let provider = actor("dr-smith", Principal::Human { role: Role::Provider });
        self.request(&self.order, "Draft", "PendingConfirmation", provider)
    }

    pub fn confirm_order_directly(&self) -> TransitionRequest {
        let provider = actor("dr-smith", Principal::Human { role: Role::Provider });
        self.request(&self.order, "Draft", "Confirmed", provider)
    }

    /// Completion by the trusted clock process. Carries no human confirmation.
    pub fn complete_schedule_request(&self) -> TransitionRequest {
        let clock = actor("vpr-clock", Principal::Clock);
        let mut request = self.request(&self.schedule, "Confirmed", "Completed", clock);
        request.confirmation = None;
        request
    }

    /// Safeguard input for `request` against the harness's own copies of the records.
    pub fn context<'a>(&'a self, request: &'a TransitionRequest) -> SafeguardContext<'a> {
        let record = [&self.schedule, &self.order]
            .into_iter()
            .find(|r| r.kind() == request.record_kind && r.id() == request.record_id);
        let from = RecordState::parse(request.record_kind, &request.from_state).ok();
        let to = RecordState::parse(request.record_kind, &request.to_state).ok();
        let required = match (from, to) {
            (Some(from), Some(to)) if check_transition(from, to).is_ok() => {
                required_authority(from, to)
            }
            _ => RequiredAuthority::NotApplicable,
        };
        SafeguardContext {
            request,
            record,
            from,
            to,
            required,
            config: &self.config,
            control: self.control.as_ref(),
            sink: self.sink.as_ref(),
            now: self.clock.now(),
        }
    }
}
