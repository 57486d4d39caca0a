//! Domain control gate.
//!
//! Coarse per-domain reachability: is the domain enabled in configuration, is its kill-switch
//! affirmatively off, and is it reporting `Operational`. All three checks run so that a
//! denial lists every reason. A denial here ends the request.

use crate::config::GovernanceConfig;
use crate::control::{ControlPlane, KillSwitchScope, OperationalState};
use crate::decision::{DenialCode, DenialReason, Outcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use vpr_types::RecordKind;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DomainGateResult {
    pub outcome: Outcome,
    pub reasons: Vec<DenialReason>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

/// Evaluates the domain control gate for `kind`.
pub fn evaluate_domain(
    kind: RecordKind,
    config: &GovernanceConfig,
    control: &dyn ControlPlane,
    now: Option<DateTime<Utc>>,
) -> DomainGateResult {
    let mut reasons = Vec::new();

    if !config.domain_enabled(kind) {
        reasons.push(DenialReason::new(
            DenialCode::DomainNotEnabled,
            format!("{kind} domain is not enabled"),
        ));
    }

    let scope = KillSwitchScope::Domain(kind);
    let switch = control.kill_switch(&scope);
    if !switch.is_affirmatively_inactive() {
        reasons.push(DenialReason::new(
            DenialCode::KillSwitchActiveOrUnknown,
            format!("{scope} kill-switch is {switch:?}"),
        ));
    }

    match control.operational_state(kind) {
        Some(OperationalState::Operational) => {}
        Some(other) => reasons.push(DenialReason::new(
            DenialCode::DomainNotOperational,
            format!("{kind} domain is {other:?}"),
        )),
        None => reasons.push(DenialReason::new(
            DenialCode::DomainNotOperational,
            format!("no operational state reading for {kind} domain"),
        )),
    }

    let outcome = if reasons.is_empty() {
        Outcome::Allowed
    } else {
        Outcome::Denied
    };
    DomainGateResult {
        outcome,
        reasons,
        evaluated_at: now,
    }
}
