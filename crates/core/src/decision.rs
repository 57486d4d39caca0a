//! Gate decisions and denial reasons.
//!
//! A denial is an ordinary value. Every contributing reason is kept, in the order the stages
//! produced them, so a denial can be diagnosed without re-running the request.

use crate::audit::{AuditRef, TimestampSource};
use crate::safeguards::SafeguardCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vpr_uuid::{CorrelationId, RequestId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Allowed,
    Denied,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialCode {
    DomainNotEnabled,
    DomainNotOperational,
    KillSwitchActiveOrUnknown,
    InvalidTransition,
    TerminalStateViolation,
    InsufficientAuthority,
    SafeguardFailure,
    StaleFromState,
    AuditUnavailable,
}

impl DenialCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            DenialCode::DomainNotEnabled => "DOMAIN_NOT_ENABLED",
            DenialCode::DomainNotOperational => "DOMAIN_NOT_OPERATIONAL",
            DenialCode::KillSwitchActiveOrUnknown => "KILL_SWITCH_ACTIVE_OR_UNKNOWN",
            DenialCode::InvalidTransition => "INVALID_TRANSITION",
            DenialCode::TerminalStateViolation => "TERMINAL_STATE_VIOLATION",
            DenialCode::InsufficientAuthority => "INSUFFICIENT_AUTHORITY",
            DenialCode::SafeguardFailure => "SAFEGUARD_FAILURE",
            DenialCode::StaleFromState => "STALE_FROM_STATE",
            DenialCode::AuditUnavailable => "AUDIT_UNAVAILABLE",
        }
    }

    /// Code for a failed safeguard category. Kill-switch and audit failures keep their own
    /// codes so that they are recognisable without reading the detail.
    pub const fn for_safeguard(category: SafeguardCategory) -> Self {
        match category {
            SafeguardCategory::KillSwitch => DenialCode::KillSwitchActiveOrUnknown,
            SafeguardCategory::AuditCapability => DenialCode::AuditUnavailable,
            SafeguardCategory::HumanConfirmation
            | SafeguardCategory::Policy
            | SafeguardCategory::Boundary => DenialCode::SafeguardFailure,
        }
    }
}

impl std::fmt::Display for DenialCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenialReason {
    pub code: DenialCode,
    pub detail: String,
}

impl DenialReason {
    pub fn new(code: DenialCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.detail)
    }
}

/// The gate's answer to a [`crate::TransitionRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub outcome: Outcome,
    pub reasons: Vec<DenialReason>,
    /// The audit entry written for this decision. `None` only when that write failed, in which
    /// case the decision is always denied.
    pub audit_ref: Option<AuditRef>,
    pub correlation_id: CorrelationId,
    pub request_id: RequestId,
    pub evaluated_at: DateTime<Utc>,
    /// `Fallback` when the trusted clock had no reading and `evaluated_at` is host time.
    pub timestamp_source: TimestampSource,
    /// Carried for orders so automated authorship is always visible downstream.
    pub machine_authored: Option<bool>,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        self.outcome == Outcome::Allowed
    }

    pub fn has_code(&self, code: DenialCode) -> bool {
        self.reasons.iter().any(|r| r.code == code)
    }

    pub fn codes(&self) -> Vec<DenialCode> {
        self.reasons.iter().map(|r| r.code).collect()
    }
}
