//! The safeguard chain.
//!
//! Five categories are checked on every request that passes the domain control gate. Each
//! category is a separate [`Safeguard`] that can be run on its own. The chain runs all of them,
//! with no early exit, and passes only if none failed.

mod audit_capability;
mod boundary;
mod human;
mod kill_switch;
mod policy;

pub use audit_capability::AuditCapabilitySafeguard;
pub use boundary::BoundarySafeguard;
pub use human::HumanConfirmationSafeguard;
pub use kill_switch::KillSwitchSafeguard;
pub use policy::PolicySafeguard;

use crate::audit::AuditSink;
use crate::authority::RequiredAuthority;
use crate::config::GovernanceConfig;
use crate::control::ControlPlane;
use crate::records::Record;
use crate::request::TransitionRequest;
use crate::state::RecordState;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeguardCategory {
    HumanConfirmation,
    Policy,
    Boundary,
    KillSwitch,
    AuditCapability,
}

impl SafeguardCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            SafeguardCategory::HumanConfirmation => "human_confirmation",
            SafeguardCategory::Policy => "policy",
            SafeguardCategory::Boundary => "boundary",
            SafeguardCategory::KillSwitch => "kill_switch",
            SafeguardCategory::AuditCapability => "audit_capability",
        }
    }
}

impl std::fmt::Display for SafeguardCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a safeguard may look at. Readings are taken by the gate for this request only.
pub struct SafeguardContext<'a> {
    pub request: &'a TransitionRequest,
    pub record: Option<&'a Record>,
    /// `None` when the request names a state that does not exist.
    pub from: Option<RecordState>,
    pub to: Option<RecordState>,
    pub required: RequiredAuthority,
    pub config: &'a GovernanceConfig,
    pub control: &'a dyn ControlPlane,
    pub sink: &'a dyn AuditSink,
    /// Trusted time, or `None` when the clock has no reading.
    pub now: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CategoryOutcome {
    Passed,
    NotApplicable(String),
    Failed(Vec<String>),
}

impl CategoryOutcome {
    pub(crate) fn from_failures(failures: Vec<String>) -> Self {
        if failures.is_empty() {
            CategoryOutcome::Passed
        } else {
            CategoryOutcome::Failed(failures)
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CategoryOutcome::Failed(_))
    }
}

pub trait Safeguard {
    fn category(&self) -> SafeguardCategory;

    fn check(&self, ctx: &SafeguardContext<'_>) -> CategoryOutcome;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryReport {
    pub category: SafeguardCategory,
    pub outcome: CategoryOutcome,
}

/// Result of running the whole chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChainResult {
    pub reports: Vec<CategoryReport>,
}

impl ChainResult {
    pub fn passed(&self) -> bool {
        !self.reports.iter().any(|r| r.outcome.is_failed())
    }

    /// Every failing sub-reason, tagged with its category, in chain order.
    pub fn failures(&self) -> impl Iterator<Item = (SafeguardCategory, &str)> + '_ {
        self.reports.iter().flat_map(|report| {
            let reasons: &[String] = match &report.outcome {
                CategoryOutcome::Failed(reasons) => reasons,
                CategoryOutcome::Passed | CategoryOutcome::NotApplicable(_) => &[],
            };
            reasons.iter().map(move |r| (report.category, r.as_str()))
        })
    }

    pub fn report(&self, category: SafeguardCategory) -> Option<&CategoryReport> {
        self.reports.iter().find(|r| r.category == category)
    }
}

const CHAIN: [&dyn Safeguard; 5] = [
    &HumanConfirmationSafeguard,
    &PolicySafeguard,
    &BoundarySafeguard,
    &KillSwitchSafeguard,
    &AuditCapabilitySafeguard,
];

/// Runs all five categories.
pub fn evaluate_chain(ctx: &SafeguardContext<'_>) -> ChainResult {
    let reports = CHAIN
        .iter()
        .map(|safeguard| {
            let outcome = safeguard.check(ctx);
            if let CategoryOutcome::Failed(reasons) = &outcome {
                tracing::debug!(category = %safeguard.category(), ?reasons, "safeguard failed");
            }
            CategoryReport {
                category: safeguard.category(),
                outcome,
            }
        })
        .collect();
    ChainResult { reports }
}
