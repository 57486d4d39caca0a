//! # VPR Gate Core
//!
//! Governed execution control for clinical scheduling and order records.
//!
//! This crate decides whether a proposed lifecycle transition on a record may proceed, and
//! records evidence of every decision:
//! - Finite state sets and explicit transition tables per record kind
//! - Role-based authority resolved from the transition tables
//! - Domain control, the five-category safeguard chain and a fail-closed subsystem block
//! - Append-only, hash-chained audit evidence
//!
//! Nothing here executes a clinical action. A record reaching `Confirmed` means "approved to
//! hand off", never "performed".
//!
//! **No transport concerns**: HTTP and the command line live in the runner and `vpr-gate`.
//!
//! ```text
//! ExecutionGate<Unverified> --assert_subsystem_enabled--> ExecutionGate<Enabled>
//!                                                                |
//!                                                            evaluate
//!                                                                v
//!                 RecordRegistry::apply(decision, request, recorder) <-- Decision
//! ```

pub mod actor;
pub mod audit;
pub mod authority;
pub mod block;
pub mod clock;
pub mod config;
pub mod constants;
pub mod control;
pub mod decision;
pub mod domain;
mod error;
pub mod gate;
pub mod records;
pub mod registry;
pub mod request;
pub mod safeguards;
pub mod state;
pub mod transitions;

#[cfg(test)]
pub(crate) mod test_support;

pub use actor::{Actor, Principal};
pub use audit::{AuditRecorder, AuditRef, AuditSink, InMemoryAuditSink, JsonlAuditSink};
pub use block::{BlockCondition, BlockReason};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigChange, DataClassification, GovernanceConfig, PolicyConfig};
pub use control::{
    ControlPlane, ControlSnapshot, FileControlPlane, InMemoryControlPlane, KillSwitchScope,
    KillSwitchState, OperationalState,
};
pub use decision::{Decision, DenialCode, DenialReason, Outcome};
pub use error::{AuditError, AuditResult, GateError, GateResult};
pub use gate::{Enabled, ExecutionGate, Unverified};
pub use records::{OrderRecord, Record, SchedulingRecord};
pub use registry::{RecordRegistry, RecordStateSource};
pub use request::{BoundaryContext, HumanConfirmation, TransitionRequest};
pub use state::{OrderState, RecordState, SchedulingState};

pub use vpr_types::{NonEmptyText, RecordKind, Role};
pub use vpr_uuid::{CorrelationId, RecordId, RequestId, SessionId};
