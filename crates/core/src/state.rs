//! State model for scheduling and order records.
//!
//! This module is the single source of truth for which states exist, which are terminal, and
//! which count as "proposal" or "confirmed" states. Every classification is an exhaustive
//! `match`, so adding a state without classifying it is a compile error rather than a runtime
//! gap. There is deliberately no `Executed` state for either record kind.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use vpr_types::RecordKind;

/// Classification shared by the per-kind state enums.
pub trait LifecycleState:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// The record kind these states belong to.
    const KIND: RecordKind;

    /// Every state of this kind, in declaration order.
    const ALL: &'static [Self];

    /// The canonical (PascalCase) name of the state.
    fn name(self) -> &'static str;

    /// A terminal state has no outgoing transition.
    fn is_terminal(self) -> bool;

    fn is_proposal_state(self) -> bool;

    fn is_confirmed_state(self) -> bool;

    /// Looks up a state by its canonical name. Names are case-sensitive.
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|state| state.name() == name)
    }

    /// Every terminal state of this kind.
    fn terminal_states() -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|state| state.is_terminal())
            .collect()
    }
}

/// States of a scheduling record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulingState {
    Intent,
    ProposalPending,
    ProposalModified,
    ProposalRejected,
    ProposalWithdrawn,
    Confirmed,
    ConfirmedModified,
    Cancelled,
    Completed,
}

impl LifecycleState for SchedulingState {
    const KIND: RecordKind = RecordKind::Scheduling;

    const ALL: &'static [Self] = &[
        Self::Intent,
        Self::ProposalPending,
        Self::ProposalModified,
        Self::ProposalRejected,
        Self::ProposalWithdrawn,
        Self::Confirmed,
        Self::ConfirmedModified,
        Self::Cancelled,
        Self::Completed,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Intent => "Intent",
            Self::ProposalPending => "ProposalPending",
            Self::ProposalModified => "ProposalModified",
            Self::ProposalRejected => "ProposalRejected",
            Self::ProposalWithdrawn => "ProposalWithdrawn",
            Self::Confirmed => "Confirmed",
            Self::ConfirmedModified => "ConfirmedModified",
            Self::Cancelled => "Cancelled",
            Self::Completed => "Completed",
        }
    }

    fn is_terminal(self) -> bool {
        match self {
            Self::ProposalRejected | Self::ProposalWithdrawn | Self::Cancelled | Self::Completed => {
                true
            }
            Self::Intent
            | Self::ProposalPending
            | Self::ProposalModified
            | Self::Confirmed
            | Self::ConfirmedModified => false,
        }
    }

    fn is_proposal_state(self) -> bool {
        match self {
            Self::ProposalPending | Self::ProposalModified => true,
            Self::Intent
            | Self::ProposalRejected
            | Self::ProposalWithdrawn
            | Self::Confirmed
            | Self::ConfirmedModified
            | Self::Cancelled
            | Self::Completed => false,
        }
    }

    fn is_confirmed_state(self) -> bool {
        match self {
            Self::Confirmed | Self::ConfirmedModified => true,
            Self::Intent
            | Self::ProposalPending
            | Self::ProposalModified
            | Self::ProposalRejected
            | Self::ProposalWithdrawn
            | Self::Cancelled
            | Self::Completed => false,
        }
    }
}

/// States of a clinical order record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    Draft,
    PendingConfirmation,
    Confirmed,
    Modified,
    Revoked,
    Superseded,
}

impl LifecycleState for OrderState {
    const KIND: RecordKind = RecordKind::Order;

    const ALL: &'static [Self] = &[
        Self::Draft,
        Self::PendingConfirmation,
        Self::Confirmed,
        Self::Modified,
        Self::Revoked,
        Self::Superseded,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::PendingConfirmation => "PendingConfirmation",
            Self::Confirmed => "Confirmed",
            Self::Modified => "Modified",
            Self::Revoked => "Revoked",
            Self::Superseded => "Superseded",
        }
    }

    fn is_terminal(self) -> bool {
        match self {
            Self::Revoked | Self::Superseded => true,
            Self::Draft | Self::PendingConfirmation | Self::Confirmed | Self::Modified => false,
        }
    }

    fn is_proposal_state(self) -> bool {
        match self {
            Self::Draft | Self::PendingConfirmation => true,
            Self::Confirmed | Self::Modified | Self::Revoked | Self::Superseded => false,
        }
    }

    fn is_confirmed_state(self) -> bool {
        match self {
            Self::Confirmed | Self::Modified => true,
            Self::Draft | Self::PendingConfirmation | Self::Revoked | Self::Superseded => false,
        }
    }
}

impl fmt::Display for SchedulingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A state of either record kind.
///
/// Serialises as the bare state name; the record kind always travels alongside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum RecordState {
    Scheduling(SchedulingState),
    Order(OrderState),
}

/// A state name that does not exist for the given record kind.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} state '{name}'")]
pub struct UnknownState {
    pub kind: RecordKind,
    pub name: String,
}

impl RecordState {
    /// Resolves a state name within a record kind.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownState`] for names that are not part of the kind's state set, which
    /// includes anything resembling an execution state.
    pub fn parse(kind: RecordKind, name: &str) -> Result<Self, UnknownState> {
        let resolved = match kind {
            RecordKind::Scheduling => SchedulingState::from_name(name).map(Self::Scheduling),
            RecordKind::Order => OrderState::from_name(name).map(Self::Order),
        };
        resolved.ok_or_else(|| UnknownState {
            kind,
            name: name.to_owned(),
        })
    }

    pub fn kind(self) -> RecordKind {
        match self {
            Self::Scheduling(_) => RecordKind::Scheduling,
            Self::Order(_) => RecordKind::Order,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Scheduling(s) => s.name(),
            Self::Order(s) => s.name(),
        }
    }

    pub fn is_terminal(self) -> bool {
        match self {
            Self::Scheduling(s) => s.is_terminal(),
            Self::Order(s) => s.is_terminal(),
        }
    }

    pub fn is_proposal_state(self) -> bool {
        match self {
            Self::Scheduling(s) => s.is_proposal_state(),
            Self::Order(s) => s.is_proposal_state(),
        }
    }

    pub fn is_confirmed_state(self) -> bool {
        match self {
            Self::Scheduling(s) => s.is_confirmed_state(),
            Self::Order(s) => s.is_confirmed_state(),
        }
    }

    /// All states of a record kind.
    pub fn all(kind: RecordKind) -> Vec<RecordState> {
        match kind {
            RecordKind::Scheduling => SchedulingState::ALL
                .iter()
                .copied()
                .map(Self::Scheduling)
                .collect(),
            RecordKind::Order => OrderState::ALL.iter().copied().map(Self::Order).collect(),
        }
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<SchedulingState> for RecordState {
    fn from(value: SchedulingState) -> Self {
        Self::Scheduling(value)
    }
}

impl From<OrderState> for RecordState {
    fn from(value: OrderState) -> Self {
        Self::Order(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduling_terminal_set() {
        let terminal = SchedulingState::terminal_states();
        assert_eq!(
            terminal,
            vec![
                SchedulingState::ProposalRejected,
                SchedulingState::ProposalWithdrawn,
                SchedulingState::Cancelled,
                SchedulingState::Completed,
            ]
        );
    }

    #[test]
    fn order_terminal_set() {
        assert_eq!(
            OrderState::terminal_states(),
            vec![OrderState::Revoked, OrderState::Superseded]
        );
    }

    #[test]
    fn terminal_states_are_neither_proposal_nor_confirmed() {
        for state in RecordState::all(RecordKind::Scheduling)
            .into_iter()
            .chain(RecordState::all(RecordKind::Order))
        {
            if state.is_terminal() {
                assert!(!state.is_proposal_state(), "{state} is terminal and proposal");
                assert!(!state.is_confirmed_state(), "{state} is terminal and confirmed");
            }
            assert!(!(state.is_proposal_state() && state.is_confirmed_state()));
        }
    }

    #[test]
    fn names_round_trip_through_parse() {
        for kind in RecordKind::ALL {
            for state in RecordState::all(kind) {
                assert_eq!(RecordState::parse(kind, state.name()).unwrap(), state);
                assert_eq!(state.kind(), kind);
            }
        }
    }

    #[test]
    fn executed_is_not_a_state() {
        for kind in RecordKind::ALL {
            let err = RecordState::parse(kind, "Executed").unwrap_err();
            assert_eq!(err.name, "Executed");
        }
    }

    #[test]
    fn parse_is_case_sensitive_and_kind_scoped() {
        assert!(RecordState::parse(RecordKind::Scheduling, "confirmed").is_err());
        assert!(RecordState::parse(RecordKind::Order, "Intent").is_err());
        assert!(RecordState::parse(RecordKind::Scheduling, "Draft").is_err());
    }

    #[test]
    fn record_state_serializes_as_bare_name() {
        let state = RecordState::Order(OrderState::PendingConfirmation);
        assert_eq!(
            serde_json::to_string(&state).unwrap(),
            "\"PendingConfirmation\""
        );
    }
}
