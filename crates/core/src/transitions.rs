//! Transition tables.
//!
//! Each record kind has an explicit adjacency map `state -> [edge]`, where an edge names the
//! target state and the roles that may take it. A transition not enumerated here is illegal;
//! nothing is allowed by default. Terminal states map to an empty edge list, and the validity
//! check consults [`LifecycleState::is_terminal`] before looking at edges at all.
//!
//! The role lists live on the edges so the authority for a transition cannot drift from the
//! transition itself. [`crate::authority`] interprets them.

use crate::state::{LifecycleState, OrderState, RecordState, SchedulingState};
use vpr_types::Role;

/// Roles acting for or as the participants of a schedule.
const PARTICIPANTS: &[Role] = &[Role::Patient, Role::Provider, Role::Staff];
/// The care team.
const CARE_TEAM: &[Role] = &[Role::Provider, Role::Staff];
/// Only the ordering clinician.
const PRESCRIBER: &[Role] = &[Role::Provider];
/// No human actor: the passive "time has elapsed" observation.
const RECORD_KEEPING: &[Role] = &[];

/// One permitted outgoing transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge<S: 'static> {
    pub to: S,
    pub roles: &'static [Role],
}

const fn edge<S>(to: S, roles: &'static [Role]) -> Edge<S> {
    Edge { to, roles }
}

/// A state set with an explicit adjacency map.
pub trait TransitionTable: LifecycleState {
    /// Outgoing edges of this state. Terminal states return an empty slice.
    fn edges(self) -> &'static [Edge<Self>];
}

mod scheduling_edges {
    use super::*;
    use SchedulingState::*;

    pub(super) const INTENT: &[Edge<SchedulingState>] = &[
        edge(ProposalPending, PARTICIPANTS),
        edge(ProposalWithdrawn, PARTICIPANTS),
    ];
    pub(super) const PROPOSAL_PENDING: &[Edge<SchedulingState>] = &[
        edge(ProposalModified, PARTICIPANTS),
        edge(Confirmed, CARE_TEAM),
        edge(ProposalRejected, CARE_TEAM),
        edge(ProposalWithdrawn, PARTICIPANTS),
    ];
    pub(super) const PROPOSAL_MODIFIED: &[Edge<SchedulingState>] = &[
        edge(ProposalModified, PARTICIPANTS),
        edge(Confirmed, CARE_TEAM),
        edge(ProposalRejected, CARE_TEAM),
        edge(ProposalWithdrawn, PARTICIPANTS),
    ];
    pub(super) const CONFIRMED: &[Edge<SchedulingState>] = &[
        edge(ConfirmedModified, CARE_TEAM),
        edge(Cancelled, PARTICIPANTS),
        edge(Completed, RECORD_KEEPING),
    ];
    pub(super) const CONFIRMED_MODIFIED: &[Edge<SchedulingState>] = &[
        edge(ConfirmedModified, CARE_TEAM),
        edge(Cancelled, PARTICIPANTS),
        edge(Completed, RECORD_KEEPING),
    ];
    pub(super) const NONE: &[Edge<SchedulingState>] = &[];
}

mod order_edges {
    use super::*;
    use OrderState::*;

    pub(super) const DRAFT: &[Edge<OrderState>] = &[
        edge(PendingConfirmation, CARE_TEAM),
        // Direct confirmation is enumerated here and additionally gated by policy.
        edge(Confirmed, PRESCRIBER),
        edge(Revoked, CARE_TEAM),
    ];
    pub(super) const PENDING_CONFIRMATION: &[Edge<OrderState>] = &[
        edge(Confirmed, PRESCRIBER),
        edge(Draft, CARE_TEAM),
        edge(Revoked, CARE_TEAM),
    ];
    pub(super) const CONFIRMED: &[Edge<OrderState>] = &[
        edge(Modified, PRESCRIBER),
        edge(Revoked, PRESCRIBER),
        edge(Superseded, PRESCRIBER),
    ];
    pub(super) const MODIFIED: &[Edge<OrderState>] = &[
        edge(Modified, PRESCRIBER),
        edge(Revoked, PRESCRIBER),
        edge(Superseded, PRESCRIBER),
    ];
    pub(super) const NONE: &[Edge<OrderState>] = &[];
}

impl TransitionTable for SchedulingState {
    fn edges(self) -> &'static [Edge<Self>] {
        use SchedulingState::*;
        match self {
            Intent => scheduling_edges::INTENT,
            ProposalPending => scheduling_edges::PROPOSAL_PENDING,
            ProposalModified => scheduling_edges::PROPOSAL_MODIFIED,
            Confirmed => scheduling_edges::CONFIRMED,
            ConfirmedModified => scheduling_edges::CONFIRMED_MODIFIED,
            ProposalRejected | ProposalWithdrawn | Cancelled | Completed => scheduling_edges::NONE,
        }
    }
}

impl TransitionTable for OrderState {
    fn edges(self) -> &'static [Edge<Self>] {
        use OrderState::*;
        match self {
            Draft => order_edges::DRAFT,
            PendingConfirmation => order_edges::PENDING_CONFIRMATION,
            Confirmed => order_edges::CONFIRMED,
            Modified => order_edges::MODIFIED,
            Revoked | Superseded => order_edges::NONE,
        }
    }
}

/// Why a transition is not structurally legal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionViolation {
    /// The from-state is terminal; no target is reachable.
    TerminalState { from: RecordState },
    /// The pair is not enumerated in the table (including cross-kind pairs).
    NotEnumerated { from: RecordState, to: RecordState },
}

impl std::fmt::Display for TransitionViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TerminalState { from } => write!(
                f,
                "{} state {} is terminal and has no outgoing transitions",
                from.kind(),
                from
            ),
            Self::NotEnumerated { from, to } => write!(
                f,
                "{} transition {} -> {} is not enumerated",
                from.kind(),
                from,
                to
            ),
        }
    }
}

/// Looks up the edge for `from -> to` within one state set.
pub fn find_edge<S: TransitionTable>(from: S, to: S) -> Option<&'static Edge<S>> {
    if from.is_terminal() {
        return None;
    }
    from.edges().iter().find(|edge| edge.to == to)
}

/// Structural validity of `from -> to` within one state set.
pub fn is_valid_transition<S: TransitionTable>(from: S, to: S) -> bool {
    find_edge(from, to).is_some()
}

/// Checks a transition across either record kind, returning the permitted roles.
///
/// The terminal check runs first and short-circuits; a pair whose states belong to
/// different record kinds is never enumerated.
///
/// # Errors
///
/// Returns a [`TransitionViolation`] describing why the transition is illegal.
pub fn check_transition(
    from: RecordState,
    to: RecordState,
) -> Result<&'static [Role], TransitionViolation> {
    if from.is_terminal() {
        return Err(TransitionViolation::TerminalState { from });
    }
    let roles = match (from, to) {
        (RecordState::Scheduling(f), RecordState::Scheduling(t)) => find_edge(f, t).map(|e| e.roles),
        (RecordState::Order(f), RecordState::Order(t)) => find_edge(f, t).map(|e| e.roles),
        _ => None,
    };
    roles.ok_or(TransitionViolation::NotEnumerated { from, to })
}

/// Every enumerated `(from, to, roles)` triple for a state set, in table order.
pub fn enumerate<S: TransitionTable>() -> Vec<(S, S, &'static [Role])> {
    S::ALL
        .iter()
        .flat_map(|from| from.edges().iter().map(move |e| (*from, e.to, e.roles)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_pairs<S: TransitionTable>() -> Vec<(S, S)> {
        S::ALL
            .iter()
            .flat_map(|a| S::ALL.iter().map(move |b| (*a, *b)))
            .collect()
    }

    #[test]
    fn terminal_states_have_no_edges() {
        for state in SchedulingState::ALL {
            assert_eq!(state.is_terminal(), state.edges().is_empty(), "{state}");
        }
        for state in OrderState::ALL {
            assert_eq!(state.is_terminal(), state.edges().is_empty(), "{state}");
        }
    }

    #[test]
    fn no_transition_leaves_a_terminal_state() {
        for (from, to) in all_pairs::<SchedulingState>() {
            if from.is_terminal() {
                assert!(!is_valid_transition(from, to));
                assert_eq!(
                    check_transition(from.into(), to.into()),
                    Err(TransitionViolation::TerminalState { from: from.into() })
                );
            }
        }
        for (from, to) in all_pairs::<OrderState>() {
            if from.is_terminal() {
                assert!(!is_valid_transition(from, to));
            }
        }
    }

    #[test]
    fn absent_pairs_are_invalid() {
        let listed = enumerate::<SchedulingState>();
        for (from, to) in all_pairs::<SchedulingState>() {
            let present = listed.iter().any(|(f, t, _)| *f == from && *t == to);
            assert_eq!(is_valid_transition(from, to), present, "{from} -> {to}");
        }
        let listed = enumerate::<OrderState>();
        for (from, to) in all_pairs::<OrderState>() {
            let present = listed.iter().any(|(f, t, _)| *f == from && *t == to);
            assert_eq!(is_valid_transition(from, to), present, "{from} -> {to}");
        }
    }

    #[test]
    fn scheduling_cannot_skip_proposal_states() {
        use SchedulingState::*;
        assert!(!is_valid_transition(Intent, Confirmed));
        assert!(!is_valid_transition(Intent, ConfirmedModified));
        assert!(!is_valid_transition(Intent, Completed));
        for (from, to, _) in enumerate::<SchedulingState>() {
            if to == Confirmed {
                assert!(from.is_proposal_state(), "{from} reaches Confirmed directly");
            }
        }
    }

    #[test]
    fn order_direct_confirmation_is_enumerated() {
        assert!(is_valid_transition(OrderState::Draft, OrderState::Confirmed));
        assert_eq!(
            check_transition(OrderState::Draft.into(), OrderState::Confirmed.into()),
            Ok(PRESCRIBER)
        );
    }

    #[test]
    fn cross_kind_pairs_are_not_enumerated() {
        let from = RecordState::Order(OrderState::Draft);
        let to = RecordState::Scheduling(SchedulingState::Confirmed);
        assert_eq!(
            check_transition(from, to),
            Err(TransitionViolation::NotEnumerated { from, to })
        );
    }

    #[test]
    fn self_loops_only_where_listed() {
        use OrderState::*;
        assert!(is_valid_transition(Modified, Modified));
        assert!(!is_valid_transition(Confirmed, Confirmed));
        assert!(!is_valid_transition(Draft, Draft));
    }
}
