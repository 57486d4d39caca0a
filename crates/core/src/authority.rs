//! Authority resolution.
//!
//! Roles for each transition come from the transition table. This module turns them into a
//! [`RequiredAuthority`] and decides whether an actor satisfies it for a particular record.

use crate::actor::{Actor, Principal};
use crate::records::Record;
use crate::state::RecordState;
use crate::transitions::check_transition;
use serde::Serialize;
use vpr_types::{AuthorityDomain, Role};

/// Authority a transition requires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "roles", rename_all = "snake_case")]
pub enum RequiredAuthority {
    /// A human acting under one of these roles. Never empty.
    Roles(&'static [Role]),
    /// No human actor: time-based completion of a confirmed schedule, observed by the trusted
    /// clock process.
    RecordKeepingOnly,
    /// The transition is not valid, so no authority applies.
    NotApplicable,
}

/// Resolves the authority for `from -> to`.
pub fn required_authority(from: RecordState, to: RecordState) -> RequiredAuthority {
    match check_transition(from, to) {
        Ok([]) => RequiredAuthority::RecordKeepingOnly,
        Ok(roles) => RequiredAuthority::Roles(roles),
        Err(_) => RequiredAuthority::NotApplicable,
    }
}

/// Why an actor does not hold the required authority.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthorityViolation {
    #[error("role {role} is not permitted; requires one of [{}]", join(.required))]
    RoleNotPermitted {
        role: Role,
        required: &'static [Role],
    },
    #[error("machine principal acting as {role} cannot satisfy human authority")]
    MachinePrincipal { role: Role },
    #[error("the clock process may only record time-based completion")]
    ClockPrincipal,
    #[error("record-keeping transitions may only be taken by the clock process, not {0}")]
    RecordKeepingOnly(String),
    #[error("patient {actor_id} does not participate in this record")]
    NotOwnRecord { actor_id: String },
    #[error("record is unavailable so patient participation cannot be established")]
    RecordUnavailable,
    #[error("transition is not valid, so no authority applies")]
    NotApplicable,
}

fn join(roles: &[Role]) -> String {
    roles
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Checks whether `actor` satisfies `required` for `record`.
///
/// # Errors
///
/// Returns the [`AuthorityViolation`] describing the mismatch.
pub fn authorise(
    actor: &Actor,
    required: RequiredAuthority,
    record: Option<&Record>,
) -> Result<(), AuthorityViolation> {
    match (required, actor.principal) {
        (RequiredAuthority::NotApplicable, _) => Err(AuthorityViolation::NotApplicable),

        (RequiredAuthority::RecordKeepingOnly, Principal::Clock) => Ok(()),
        (RequiredAuthority::RecordKeepingOnly, other) => {
            Err(AuthorityViolation::RecordKeepingOnly(other.label()))
        }

        (RequiredAuthority::Roles(_), Principal::Clock) => Err(AuthorityViolation::ClockPrincipal),
        (RequiredAuthority::Roles(_), Principal::Machine { role }) => {
            Err(AuthorityViolation::MachinePrincipal { role })
        }
        (RequiredAuthority::Roles(required), Principal::Human { role }) => {
            if !required.contains(&role) {
                return Err(AuthorityViolation::RoleNotPermitted { role, required });
            }
            match role.authority_domain() {
                AuthorityDomain::OwnRecords => match record {
                    Some(record) if record.involves(&actor.id) => Ok(()),
                    Some(_) => Err(AuthorityViolation::NotOwnRecord {
                        actor_id: actor.id.to_string(),
                    }),
                    None => Err(AuthorityViolation::RecordUnavailable),
                },
                AuthorityDomain::CareTeam => Ok(()),
                // Neither appears in any transition's role list.
                AuthorityDomain::Administration | AuthorityDomain::ReadOnly => {
                    Err(AuthorityViolation::RoleNotPermitted { role, required })
                }
            }
        }
    }
}
