//! Actors as supplied by the identity/consent collaborator.
//!
//! The gate trusts these values and does not re-verify them. What it does enforce is the
//! distinction between a human acting under a role, automation acting under a role, and the
//! trusted clock process: only the first can ever satisfy clinical authority or confirmation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use vpr_types::{NonEmptyText, RecordKind, Role};
use vpr_uuid::SessionId;

/// Who or what is acting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    /// An authenticated person acting under a role.
    Human { role: Role },
    /// AI drafting or other automation acting under a role.
    Machine { role: Role },
    /// The trusted time-based record-keeping process.
    Clock,
}

impl Principal {
    pub fn role(self) -> Option<Role> {
        match self {
            Principal::Human { role } | Principal::Machine { role } => Some(role),
            Principal::Clock => None,
        }
    }

    pub fn is_human(self) -> bool {
        matches!(self, Principal::Human { .. })
    }

    /// Label written into audit attribution.
    pub fn label(self) -> String {
        match self {
            Principal::Human { role } => role.to_string(),
            Principal::Machine { role } => format!("Machine({role})"),
            Principal::Clock => "Clock".to_owned(),
        }
    }
}

/// A verified actor with its session and consent scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Actor {
    pub id: NonEmptyText,
    pub principal: Principal,
    pub session_id: SessionId,
    pub session_expires_at: DateTime<Utc>,
    /// Record kinds the consent collaborator authorised for this session.
    #[serde(default)]
    pub consent_scope: BTreeSet<RecordKind>,
}

impl Actor {
    pub fn role(&self) -> Option<Role> {
        self.principal.role()
    }

    pub fn is_human(&self) -> bool {
        self.principal.is_human()
    }

    pub fn has_consent_for(&self, kind: RecordKind) -> bool {
        self.consent_scope.contains(&kind)
    }

    /// The session is live at `now`. Expiry is exclusive.
    pub fn session_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.session_expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn actor(principal: Principal) -> Actor {
        Actor {
            id: NonEmptyText::new("u-1").unwrap(),
            principal,
            session_id: SessionId::generate(),
            session_expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap(),
            consent_scope: BTreeSet::from([RecordKind::Scheduling]),
        }
    }

    #[test]
    fn principal_wire_form_is_tagged() {
        let json = serde_json::to_value(Principal::Machine { role: Role::Provider }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "machine", "role": "Provider"}));
        let clock: Principal = serde_json::from_value(serde_json::json!({"kind": "clock"})).unwrap();
        assert_eq!(clock, Principal::Clock);
    }

    #[test]
    fn only_humans_are_human() {
        assert!(actor(Principal::Human { role: Role::Staff }).is_human());
        assert!(!actor(Principal::Machine { role: Role::Staff }).is_human());
        assert!(!actor(Principal::Clock).is_human());
        assert_eq!(actor(Principal::Clock).role(), None);
    }

    #[test]
    fn session_expiry_is_exclusive() {
        let a = actor(Principal::Human { role: Role::Patient });
        assert!(a.session_active_at(a.session_expires_at - chrono::Duration::seconds(1)));
        assert!(!a.session_active_at(a.session_expires_at));
    }

    #[test]
    fn consent_scope_is_checked_per_kind() {
        let a = actor(Principal::Human { role: Role::Patient });
        assert!(a.has_consent_for(RecordKind::Scheduling));
        assert!(!a.has_consent_for(RecordKind::Order));
    }
}
