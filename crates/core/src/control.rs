//! Control-plane readings: kill-switches and domain operational state.
//!
//! Readings are taken fresh on every call and never cached. Anything that cannot be read is
//! reported as [`KillSwitchState::Unknown`] or a missing operational state, both of which the
//! gate treats as a denial.

use crate::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use vpr_types::RecordKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillSwitchState {
    Inactive,
    Active,
    Unknown,
}

impl KillSwitchState {
    /// Only an affirmative `Inactive` counts as off.
    pub fn is_affirmatively_inactive(self) -> bool {
        matches!(self, KillSwitchState::Inactive)
    }
}

/// Scope a kill-switch applies to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KillSwitchScope {
    Global,
    Environment(String),
    Domain(RecordKind),
    Tenant(String),
}

impl std::fmt::Display for KillSwitchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KillSwitchScope::Global => f.write_str("global"),
            KillSwitchScope::Environment(env) => write!(f, "environment:{env}"),
            KillSwitchScope::Domain(kind) => write!(f, "domain:{kind}"),
            KillSwitchScope::Tenant(tenant) => write!(f, "tenant:{tenant}"),
        }
    }
}

/// Operational state of a domain.
///
/// Anything other than `Operational` denies, including variants added later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum OperationalState {
    NotOperational,
    Maintenance,
    Operational,
}

pub trait ControlPlane: Send + Sync {
    fn kill_switch(&self, scope: &KillSwitchScope) -> KillSwitchState;

    /// `None` when no reading is available.
    fn operational_state(&self, kind: RecordKind) -> Option<OperationalState>;
}

/// Serialised control-plane document.
///
/// A scope missing from the document reads as `Unknown`; operators list every switch
/// explicitly to turn it off.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlSnapshot {
    #[serde(default)]
    pub global: Option<KillSwitchState>,
    #[serde(default)]
    pub environments: BTreeMap<String, KillSwitchState>,
    #[serde(default)]
    pub domains: BTreeMap<RecordKind, KillSwitchState>,
    #[serde(default)]
    pub tenants: BTreeMap<String, KillSwitchState>,
    #[serde(default)]
    pub operational: BTreeMap<RecordKind, OperationalState>,
}

impl ControlSnapshot {
    pub fn kill_switch(&self, scope: &KillSwitchScope) -> KillSwitchState {
        let reading = match scope {
            KillSwitchScope::Global => self.global,
            KillSwitchScope::Environment(env) => self.environments.get(env).copied(),
            KillSwitchScope::Domain(kind) => self.domains.get(kind).copied(),
            KillSwitchScope::Tenant(tenant) => self.tenants.get(tenant).copied(),
        };
        reading.unwrap_or(KillSwitchState::Unknown)
    }

    pub fn set_kill_switch(&mut self, scope: KillSwitchScope, state: KillSwitchState) {
        match scope {
            KillSwitchScope::Global => self.global = Some(state),
            KillSwitchScope::Environment(env) => {
                self.environments.insert(env, state);
            }
            KillSwitchScope::Domain(kind) => {
                self.domains.insert(kind, state);
            }
            KillSwitchScope::Tenant(tenant) => {
                self.tenants.insert(tenant, state);
            }
        }
    }
}

/// Control plane held in memory and changed by operators at runtime.
#[derive(Debug, Default)]
pub struct InMemoryControlPlane {
    snapshot: RwLock<ControlSnapshot>,
}

impl InMemoryControlPlane {
    pub fn new(snapshot: ControlSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }

    pub fn set_kill_switch(&self, scope: KillSwitchScope, state: KillSwitchState) {
        tracing::warn!(%scope, ?state, "kill-switch changed");
        let mut guard = self.snapshot.write().unwrap_or_else(|p| p.into_inner());
        guard.set_kill_switch(scope, state);
    }

    pub fn set_operational_state(&self, kind: RecordKind, state: Option<OperationalState>) {
        tracing::warn!(%kind, ?state, "domain operational state changed");
        let mut guard = self.snapshot.write().unwrap_or_else(|p| p.into_inner());
        match state {
            Some(state) => {
                guard.operational.insert(kind, state);
            }
            None => {
                guard.operational.remove(&kind);
            }
        }
    }
}

impl ControlPlane for InMemoryControlPlane {
    fn kill_switch(&self, scope: &KillSwitchScope) -> KillSwitchState {
        self.snapshot
            .read()
            .map(|s| s.kill_switch(scope))
            .unwrap_or(KillSwitchState::Unknown)
    }

    fn operational_state(&self, kind: RecordKind) -> Option<OperationalState> {
        self.snapshot
            .read()
            .ok()
            .and_then(|s| s.operational.get(&kind).copied())
    }
}

/// Control plane read from a YAML document on every call.
///
/// A missing or unparsable document yields no readings at all, so every switch is `Unknown`.
#[derive(Clone, Debug)]
pub struct FileControlPlane {
    path: PathBuf,
}

impl FileControlPlane {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and parses the document.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::FileRead`] or [`GateError::Config`] with the offending field path.
    pub fn load(&self) -> GateResult<ControlSnapshot> {
        let contents = std::fs::read_to_string(&self.path).map_err(GateError::FileRead)?;
        let de = serde_yaml::Deserializer::from_str(&contents);
        serde_path_to_error::deserialize(de).map_err(|e| {
            GateError::Config(format!(
                "{}: {} at {}",
                self.path.display(),
                e.inner(),
                e.path()
            ))
        })
    }

    /// Writes `snapshot` back to the document.
    pub fn save(&self, snapshot: &ControlSnapshot) -> GateResult<()> {
        let yaml = serde_yaml::to_string(snapshot).map_err(GateError::YamlSerialization)?;
        std::fs::write(&self.path, yaml).map_err(GateError::FileWrite)
    }

    fn reading(&self) -> Option<ControlSnapshot> {
        match self.load() {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "control plane unreadable");
                None
            }
        }
    }
}

impl ControlPlane for FileControlPlane {
    fn kill_switch(&self, scope: &KillSwitchScope) -> KillSwitchState {
        self.reading()
            .map(|s| s.kill_switch(scope))
            .unwrap_or(KillSwitchState::Unknown)
    }

    fn operational_state(&self, kind: RecordKind) -> Option<OperationalState> {
        self.reading()
            .and_then(|s| s.operational.get(&kind).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unlisted_switch_reads_unknown() {
        let plane = InMemoryControlPlane::default();
        assert_eq!(
            plane.kill_switch(&KillSwitchScope::Global),
            KillSwitchState::Unknown
        );
        assert!(!plane
            .kill_switch(&KillSwitchScope::Tenant("t-1".into()))
            .is_affirmatively_inactive());
        assert_eq!(plane.operational_state(RecordKind::Order), None);
    }

    #[test]
    fn operator_changes_are_visible_immediately() {
        let plane = InMemoryControlPlane::default();
        plane.set_kill_switch(KillSwitchScope::Domain(RecordKind::Order), KillSwitchState::Inactive);
        assert!(plane
            .kill_switch(&KillSwitchScope::Domain(RecordKind::Order))
            .is_affirmatively_inactive());
        plane.set_kill_switch(KillSwitchScope::Domain(RecordKind::Order), KillSwitchState::Active);
        assert_eq!(
            plane.kill_switch(&KillSwitchScope::Domain(RecordKind::Order)),
            KillSwitchState::Active
        );
    }

    #[test]
    fn test_file_control_plane_rereads_each_call() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("control.yaml");
        std::fs::write(
            &path,
            "global: inactive\ndomains:\n  scheduling: inactive\noperational:\n  scheduling: operational\n",
        )
        .unwrap();
        let plane = FileControlPlane::new(&path);
        assert_eq!(
            plane.kill_switch(&KillSwitchScope::Global),
            KillSwitchState::Inactive
        );
        assert_eq!(
            plane.operational_state(RecordKind::Scheduling),
            Some(OperationalState::Operational)
        );

        std::fs::write(&path, "global: active\n").unwrap();
        assert_eq!(
            plane.kill_switch(&KillSwitchScope::Global),
            KillSwitchState::Active
        );
        assert_eq!(plane.operational_state(RecordKind::Scheduling), None);
    }

    #[test]
    fn test_unreadable_control_file_is_unknown() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("control.yaml");
        std::fs::write(&path, "global: maybe\n").unwrap();
        let plane = FileControlPlane::new(&path);
        assert_eq!(
            plane.kill_switch(&KillSwitchScope::Global),
            KillSwitchState::Unknown
        );

        let err = plane.load().unwrap_err();
        assert!(err.to_string().contains("global"), "{err}");

        let missing = FileControlPlane::new(temp_dir.path().join("absent.yaml"));
        assert_eq!(
            missing.kill_switch(&KillSwitchScope::Global),
            KillSwitchState::Unknown
        );
    }
}
