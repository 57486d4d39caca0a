//! Governance configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into the gate behind an `Arc`. Nothing here reads environment variables; binaries
//! resolve paths and hand them in.
//!
//! Every switch that allows execution defaults to off. Turning one on is a [`ConfigChange`]
//! made by a human Operator, which produces a new configuration value and an audit entry.

use crate::actor::Actor;
use crate::audit::{AuditRecorder, EntryDraft, EntryType, ResultingState};
use crate::constants::{
    DEFAULT_CONFIRMATION_MAX_AGE_SECS, DEFAULT_ENVIRONMENT, DEFAULT_MAX_PARTICIPANTS,
    DEFAULT_MAX_RATIONALE_CHARS, DEFAULT_MAX_SCHEDULE_MINUTES,
};
use crate::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use vpr_types::{NonEmptyText, RecordKind, Role};

/// Sensitivity of the data a request touches, least sensitive first.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DataClassification {
    #[default]
    Public,
    Internal,
    Confidential,
    Restricted,
}

/// Limits and rules applied by the policy safeguard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PolicyConfig {
    /// Case-insensitive substrings that may not appear in rationale, purpose or order content.
    pub prohibited_patterns: Vec<String>,
    pub max_rationale_chars: usize,
    pub max_schedule_minutes: i64,
    pub max_participants: usize,
    /// Permits the direct `Draft -> Confirmed` order path.
    pub allow_direct_order_confirmation: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            prohibited_patterns: Vec::new(),
            max_rationale_chars: DEFAULT_MAX_RATIONALE_CHARS,
            max_schedule_minutes: DEFAULT_MAX_SCHEDULE_MINUTES,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            allow_direct_order_confirmation: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DomainFile {
    #[serde(default)]
    enabled: bool,
}

/// On-disk form of [`GovernanceConfig`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct GovernanceFile {
    #[serde(default)]
    subsystem_enabled: bool,
    #[serde(default)]
    domains: BTreeMap<RecordKind, DomainFile>,
    #[serde(default = "default_environment")]
    environment: String,
    #[serde(default)]
    allowed_tenants: BTreeSet<String>,
    #[serde(default)]
    max_data_classification: DataClassification,
    #[serde(default = "default_confirmation_max_age_secs")]
    confirmation_max_age_secs: u64,
    #[serde(default)]
    policy: PolicyConfig,
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_owned()
}

fn default_confirmation_max_age_secs() -> u64 {
    DEFAULT_CONFIRMATION_MAX_AGE_SECS
}

/// Configuration resolved at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GovernanceConfig {
    subsystem_enabled: bool,
    enabled_domains: BTreeSet<RecordKind>,
    environment: String,
    allowed_tenants: BTreeSet<String>,
    max_data_classification: DataClassification,
    confirmation_max_age_secs: u64,
    confirmation_max_age: chrono::Duration,
    policy: PolicyConfig,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            subsystem_enabled: false,
            enabled_domains: BTreeSet::new(),
            environment: DEFAULT_ENVIRONMENT.to_owned(),
            allowed_tenants: BTreeSet::new(),
            max_data_classification: DataClassification::default(),
            confirmation_max_age_secs: DEFAULT_CONFIRMATION_MAX_AGE_SECS,
            confirmation_max_age: chrono::Duration::seconds(
                DEFAULT_CONFIRMATION_MAX_AGE_SECS as i64,
            ),
            policy: PolicyConfig::default(),
        }
    }
}

impl GovernanceConfig {
    /// Create a new `GovernanceConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] if `confirmation_max_age_secs` is zero or too large to be a
    /// duration, or if a policy limit is zero.
    pub fn new(
        environment: NonEmptyText,
        allowed_tenants: BTreeSet<String>,
        max_data_classification: DataClassification,
        confirmation_max_age_secs: u64,
        policy: PolicyConfig,
    ) -> GateResult<Self> {
        if confirmation_max_age_secs == 0 {
            return Err(GateError::Config(
                "confirmation_max_age_secs must be greater than zero".into(),
            ));
        }
        let confirmation_max_age = i64::try_from(confirmation_max_age_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                GateError::Config(format!(
                    "confirmation_max_age_secs {confirmation_max_age_secs} is out of range"
                ))
            })?;
        if policy.max_rationale_chars == 0
            || policy.max_schedule_minutes <= 0
            || policy.max_participants == 0
        {
            return Err(GateError::Config(
                "policy limits must be greater than zero".into(),
            ));
        }
        Ok(Self {
            subsystem_enabled: false,
            enabled_domains: BTreeSet::new(),
            environment: environment.to_string(),
            allowed_tenants,
            max_data_classification,
            confirmation_max_age_secs,
            confirmation_max_age,
            policy,
        })
    }

    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] naming the field path of the first problem, including
    /// fields that are not recognised.
    pub fn from_yaml_str(contents: &str) -> GateResult<Self> {
        let de = serde_yaml::Deserializer::from_str(contents);
        let file: GovernanceFile = serde_path_to_error::deserialize(de)
            .map_err(|e| GateError::Config(format!("{} at {}", e.inner(), e.path())))?;

        let environment = NonEmptyText::new(&file.environment)
            .map_err(|e| GateError::Config(format!("environment: {e}")))?;
        let mut config = Self::new(
            environment,
            file.allowed_tenants,
            file.max_data_classification,
            file.confirmation_max_age_secs,
            file.policy,
        )?;
        config.subsystem_enabled = file.subsystem_enabled;
        config.enabled_domains = file
            .domains
            .into_iter()
            .filter(|(_, domain)| domain.enabled)
            .map(|(kind, _)| kind)
            .collect();
        Ok(config)
    }

    /// Loads the configuration at `path`.
    pub fn load(path: &Path) -> GateResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(GateError::FileRead)?;
        Self::from_yaml_str(&contents)
            .map_err(|e| GateError::Config(format!("{}: {e}", path.display())))
    }

    pub fn to_yaml_string(&self) -> GateResult<String> {
        serde_yaml::to_string(&self.to_file()).map_err(GateError::YamlSerialization)
    }

    /// Writes the configuration to `path`.
    pub fn save(&self, path: &Path) -> GateResult<()> {
        std::fs::write(path, self.to_yaml_string()?).map_err(GateError::FileWrite)
    }

    fn to_file(&self) -> GovernanceFile {
        GovernanceFile {
            subsystem_enabled: self.subsystem_enabled,
            domains: RecordKind::ALL
                .into_iter()
                .map(|kind| {
                    (
                        kind,
                        DomainFile {
                            enabled: self.domain_enabled(kind),
                        },
                    )
                })
                .collect(),
            environment: self.environment.clone(),
            allowed_tenants: self.allowed_tenants.clone(),
            max_data_classification: self.max_data_classification,
            confirmation_max_age_secs: self.confirmation_max_age_secs,
            policy: self.policy.clone(),
        }
    }

    pub fn subsystem_enabled(&self) -> bool {
        self.subsystem_enabled
    }

    pub fn domain_enabled(&self, kind: RecordKind) -> bool {
        self.enabled_domains.contains(&kind)
    }

    pub fn enabled_domains(&self) -> impl Iterator<Item = RecordKind> + '_ {
        self.enabled_domains.iter().copied()
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn tenant_allowed(&self, tenant: &str) -> bool {
        self.allowed_tenants.contains(tenant)
    }

    pub fn allowed_tenants(&self) -> &BTreeSet<String> {
        &self.allowed_tenants
    }

    pub fn max_data_classification(&self) -> DataClassification {
        self.max_data_classification
    }

    pub fn confirmation_max_age(&self) -> chrono::Duration {
        self.confirmation_max_age
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Applies an audited configuration change and returns the resulting configuration.
    ///
    /// Only a human Operator with a live session may make a change. The audit entry is written
    /// before the new value is returned; if it cannot be written the change does not happen.
    ///
    /// # Errors
    ///
    /// [`GateError::Unauthorised`] for any other actor, or [`GateError::Audit`] if the
    /// configuration-change entry could not be appended.
    pub fn apply_change(
        &self,
        change: ConfigChange,
        actor: &Actor,
        reason: &NonEmptyText,
        recorder: &AuditRecorder,
    ) -> GateResult<GovernanceConfig> {
        if actor.principal != (crate::actor::Principal::Human { role: Role::Operator }) {
            return Err(GateError::Unauthorised(format!(
                "configuration changes require a human Operator, got {}",
                actor.principal.label()
            )));
        }
        let now = recorder.clock().now().ok_or_else(|| {
            GateError::Unauthorised("no trusted time to check the operator session".into())
        })?;
        if !actor.session_active_at(now) {
            return Err(GateError::Unauthorised(format!(
                "operator session {} has expired",
                actor.session_id
            )));
        }

        let mut next = self.clone();
        match change {
            ConfigChange::EnableSubsystem => next.subsystem_enabled = true,
            ConfigChange::DisableSubsystem => next.subsystem_enabled = false,
            ConfigChange::EnableDomain(kind) => {
                next.enabled_domains.insert(kind);
            }
            ConfigChange::DisableDomain(kind) => {
                next.enabled_domains.remove(&kind);
            }
        }

        let mut draft = EntryDraft::for_actor(
            EntryType::ConfigurationChange,
            change.to_string(),
            actor,
        );
        draft.prior_state = Some(self.summary());
        draft.resulting_state = ResultingState::State(next.summary());
        draft.evidence = serde_json::json!({
            "change": change,
            "reason": reason,
            "before": self.to_file(),
            "after": next.to_file(),
        });
        let audit_ref = recorder.record(draft)?;
        tracing::info!(
            %change,
            operator = %actor.id,
            %audit_ref,
            "governance configuration changed"
        );
        Ok(next)
    }

    /// Short enablement summary used in audit entries.
    fn summary(&self) -> String {
        let domains: Vec<&str> = self.enabled_domains.iter().map(|k| k.as_str()).collect();
        format!(
            "subsystem={} domains=[{}]",
            if self.subsystem_enabled { "on" } else { "off" },
            domains.join(",")
        )
    }
}

/// An enablement change an Operator may make.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", content = "domain", rename_all = "snake_case")]
pub enum ConfigChange {
    EnableSubsystem,
    DisableSubsystem,
    EnableDomain(RecordKind),
    DisableDomain(RecordKind),
}

impl std::fmt::Display for ConfigChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigChange::EnableSubsystem => f.write_str("enable_subsystem"),
            ConfigChange::DisableSubsystem => f.write_str("disable_subsystem"),
            ConfigChange::EnableDomain(kind) => write!(f, "enable_domain:{kind}"),
            ConfigChange::DisableDomain(kind) => write!(f, "disable_domain:{kind}"),
        }
    }
}

/// Resolve a configuration file path without reading environment variables.
///
/// If `override_path` is provided it is used as-is; otherwise `default_name` relative to the
/// current working directory.
pub fn resolve_path(override_path: Option<PathBuf>, default_name: &str) -> PathBuf {
    override_path
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(default_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditSink, InMemoryAuditSink};
    use crate::clock::ManualClock;
    use crate::test_support::{actor, now};
    use crate::actor::Principal;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_fail_closed() {
        let config = GovernanceConfig::default();
        assert!(!config.subsystem_enabled());
        for kind in RecordKind::ALL {
            assert!(!config.domain_enabled(kind));
        }
        assert!(!config.policy().allow_direct_order_confirmation);
        assert_eq!(config.confirmation_max_age(), chrono::Duration::seconds(300));
        assert_eq!(config.max_data_classification(), DataClassification::Public);

        let parsed = GovernanceConfig::from_yaml_str("{}").unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn yaml_enables_domains_explicitly() {
        let yaml = r#"
subsystem_enabled: true
domains:
  scheduling:
    enabled: true
  order:
    enabled: false
environment: production
allowed_tenants: [clinic-a]
max_data_classification: confidential
policy:
  prohibited_patterns: ["ignore previous"]
  max_participants: 4
"#;
        let config = GovernanceConfig::from_yaml_str(yaml).unwrap();
        assert!(config.subsystem_enabled());
        assert!(config.domain_enabled(RecordKind::Scheduling));
        assert!(!config.domain_enabled(RecordKind::Order));
        assert_eq!(config.environment(), "production");
        assert!(config.tenant_allowed("clinic-a"));
        assert_eq!(config.policy().max_participants, 4);
        assert_eq!(config.policy().max_rationale_chars, DEFAULT_MAX_RATIONALE_CHARS);
    }

    #[test]
    fn unknown_fields_are_rejected_with_their_path() {
        let err = GovernanceConfig::from_yaml_str("policy:\n  allow_everything: true\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("allow_everything"), "{err}");
        assert!(err.contains("policy"), "{err}");
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(GovernanceConfig::from_yaml_str("confirmation_max_age_secs: 0").is_err());
        assert!(GovernanceConfig::from_yaml_str("policy:\n  max_participants: 0\n").is_err());
    }

    #[test]
    fn oversized_confirmation_age_is_rejected() {
        let err = GovernanceConfig::from_yaml_str(
            "confirmation_max_age_secs: 18446744073709551615\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");

        let largest = GovernanceConfig::from_yaml_str("confirmation_max_age_secs: 9000000000000\n")
            .unwrap();
        assert_eq!(largest.confirmation_max_age().num_seconds(), 9_000_000_000_000);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("gate.yaml");
        let config = GovernanceConfig::from_yaml_str(
            "subsystem_enabled: true\ndomains:\n  order:\n    enabled: true\n",
        )
        .unwrap();
        config.save(&path).unwrap();
        assert_eq!(GovernanceConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn operator_change_is_audited() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let recorder = AuditRecorder::new(sink.clone(), Arc::new(ManualClock::at(now())));
        let operator = actor("op-1", Principal::Human { role: Role::Operator });
        let reason = NonEmptyText::new("go-live approved by governance board").unwrap();

        let config = GovernanceConfig::default()
            .apply_change(ConfigChange::EnableSubsystem, &operator, &reason, &recorder)
            .unwrap()
            .apply_change(
                ConfigChange::EnableDomain(RecordKind::Scheduling),
                &operator,
                &reason,
                &recorder,
            )
            .unwrap();

        assert!(config.subsystem_enabled());
        assert!(config.domain_enabled(RecordKind::Scheduling));
        let entries = sink.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries
            .iter()
            .all(|e| e.entry.entry_type == EntryType::ConfigurationChange));
        assert_eq!(entries[1].entry.actor_id, "op-1");
        assert_eq!(
            entries[1].entry.evidence["change"]["domain"],
            serde_json::json!("scheduling")
        );
    }

    #[test]
    fn non_operators_cannot_change_configuration() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let recorder = AuditRecorder::new(sink.clone(), Arc::new(ManualClock::at(now())));
        let reason = NonEmptyText::new("because").unwrap();
        for principal in [
            Principal::Human { role: Role::Provider },
            Principal::Machine { role: Role::Operator },
            Principal::Clock,
        ] {
            let result = GovernanceConfig::default().apply_change(
                ConfigChange::EnableSubsystem,
                &actor("x", principal),
                &reason,
                &recorder,
            );
            assert!(matches!(result, Err(GateError::Unauthorised(_))));
        }
        assert!(sink.is_empty());
    }

    #[test]
    fn change_fails_when_audit_is_unavailable() {
        let sink = Arc::new(InMemoryAuditSink::new());
        sink.set_writable(false);
        let recorder = AuditRecorder::new(sink, Arc::new(ManualClock::at(now())));
        let result = GovernanceConfig::default().apply_change(
            ConfigChange::EnableSubsystem,
            &actor("op-1", Principal::Human { role: Role::Operator }),
            &NonEmptyText::new("because").unwrap(),
            &recorder,
        );
        assert!(matches!(result, Err(GateError::Audit(_))));
    }
}
