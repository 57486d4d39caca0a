//! Constants used throughout the gate crate.
//!
//! Defaults here are the *safe* values: anything that enables execution defaults to off.

/// Environment variable naming the governance configuration YAML file.
pub const CONFIG_PATH_ENV: &str = "VPR_GATE_CONFIG";

/// Environment variable naming the control-plane YAML file (kill-switches, operational state).
pub const CONTROL_PATH_ENV: &str = "VPR_GATE_CONTROL";

/// Environment variable naming the JSON-lines audit log.
pub const AUDIT_LOG_PATH_ENV: &str = "VPR_GATE_AUDIT_LOG";

/// Default configuration filename when no explicit path is configured.
pub const DEFAULT_CONFIG_FILENAME: &str = "gate.yaml";

/// Default control-plane filename when no explicit path is configured.
pub const DEFAULT_CONTROL_FILENAME: &str = "control.yaml";

/// Default audit log filename when no explicit path is configured.
pub const DEFAULT_AUDIT_LOG_FILENAME: &str = "audit.jsonl";

/// Environment name used when the configuration does not name one.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Maximum age of a human confirmation, in seconds.
pub const DEFAULT_CONFIRMATION_MAX_AGE_SECS: u64 = 300;

/// Maximum length of a transition rationale, in characters.
pub const DEFAULT_MAX_RATIONALE_CHARS: usize = 2_000;

/// Maximum length of a single scheduled slot, in minutes.
pub const DEFAULT_MAX_SCHEDULE_MINUTES: i64 = 480;

/// Maximum number of participants on a scheduling record.
pub const DEFAULT_MAX_PARTICIPANTS: usize = 20;
