use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vpr_gate_core::{
    audit::AuditSink,
    config::resolve_path,
    constants::{
        AUDIT_LOG_PATH_ENV, CONFIG_PATH_ENV, CONTROL_PATH_ENV, DEFAULT_AUDIT_LOG_FILENAME,
        DEFAULT_CONFIG_FILENAME, DEFAULT_CONTROL_FILENAME,
    },
    state::{LifecycleState, OrderState, SchedulingState},
    transitions::{enumerate, TransitionTable},
    Actor, AuditRecorder, ConfigChange, CorrelationId, ExecutionGate, FileControlPlane,
    GovernanceConfig, JsonlAuditSink, NonEmptyText, Principal, Record, RecordKind,
    RecordRegistry, Role, SessionId, SystemClock, TransitionRequest,
};

#[derive(Parser)]
#[command(name = "vpr-gate")]
#[command(about = "VPR execution gate for scheduling and order records")]
struct Cli {
    /// Governance configuration YAML (defaults to $VPR_GATE_CONFIG or ./gate.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Control-plane YAML (defaults to $VPR_GATE_CONTROL or ./control.yaml)
    #[arg(long, global = true)]
    control: Option<PathBuf>,
    /// Audit log (defaults to $VPR_GATE_AUDIT_LOG or ./audit.jsonl)
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assert that the execution subsystem is enabled
    Status,
    /// List the transition table for a record kind
    Transitions {
        /// scheduling or order
        kind: RecordKind,
    },
    /// Evaluate a transition request
    Evaluate {
        /// JSON file holding the transition request
        request: PathBuf,
        /// JSON file holding the records the gate may read
        #[arg(long)]
        records: PathBuf,
        /// Apply the transition if allowed and write the records file back
        #[arg(long)]
        apply: bool,
    },
    /// Make an audited configuration change
    Configure {
        #[command(subcommand)]
        change: ChangeCommand,
        /// Operator identity
        #[arg(long)]
        operator: String,
        /// Operator session id
        #[arg(long)]
        session: String,
        /// When the operator session expires, as issued by the identity provider (RFC 3339)
        #[arg(long)]
        session_expires_at: chrono::DateTime<chrono::Utc>,
        /// Why the change is being made
        #[arg(long)]
        reason: String,
    },
    /// Print the audit trail for a correlation id
    Audit {
        correlation_id: String,
    },
    /// Verify the audit log hash chain
    VerifyAudit,
}

#[derive(Subcommand, Clone, Copy)]
enum ChangeCommand {
    EnableSubsystem,
    DisableSubsystem,
    EnableDomain { kind: RecordKind },
    DisableDomain { kind: RecordKind },
}

impl From<ChangeCommand> for ConfigChange {
    fn from(value: ChangeCommand) -> Self {
        match value {
            ChangeCommand::EnableSubsystem => ConfigChange::EnableSubsystem,
            ChangeCommand::DisableSubsystem => ConfigChange::DisableSubsystem,
            ChangeCommand::EnableDomain { kind } => ConfigChange::EnableDomain(kind),
            ChangeCommand::DisableDomain { kind } => ConfigChange::DisableDomain(kind),
        }
    }
}

/// File locations resolved once from flags, then environment, then defaults.
struct Paths {
    config: PathBuf,
    control: PathBuf,
    audit_log: PathBuf,
}

impl Paths {
    fn resolve(cli: &Cli) -> Self {
        let pick = |flag: &Option<PathBuf>, env: &str, default: &str| {
            resolve_path(
                flag.clone()
                    .or_else(|| std::env::var_os(env).map(PathBuf::from)),
                default,
            )
        };
        Self {
            config: pick(&cli.config, CONFIG_PATH_ENV, DEFAULT_CONFIG_FILENAME),
            control: pick(&cli.control, CONTROL_PATH_ENV, DEFAULT_CONTROL_FILENAME),
            audit_log: pick(&cli.audit_log, AUDIT_LOG_PATH_ENV, DEFAULT_AUDIT_LOG_FILENAME),
        }
    }

    /// A missing configuration file means the fail-closed defaults.
    fn load_config(&self) -> anyhow::Result<GovernanceConfig> {
        if self.config.exists() {
            Ok(GovernanceConfig::load(&self.config)?)
        } else {
            tracing::warn!(path = %self.config.display(), "no configuration file; using defaults");
            Ok(GovernanceConfig::default())
        }
    }

    fn recorder(&self) -> anyhow::Result<Arc<AuditRecorder>> {
        let sink = JsonlAuditSink::open(&self.audit_log)
            .with_context(|| format!("opening audit log {}", self.audit_log.display()))?;
        Ok(Arc::new(AuditRecorder::new(
            Arc::new(sink),
            Arc::new(SystemClock),
        )))
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vpr_gate_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let paths = Paths::resolve(&cli);

    match cli.command {
        Some(Commands::Status) => {
            let gate = ExecutionGate::new(
                Arc::new(paths.load_config()?),
                Arc::new(FileControlPlane::new(&paths.control)),
                Arc::new(RecordRegistry::new()),
                paths.recorder()?,
            );
            match gate.assert_subsystem_enabled() {
                Ok(enabled) => println!(
                    "Execution subsystem enabled (asserted at {})",
                    enabled.asserted_at()
                ),
                Err(block) => {
                    eprintln!("Execution subsystem BLOCKED:");
                    for reason in &block.reasons {
                        eprintln!("  - {reason}");
                    }
                    std::process::exit(2);
                }
            }
        }
        Some(Commands::Transitions { kind }) => match kind {
            RecordKind::Scheduling => print_table::<SchedulingState>(),
            RecordKind::Order => print_table::<OrderState>(),
        },
        Some(Commands::Evaluate {
            request,
            records,
            apply,
        }) => evaluate(&paths, &request, &records, apply)?,
        Some(Commands::Configure {
            change,
            operator,
            session,
            session_expires_at,
            reason,
        }) => {
            let config = paths.load_config()?;
            let recorder = paths.recorder()?;
            let operator = operator_actor(&operator, &session, session_expires_at)?;
            let change = ConfigChange::from(change);
            let next = config.apply_change(change, &operator, &NonEmptyText::new(&reason)?, &recorder)?;
            next.save(&paths.config)?;
            println!("Applied {change}; wrote {}", paths.config.display());
        }
        Some(Commands::Audit { correlation_id }) => {
            let sink = JsonlAuditSink::open(&paths.audit_log)?;
            let correlation_id = CorrelationId::parse(&correlation_id)?;
            let entries = sink.by_correlation(&correlation_id)?;
            if entries.is_empty() {
                println!("No audit entries found.");
            }
            for entry in entries {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            }
        }
        Some(Commands::VerifyAudit) => {
            // Opening verifies the chain.
            let sink = JsonlAuditSink::open(&paths.audit_log)?;
            println!(
                "Audit log {} verified: {} entries",
                sink.path().display(),
                sink.entries()?.len()
            );
        }
        None => {
            println!("Use 'vpr-gate --help' for commands");
        }
    }

    Ok(())
}

/// The acting operator, exactly as the identity provider described their session.
fn operator_actor(
    id: &str,
    session: &str,
    session_expires_at: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<Actor> {
    Ok(Actor {
        id: NonEmptyText::new(id)?,
        principal: Principal::Human {
            role: Role::Operator,
        },
        session_id: SessionId::parse(session)?,
        session_expires_at,
        consent_scope: Default::default(),
    })
}

fn print_table<S: TransitionTable>() {
    for from in S::ALL {
        if from.is_terminal() {
            println!("{from} (terminal)");
        }
    }
    for (from, to, roles) in enumerate::<S>() {
        let roles = if roles.is_empty() {
            "record-keeping only".to_owned()
        } else {
            roles
                .iter()
                .map(|r| r.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!("{from} -> {to}: {roles}");
    }
}

fn evaluate(paths: &Paths, request: &Path, records: &Path, apply: bool) -> anyhow::Result<()> {
    let request: TransitionRequest = read_json(request)?;
    let held: Vec<Record> = read_json(records)?;

    let registry = Arc::new(RecordRegistry::new());
    for record in held {
        registry.restore(record)?;
    }
    let recorder = paths.recorder()?;
    let gate = ExecutionGate::new(
        Arc::new(paths.load_config()?),
        Arc::new(FileControlPlane::new(&paths.control)),
        registry.clone(),
        recorder.clone(),
    )
    .assert_subsystem_enabled()?;

    let decision = gate.evaluate(&request);
    println!("{}", serde_json::to_string_pretty(&decision)?);

    if apply && decision.is_allowed() {
        let updated = registry.apply(&decision, &request, &recorder)?;
        let contents = serde_json::to_string_pretty(&registry.records())?;
        std::fs::write(records, contents)
            .with_context(|| format!("writing {}", records.display()))?;
        println!("Applied: record {} is now {}", updated.id(), updated.state());
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use vpr_gate_core::{InMemoryAuditSink, ManualClock};

    const SESSION: &str = "0f8c2b4e3d1a4c6b9e2f7a5d1c3b8e90";

    #[test]
    fn configure_requires_session_expiry() {
        let base = [
            "vpr-gate",
            "configure",
            "enable-subsystem",
            "--operator",
            "ops-1",
            "--session",
            SESSION,
            "--reason",
            "go live",
        ];
        assert!(Cli::try_parse_from(base).is_err());

        let cli = Cli::try_parse_from(
            base.iter()
                .copied()
                .chain(["--session-expires-at", "2026-06-01T10:00:00Z"]),
        )
        .unwrap();
        match cli.command {
            Some(Commands::Configure {
                session_expires_at, ..
            }) => assert_eq!(
                session_expires_at,
                Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap()
            ),
            _ => panic!("expected configure"),
        }
    }

    #[test]
    fn expired_operator_session_cannot_change_configuration() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap();
        let sink = Arc::new(InMemoryAuditSink::new());
        let recorder = AuditRecorder::new(sink.clone(), Arc::new(ManualClock::at(now)));
        let reason = NonEmptyText::new("go live").unwrap();
        let config = GovernanceConfig::default();

        let expired = operator_actor("ops-1", SESSION, now - chrono::Duration::minutes(1)).unwrap();
        assert!(config
            .apply_change(ConfigChange::EnableSubsystem, &expired, &reason, &recorder)
            .is_err());
        assert!(sink.is_empty());

        let live = operator_actor("ops-1", SESSION, now + chrono::Duration::minutes(10)).unwrap();
        let next = config
            .apply_change(ConfigChange::EnableSubsystem, &live, &reason, &recorder)
            .unwrap();
        assert!(next.subsystem_enabled());
        assert_eq!(sink.len(), 1);
    }
}
