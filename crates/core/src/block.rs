//! Subsystem assertion.
//!
//! Before any request can be evaluated the execution subsystem as a whole has to be asserted
//! enabled. A failed assertion is a block condition: the caller gets a typed error listing
//! every reason, and no per-request logic can run because no `ExecutionGate<Enabled>` exists.

use crate::audit::{EntryDraft, EntryType, ResultingState};
use crate::control::{KillSwitchScope, KillSwitchState};
use crate::gate::{Enabled, ExecutionGate, Unverified};
use std::sync::MutexGuard;

/// One reason the subsystem is blocked.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum BlockReason {
    SubsystemNotEnabled,
    NoDomainEnabled,
    GlobalKillSwitch(KillSwitchState),
    ClockUnavailable,
    AuditUnavailable(String),
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubsystemNotEnabled => f.write_str("execution subsystem is not enabled"),
            Self::NoDomainEnabled => f.write_str("no record domain is enabled"),
            Self::GlobalKillSwitch(state) => write!(f, "global kill-switch is {state:?}"),
            Self::ClockUnavailable => f.write_str("no trusted time available"),
            Self::AuditUnavailable(detail) => write!(f, "audit sink unavailable: {detail}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("execution subsystem blocked: {}", render(.reasons))]
pub struct BlockCondition {
    pub reasons: Vec<BlockReason>,
}

fn render(reasons: &[BlockReason]) -> String {
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl BlockCondition {
    pub fn contains(&self, reason: &BlockReason) -> bool {
        self.reasons.contains(reason)
    }
}

impl ExecutionGate<Unverified> {
    /// Asserts that the execution subsystem is enabled.
    ///
    /// # Errors
    ///
    /// Returns a [`BlockCondition`] listing every failed check. The block is also written to
    /// the audit stream when the stream accepts writes.
    pub fn assert_subsystem_enabled(&self) -> Result<ExecutionGate<Enabled>, BlockCondition> {
        let mut reasons = Vec::new();

        if !self.config.subsystem_enabled() {
            reasons.push(BlockReason::SubsystemNotEnabled);
        }
        if self.config.enabled_domains().next().is_none() {
            reasons.push(BlockReason::NoDomainEnabled);
        }
        let global = self.control.kill_switch(&KillSwitchScope::Global);
        if !global.is_affirmatively_inactive() {
            reasons.push(BlockReason::GlobalKillSwitch(global));
        }
        let now = self.recorder.clock().now();
        if now.is_none() {
            reasons.push(BlockReason::ClockUnavailable);
        }
        if let Err(e) = self.recorder.sink().probe() {
            reasons.push(BlockReason::AuditUnavailable(e.to_string()));
        }

        match now {
            Some(now) if reasons.is_empty() => {
                *self.last_block() = None;
                tracing::info!(environment = %self.config.environment(), "execution subsystem enabled");
                Ok(ExecutionGate {
                    config: self.config.clone(),
                    control: self.control.clone(),
                    records: self.records.clone(),
                    recorder: self.recorder.clone(),
                    last_block: self.last_block.clone(),
                    state: Enabled::new(now),
                })
            }
            _ => {
                let condition = BlockCondition { reasons };
                let mut last = self.last_block();
                if last.as_ref() == Some(&condition) {
                    tracing::debug!(%condition, "execution subsystem still blocked");
                } else {
                    tracing::error!(%condition, "execution subsystem blocked");
                    if self.record_block(&condition) {
                        *last = Some(condition.clone());
                    }
                }
                Err(condition)
            }
        }
    }

    /// Writes a `SubsystemBlocked` entry. Returns whether it was written.
    fn record_block(&self, condition: &BlockCondition) -> bool {
        let mut draft = EntryDraft::system(EntryType::SubsystemBlocked, "assert_subsystem_enabled");
        draft.resulting_state = ResultingState::NotApplicable;
        draft.evidence = serde_json::json!({ "reasons": condition.reasons });
        match self.recorder.record(draft) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "subsystem block could not be audited");
                false
            }
        }
    }

    fn last_block(&self) -> MutexGuard<'_, Option<BlockCondition>> {
        self.last_block.lock().unwrap_or_else(|p| p.into_inner())
    }
}
