use super::{CategoryOutcome, Safeguard, SafeguardCategory, SafeguardContext};
use crate::authority::RequiredAuthority;

/// A verified human, the acting actor, confirmed exactly this transition recently.
///
/// Machine-originated confirmations never pass. Record-keeping transitions have no human to
/// confirm and report not applicable.
#[derive(Clone, Copy, Debug, Default)]
pub struct HumanConfirmationSafeguard;

impl Safeguard for HumanConfirmationSafeguard {
    fn category(&self) -> SafeguardCategory {
        SafeguardCategory::HumanConfirmation
    }

    fn check(&self, ctx: &SafeguardContext<'_>) -> CategoryOutcome {
        if ctx.required == RequiredAuthority::RecordKeepingOnly {
            return CategoryOutcome::NotApplicable(
                "record-keeping transition has no human confirmer".into(),
            );
        }
        let request = ctx.request;
        let Some(confirmation) = &request.confirmation else {
            return CategoryOutcome::Failed(vec!["no human confirmation presented".into()]);
        };

        let mut failures = Vec::new();
        if !confirmation.verified {
            failures.push(format!(
                "confirmer {} has not been verified by the identity provider",
                confirmation.confirmer_id
            ));
        }
        if !confirmation.principal.is_human() {
            failures.push(format!(
                "confirmation originated from {}; only a human may confirm",
                confirmation.principal.label()
            ));
        }
        if confirmation.confirmer_id != request.actor.id {
            failures.push(format!(
                "confirmer {} is not the acting actor {}",
                confirmation.confirmer_id, request.actor.id
            ));
        }
        if confirmation.record_id != request.record_id
            || confirmation.from_state != request.from_state
            || confirmation.to_state != request.to_state
        {
            failures.push(format!(
                "confirmation covers {} {}->{}, not the requested {} {}->{}",
                confirmation.record_id,
                confirmation.from_state,
                confirmation.to_state,
                request.record_id,
                request.from_state,
                request.to_state
            ));
        }
        match ctx.now {
            None => failures.push("no trusted time to check confirmation freshness".into()),
            Some(now) if confirmation.confirmed_at > now => {
                failures.push("confirmation is timestamped in the future".into());
            }
            Some(now) if now - confirmation.confirmed_at > ctx.config.confirmation_max_age() => {
                failures.push(format!(
                    "confirmation is stale: older than {}s",
                    ctx.config.confirmation_max_age().num_seconds()
                ));
            }
            Some(_) => {}
        }
        CategoryOutcome::from_failures(failures)
    }
}
