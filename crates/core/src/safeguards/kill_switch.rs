use super::{CategoryOutcome, Safeguard, SafeguardCategory, SafeguardContext};
use crate::control::KillSwitchScope;

/// Global, environment, domain and tenant kill-switches are each affirmatively inactive.
#[derive(Clone, Copy, Debug, Default)]
pub struct KillSwitchSafeguard;

impl KillSwitchSafeguard {
    /// Every scope that governs the request. The record's tenant is included when it differs
    /// from the tenant the request claims.
    pub fn scopes(ctx: &SafeguardContext<'_>) -> Vec<KillSwitchScope> {
        let boundary = &ctx.request.boundary;
        let mut scopes = vec![
            KillSwitchScope::Global,
            KillSwitchScope::Environment(ctx.config.environment().to_owned()),
            KillSwitchScope::Domain(ctx.request.record_kind),
            KillSwitchScope::Tenant(boundary.tenant_id.clone()),
        ];
        if let Some(record) = ctx.record {
            let tenant = KillSwitchScope::Tenant(record.tenant_id().to_string());
            if !scopes.contains(&tenant) {
                scopes.push(tenant);
            }
        }
        scopes
    }
}

impl Safeguard for KillSwitchSafeguard {
    fn category(&self) -> SafeguardCategory {
        SafeguardCategory::KillSwitch
    }

    fn check(&self, ctx: &SafeguardContext<'_>) -> CategoryOutcome {
        let failures = Self::scopes(ctx)
            .into_iter()
            .filter_map(|scope| {
                let state = ctx.control.kill_switch(&scope);
                (!state.is_affirmatively_inactive())
                    .then(|| format!("{scope} kill-switch is {state:?}"))
            })
            .collect();
        CategoryOutcome::from_failures(failures)
    }
}
