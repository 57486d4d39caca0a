use super::{CategoryOutcome, Safeguard, SafeguardCategory, SafeguardContext};

/// The request stays within its environment, tenant, data classification, session and consent
/// scope.
#[derive(Clone, Copy, Debug, Default)]
pub struct BoundarySafeguard;

impl Safeguard for BoundarySafeguard {
    fn category(&self) -> SafeguardCategory {
        SafeguardCategory::Boundary
    }

    fn check(&self, ctx: &SafeguardContext<'_>) -> CategoryOutcome {
        let boundary = &ctx.request.boundary;
        let actor = &ctx.request.actor;
        let config = ctx.config;
        let mut failures = Vec::new();

        if boundary.environment != config.environment() {
            failures.push(format!(
                "request environment '{}' is not this environment '{}'",
                boundary.environment,
                config.environment()
            ));
        }

        if !config.tenant_allowed(&boundary.tenant_id) {
            failures.push(format!("tenant '{}' is not allowed", boundary.tenant_id));
        }
        match ctx.record {
            Some(record) if record.tenant_id().as_str() != boundary.tenant_id => {
                failures.push(format!(
                    "request tenant '{}' does not own record tenant '{}'",
                    boundary.tenant_id,
                    record.tenant_id()
                ));
            }
            Some(_) => {}
            None => failures.push("record tenant cannot be established".into()),
        }

        if boundary.data_classification > config.max_data_classification() {
            failures.push(format!(
                "data classification {:?} exceeds permitted {:?}",
                boundary.data_classification,
                config.max_data_classification()
            ));
        }

        if boundary.session_id != actor.session_id {
            failures.push(format!(
                "request session {} is not the actor's session {}",
                boundary.session_id, actor.session_id
            ));
        }
        match ctx.now {
            None => failures.push("no trusted time to check session expiry".into()),
            Some(now) if !actor.session_active_at(now) => {
                failures.push(format!("session {} has expired", actor.session_id));
            }
            Some(_) => {}
        }

        if !actor.has_consent_for(ctx.request.record_kind) {
            failures.push(format!(
                "{} records are outside the actor's consent scope",
                ctx.request.record_kind
            ));
        }

        CategoryOutcome::from_failures(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataClassification;
    use crate::test_support::Harness;
    use vpr_types::RecordKind;
    use vpr_uuid::SessionId;

    fn reasons(harness: &Harness, request: &crate::TransitionRequest) -> Vec<String> {
        match BoundarySafeguard.check(&harness.context(request)) {
            CategoryOutcome::Failed(reasons) => reasons,
            CategoryOutcome::Passed | CategoryOutcome::NotApplicable(_) => Vec::new(),
        }
    }

    #[test]
    fn matching_boundary_passes() {
        let harness = Harness::new();
        assert!(reasons(&harness, &harness.propose_schedule()).is_empty());
    }

    #[test]
    fn foreign_tenant_is_rejected_twice() {
        let harness = Harness::new();
        let mut request = harness.propose_schedule();
        request.boundary.tenant_id = "clinic-z".into();
        let found = reasons(&harness, &request);
        assert_eq!(found.len(), 2, "{found:?}");
    }

    #[test]
    fn classification_above_maximum_is_rejected() {
        let harness = Harness::new();
        let mut request = harness.propose_schedule();
        request.boundary.data_classification = DataClassification::Restricted;
        assert!(reasons(&harness, &request)[0].contains("exceeds"));
    }

    #[test]
    fn session_must_match_and_be_live() {
        let harness = Harness::new();
        let mut request = harness.propose_schedule();
        request.boundary.session_id = SessionId::generate();
        assert!(reasons(&harness, &request)[0].contains("session"));

        let request = harness.propose_schedule();
        harness.clock.advance(chrono::Duration::hours(2));
        assert!(reasons(&harness, &request)[0].contains("expired"));
    }

    #[test]
    fn consent_scope_is_enforced() {
        let harness = Harness::new();
        let mut request = harness.propose_schedule();
        request.actor.consent_scope.remove(&RecordKind::Scheduling);
        assert!(reasons(&harness, &request)[0].contains("consent scope"));
    }
}
