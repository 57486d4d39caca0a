use super::{CategoryOutcome, Safeguard, SafeguardCategory, SafeguardContext};

/// Evidence can be produced: the sink accepts writes, the request is correlatable, the actor
/// is attributable and a trusted timestamp is available.
#[derive(Clone, Copy, Debug, Default)]
pub struct AuditCapabilitySafeguard;

impl Safeguard for AuditCapabilitySafeguard {
    fn category(&self) -> SafeguardCategory {
        SafeguardCategory::AuditCapability
    }

    fn check(&self, ctx: &SafeguardContext<'_>) -> CategoryOutcome {
        let request = ctx.request;
        let mut failures = Vec::new();
        if let Err(e) = ctx.sink.probe() {
            failures.push(format!("audit sink cannot accept writes: {e}"));
        }
        if request.correlation_id.is_nil() {
            failures.push("correlation id is nil and cannot be assigned".into());
        }
        if request.request_id.is_nil() {
            failures.push("request id is nil".into());
        }
        if request.actor.id.as_str().trim().is_empty() {
            failures.push("actor cannot be attributed".into());
        }
        if ctx.now.is_none() {
            failures.push("no trusted timestamp available".into());
        }
        CategoryOutcome::from_failures(failures)
    }
}
