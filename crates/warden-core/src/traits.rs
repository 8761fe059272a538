//! Core trait definitions for the WARDEN evaluation pipeline.
//!
//! These three traits define the engine's extension seams:
//!
//! - `Guard`: a policy unit; evaluated concurrently with its peers
//! - `ApprovalHandler`: resolves REQUIRE_APPROVAL decisions (human or automated)
//! - `PostHook`: observes every final decision (audit, metrics, dashboards)
//!
//! The engine never trusts an implementation to behave: guard failures become
//! DENY, handler failures become a denied approval, hook failures are logged.

use std::time::Duration;

use async_trait::async_trait;

use warden_contracts::{
    approval::{ApprovalRequest, ApprovalResponse, TimeoutOutcome},
    context::CallContext,
    decision::Decision,
    error::WardenResult,
};

/// A single policy unit evaluating one call.
///
/// Built-in guards keep their bookkeeping behind interior locks, so
/// `evaluate` takes `&self` and may run for many calls at once.
#[async_trait]
pub trait Guard: Send + Sync {
    /// Stable name used in reasons, logs, and registry lookups.
    fn name(&self) -> &str;

    /// Return false to sit out this call entirely: no decision, no reason.
    fn should_apply(&self, _ctx: &CallContext) -> bool {
        true
    }

    /// Decide on the call. An `Err` is converted by the engine into a DENY
    /// contribution naming this guard.
    async fn evaluate(&self, ctx: &CallContext) -> WardenResult<Decision>;

    /// Undo state this guard recorded tentatively for `ctx`.
    ///
    /// Called by the engine when the final decision is DENY. Guards that
    /// record nothing tentative keep the default no-op.
    fn rollback(&self, _ctx: &CallContext) {}
}

/// Resolves an approval request, typically by asking a human.
///
/// The engine enforces `timeout` itself and drops the returned future on
/// timeout or cancellation, so implementations release their resources on
/// drop rather than polling a flag.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Wait for a verdict on `request`. `timeout` is advisory for display;
    /// the engine enforces it.
    async fn request(&self, request: &ApprovalRequest, timeout: Duration) -> WardenResult<ApprovalResponse>;

    /// Verdict applied when no response arrives before the timeout.
    fn timeout_outcome(&self) -> TimeoutOutcome {
        TimeoutOutcome::Deny
    }

    /// Called after this handler approves `request`.
    async fn on_approved(&self, _request: &ApprovalRequest, _response: &ApprovalResponse) {}

    /// Called after this handler denies `request`. Not called for timeouts,
    /// cancellation or handler errors.
    async fn on_denied(&self, _request: &ApprovalRequest, _response: &ApprovalResponse) {}
}

/// Observer invoked once per evaluation with the final decision.
#[async_trait]
pub trait PostHook: Send + Sync {
    async fn on_decision(&self, ctx: &CallContext, decision: &Decision) -> WardenResult<()>;
}

/// Adapter turning a plain closure into a [`PostHook`].
pub struct HookFn<F>(pub F);

#[async_trait]
impl<F> PostHook for HookFn<F>
where
    F: Fn(&CallContext, &Decision) -> WardenResult<()> + Send + Sync,
{
    async fn on_decision(&self, ctx: &CallContext, decision: &Decision) -> WardenResult<()> {
        (self.0)(ctx, decision)
    }
}
