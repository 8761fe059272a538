//! Audit hook that writes one `tracing` event per decision.

use async_trait::async_trait;
use tracing::{info, warn};

use warden_contracts::{
    context::CallContext,
    decision::{Decision, DecisionStatus},
    error::WardenResult,
};
use warden_core::PostHook;

/// Logs blocked and approval-gated calls at WARN, the rest at INFO, under
/// the `warden::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditHook;

impl TracingAuditHook {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PostHook for TracingAuditHook {
    async fn on_decision(&self, ctx: &CallContext, decision: &Decision) -> WardenResult<()> {
        let reasons = decision.reasons.join("; ");
        let guards = decision.all_reasons.join("; ");
        match decision.status {
            DecisionStatus::Deny | DecisionStatus::RequireApproval => warn!(
                target: "warden::audit",
                call_id = %ctx.call_id,
                function = %ctx.function_name,
                agent = ctx.agent(),
                status = %decision.status,
                risk = decision.risk_score,
                allowed = decision.permits_execution(),
                %reasons,
                %guards,
                "call audited"
            ),
            DecisionStatus::Allow | DecisionStatus::Modify => info!(
                target: "warden::audit",
                call_id = %ctx.call_id,
                function = %ctx.function_name,
                agent = ctx.agent(),
                status = %decision.status,
                risk = decision.risk_score,
                allowed = decision.permits_execution(),
                "call audited"
            ),
        }
        Ok(())
    }
}
