//! Scenario 6: Engine from TOML
//!
//! Loads `policies/warden.toml`, builds the engine it describes, and runs a
//! support agent and a trainee through it.

use std::sync::Arc;

use warden_audit::{InMemoryAuditLog, TracingAuditHook};
use warden_contracts::{context::CallContext, error::WardenResult};
use warden_guards::GuardsConfig;

use super::{report, report_audit};

const SUPPORT_POLICY: &str = include_str!("../../policies/warden.toml");

pub async fn run_scenario() -> WardenResult<()> {
    println!("=== Scenario 6: Engine from TOML ===");
    println!();

    let engine = GuardsConfig::from_toml_str(SUPPORT_POLICY)?.build_engine()?;
    let audit = Arc::new(InMemoryAuditLog::new());
    engine.add_post_hook(audit.clone()).add_post_hook(Arc::new(TracingAuditHook::new()));

    println!("  Guards installed:       {}", engine.guard_names().join(", "));
    println!("  Approval timeout:       {:?}", engine.config().approval_timeout);
    println!();

    let calls = [
        ("support: search_kb", CallContext::new("search_kb").with_agent("support").with_argument("query", "reset 2fa")),
        (
            "support: send_email(card number)",
            CallContext::new("send_email")
                .with_agent("support")
                .with_argument("body", "card 4111 1111 1111 1111 was refunded"),
        ),
        ("support: delete_ticket(draft_12)", CallContext::new("delete_ticket").with_agent("support").with_argument("id", "draft_12")),
        (
            "support: delete_ticket(ticket_root)",
            CallContext::new("delete_ticket").with_agent("support").with_argument("id", "ticket_root"),
        ),
        ("support: refund_order", CallContext::new("refund_order").with_agent("support").with_argument("order", "A-17")),
        ("trainee: delete_ticket(draft_13)", CallContext::new("delete_ticket").with_agent("trainee").with_argument("id", "draft_13")),
        ("support: update_billing", CallContext::new("update_billing").with_agent("support")),
    ];

    for (label, ctx) in calls {
        let decision = engine.evaluate(ctx).await?;
        report(label, &decision);
    }

    println!();
    report_audit(&audit);
    Ok(())
}
