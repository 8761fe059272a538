//! Scenario 3: Shopping Assistant
//!
//! Purchases above $50 need approval; a callback approver signs off on
//! anything up to $80. Single purchases are capped at $100, the daily total
//! at $150, and gambling is off limits. A purchase whose approval is
//! refused releases its share of the daily total.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use warden_audit::InMemoryAuditLog;
use warden_contracts::{
    approval::{ApprovalRequest, ApprovalResponse},
    context::CallContext,
    error::WardenResult,
};
use warden_core::{CallbackApprovalHandler, PolicyEngine};
use warden_guards::{PurchaseConfig, PurchaseGuard};

use super::{report, report_audit};

const APPROVER: &str = "finance-bot";
const APPROVAL_LIMIT: f64 = 80.0;

async fn review(request: ApprovalRequest) -> WardenResult<ApprovalResponse> {
    let amount = request.call_context.arguments.get("amount").and_then(Value::as_f64).unwrap_or(f64::MAX);
    let now = Utc::now();
    Ok(if amount <= APPROVAL_LIMIT {
        ApprovalResponse::approve(APPROVER, now).with_note(format!("${amount:.2} is within my limit"))
    } else {
        ApprovalResponse::deny(APPROVER, now).with_note(format!("${amount:.2} needs a human"))
    })
}

fn buy(item: &str, amount: f64, category: &str) -> CallContext {
    CallContext::new("buy_item")
        .with_agent("shopper")
        .with_argument("item", item)
        .with_argument("amount", amount)
        .with_argument("category", category)
}

pub async fn run_scenario() -> WardenResult<()> {
    println!("=== Scenario 3: Shopping Assistant ===");
    println!();

    let purchase = Arc::new(PurchaseGuard::new(PurchaseConfig {
        max_single_purchase: Some(100.0),
        max_daily_purchases: Some(150.0),
        require_approval_above: Some(50.0),
        blocked_categories: vec!["gambling".to_string()],
        ..Default::default()
    })?);

    let audit = Arc::new(InMemoryAuditLog::new());
    let approver = CallbackApprovalHandler::new(review).notify_denied(|request: &ApprovalRequest, response: &ApprovalResponse| {
        println!(
            "  -> {} told the agent no on {}: {}",
            response.approver,
            request.call_context.function_name,
            response.note.as_deref().unwrap_or("no reason given")
        );
    });
    let engine = PolicyEngine::new().with_approval_handler(Arc::new(approver));
    engine.add_guard(purchase.clone()).add_post_hook(audit.clone());

    let calls = [
        ("novel ($25, books)", buy("novel", 25.0, "books")),
        ("headphones ($75, electronics)", buy("headphones", 75.0, "electronics")),
        ("jacket ($95, clothing)", buy("jacket", 95.0, "clothing")),
        ("chips ($30, Online Gambling)", buy("chips", 30.0, "Online Gambling")),
        ("monitor ($120, electronics)", buy("monitor", 120.0, "electronics")),
        ("keyboard ($45, electronics)", buy("keyboard", 45.0, "electronics")),
        ("cable ($10, electronics)", buy("cable", 10.0, "electronics")),
    ];

    for (label, ctx) in calls {
        let decision = engine.evaluate(ctx).await?;
        report(label, &decision);
    }

    let (total, count) = purchase.today("shopper");
    println!();
    println!("  Purchases today:        {count} totalling ${total:.2}");
    report_audit(&audit);
    Ok(())
}
