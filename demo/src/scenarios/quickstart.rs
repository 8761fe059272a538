//! Scenario 1: Quickstart
//!
//! A research agent with a $10/day budget (approval from 90%), a 30 calls
//! per minute rate limit, and a scope limited to `search_*` and `get_*`.
//! No approval handler is installed, so approval requests are auto-denied
//! and the spend they reserved is rolled back.

use std::sync::Arc;

use warden_audit::{InMemoryAuditLog, TracingAuditHook};
use warden_contracts::{context::CallContext, error::WardenResult};
use warden_core::PolicyEngine;
use warden_guards::{BudgetConfig, BudgetGuard, RateLimitConfig, RateLimitGuard, ScopeConfig, ScopeGuard};

use super::{report, report_audit};

pub async fn run_scenario() -> WardenResult<()> {
    println!("=== Scenario 1: Quickstart ===");
    println!();

    let budget = Arc::new(BudgetGuard::new(BudgetConfig {
        max_daily_spend: Some(10.0),
        warn_threshold: 0.9,
        ..Default::default()
    })?);
    let rate_limit = RateLimitGuard::new(RateLimitConfig { max_calls_per_minute: Some(30), ..Default::default() })?;
    let scope = ScopeGuard::new(ScopeConfig {
        allow_functions: vec!["search_*".to_string(), "get_*".to_string()],
        ..Default::default()
    })?;

    let audit = Arc::new(InMemoryAuditLog::new());
    let engine = PolicyEngine::new();
    engine
        .add_guard(budget.clone())
        .add_guard(Arc::new(rate_limit))
        .add_guard(Arc::new(scope))
        .add_post_hook(audit.clone())
        .add_post_hook(Arc::new(TracingAuditHook::new()));

    let calls = [
        ("search_web($8.50)", CallContext::new("search_web").with_argument("query", "rust async").with_estimated_cost(8.5)),
        ("search_web($2.00)", CallContext::new("search_web").with_argument("query", "tokio select").with_estimated_cost(2.0)),
        ("search_web($1.40)", CallContext::new("search_web").with_argument("query", "globset").with_estimated_cost(1.4)),
        ("get_profile", CallContext::new("get_profile").with_argument("user", "ann")),
        ("delete_profile", CallContext::new("delete_profile").with_argument("user", "ann")),
    ];

    for (label, ctx) in calls {
        let decision = engine.evaluate(ctx).await?;
        report(label, &decision);
    }

    let spend = budget.spend("default", "default");
    println!();
    println!("  Spend recorded today:   ${:.2} (denied calls were rolled back)", spend.daily);
    report_audit(&audit);
    Ok(())
}
