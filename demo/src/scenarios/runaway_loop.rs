//! Scenario 4: Runaway Loop
//!
//! An agent stuck retrying the same fetch is stopped after three identical
//! calls. When it then fires off calls as fast as it can, the burst
//! detector trips and every call is refused until the cooldown expires.

use std::sync::Arc;

use warden_audit::InMemoryAuditLog;
use warden_contracts::{context::CallContext, error::WardenResult};
use warden_core::PolicyEngine;
use warden_guards::{RateLimitConfig, RateLimitGuard};

use super::{report, report_audit};

pub async fn run_scenario() -> WardenResult<()> {
    println!("=== Scenario 4: Runaway Loop ===");
    println!();

    let rate_limit = RateLimitGuard::new(RateLimitConfig {
        max_identical_calls: 3,
        burst_window_seconds: 5.0,
        burst_threshold: 10,
        cooldown_seconds: 30.0,
        ..Default::default()
    })?;

    let audit = Arc::new(InMemoryAuditLog::new());
    let engine = PolicyEngine::new();
    engine.add_guard(Arc::new(rate_limit)).add_post_hook(audit.clone());

    println!("  Retrying the same request:");
    for attempt in 1..=5 {
        let ctx = CallContext::new("fetch_page").with_session("crawl-1").with_argument("url", "https://example.com/a");
        let decision = engine.evaluate(ctx).await?;
        report(&format!("fetch_page(/a) attempt {attempt}"), &decision);
    }

    println!();
    println!("  Fanning out as fast as possible:");
    for page in 1..=10 {
        let ctx = CallContext::new("fetch_page")
            .with_session("crawl-1")
            .with_argument("url", format!("https://example.com/p{page}"));
        let decision = engine.evaluate(ctx).await?;
        report(&format!("fetch_page(/p{page})"), &decision);
    }

    println!();
    report_audit(&audit);
    Ok(())
}
