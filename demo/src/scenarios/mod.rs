//! Demo scenarios.
//!
//! Each scenario is a self-contained module that wires real WARDEN
//! components (engine, guards, approval handler, audit log) together and
//! replays a short sequence of agent tool calls against them.

pub mod email_cleanup;
pub mod quickstart;
pub mod runaway_loop;
pub mod secrets;
pub mod shopping;
pub mod toml_config;

use warden_audit::InMemoryAuditLog;
use warden_contracts::decision::Decision;

/// Print one call's final decision and its reasons.
pub(crate) fn report(label: &str, decision: &Decision) {
    println!("  {label:<46} {}", decision.status.as_str().to_uppercase());
    for reason in &decision.reasons {
        println!("      - {reason}");
    }
}

pub(crate) fn report_audit(audit: &InMemoryAuditLog) {
    println!(
        "  Audit chain integrity:  {} ({} entr{})",
        if audit.verify_integrity() { "VERIFIED" } else { "FAILED" },
        audit.len(),
        if audit.len() == 1 { "y" } else { "ies" }
    );
    println!();
}
