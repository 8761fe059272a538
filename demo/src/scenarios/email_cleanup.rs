//! Scenario 2: Email Cleanup
//!
//! An inbox-cleaning agent may delete spam and promotions freely, never
//! touches the inbox or invoices, and deletes at most three messages per
//! call. Calls go through `guarded`, so the mock delete only runs when the
//! engine permits it. Unclassified messages need approval, which nobody
//! grants here.

use std::sync::Arc;

use serde_json::json;

use warden_audit::InMemoryAuditLog;
use warden_contracts::{
    context::{Arguments, CallContext},
    error::{WardenError, WardenResult},
};
use warden_core::{guarded, AutoDenyHandler, PolicyEngine};
use warden_guards::{DeletionConfig, DeletionGuard};

use super::{report, report_audit};

/// Stand-in for the real mail API: reports how many messages it removed.
async fn delete_messages(arguments: Arguments) -> usize {
    match (arguments.get("ids"), arguments.get("email_id")) {
        (Some(serde_json::Value::Array(ids)), _) => ids.len(),
        (_, Some(_)) => 1,
        _ => 0,
    }
}

pub async fn run_scenario() -> WardenResult<()> {
    println!("=== Scenario 2: Email Cleanup ===");
    println!();

    let deletion = DeletionGuard::new(DeletionConfig {
        allow_patterns: vec!["spam_*".to_string(), "promo_*".to_string()],
        deny_patterns: vec!["*_invoice".to_string()],
        protected_resources: vec!["inbox".to_string()],
        max_bulk_delete: Some(3),
        ..Default::default()
    })?;

    let audit = Arc::new(InMemoryAuditLog::new());
    let engine = PolicyEngine::new()
        .with_approval_handler(Arc::new(AutoDenyHandler::with_note("no reviewer on shift")));
    engine.add_guard(Arc::new(deletion)).add_post_hook(audit.clone());

    let calls = [
        ("delete_email(spam_001)", CallContext::new("delete_email").with_argument("email_id", "spam_001")),
        ("delete_email(inbox)", CallContext::new("delete_email").with_argument("email_id", "inbox")),
        ("delete_email(march_invoice)", CallContext::new("delete_email").with_argument("email_id", "march_invoice")),
        (
            "bulk_delete(4 messages)",
            CallContext::new("bulk_delete").with_argument("ids", json!(["spam_1", "promo_2", "spam_3", "spam_4"])),
        ),
        (
            "bulk_delete(2 messages)",
            CallContext::new("bulk_delete").with_argument("ids", json!(["spam_5", "promo_6"])),
        ),
        ("delete_email(q3_report)", CallContext::new("delete_email").with_argument("email_id", "q3_report")),
    ];

    for (label, ctx) in calls {
        match guarded(&engine, ctx, delete_messages).await {
            Ok(removed) => println!("  {label:<46} EXECUTED ({removed} removed)"),
            Err(WardenError::Blocked { decision }) => report(label, &decision),
            Err(e) => return Err(e),
        }
    }

    println!();
    report_audit(&audit);
    Ok(())
}
