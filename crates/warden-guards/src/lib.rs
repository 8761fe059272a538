//! # warden-guards
//!
//! The built-in WARDEN guards and the TOML loader that wires them into a
//! [`PolicyEngine`](warden_core::PolicyEngine).
//!
//! | Guard | Applies to | Records state |
//! |---|---|---|
//! | [`BudgetGuard`] | every call | spend per session, day, month |
//! | [`RateLimitGuard`] | every call | call log per session |
//! | [`DeletionGuard`] | deletion-like function names | deletion counts |
//! | [`PurchaseGuard`] | purchase-like function names | daily purchase totals |
//! | [`ScopeGuard`] | every call | none |
//! | [`SensitiveDataGuard`] | every call not exempted | none |
//!
//! Guards that record state do so when they let a call through and release
//! it in `rollback` if the engine's final decision is DENY.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use warden_guards::GuardsConfig;
//!
//! let engine = GuardsConfig::from_file(Path::new("warden.toml"))?.build_engine()?;
//! let decision = engine.evaluate(ctx).await?;
//! ```

pub mod budget;
pub mod config;
pub mod deletion;
pub mod pattern;
pub mod purchase;
pub mod rate_limit;
pub mod scope;
pub mod sensitive_data;
pub mod window;

use serde_json::Value;

pub use budget::{BudgetConfig, BudgetGuard, SpendSnapshot};
pub use config::{EngineSection, GuardSection, GuardsConfig};
pub use deletion::{DeletionConfig, DeletionGuard};
pub use purchase::{PurchaseConfig, PurchaseGuard};
pub use rate_limit::{RateLimitConfig, RateLimitGuard};
pub use scope::{ScopeConfig, ScopeGuard};
pub use sensitive_data::{SensitiveDataConfig, SensitiveDataGuard};

/// Read a JSON number, or a string holding one.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use warden_contracts::{context::CallContext, decision::DecisionStatus};
    use warden_core::{guarded, AutoApproveHandler, Guard, ManualClock, PolicyEngine};

    use super::*;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 14, 10, 0, 0).unwrap()))
    }

    // ── 1. TOML loading ───────────────────────────────────────────────────────

    #[test]
    fn full_config_parses() {
        let toml = r#"
            [engine]
            approval_timeout_secs = 1.5
            hook_timeout_ms = 100

            [budget]
            max_daily_spend = 10
            warn_threshold = 0.9
            cost_estimator = { search_web = 0.25 }

            [rate_limit]
            max_calls_per_minute = 30

            [scope]
            allow_functions = ["get_*", "search_*"]
            deny_by_agent = { intern = ["search_*"] }

            [deletion]
            enabled = false
            protected_resources = ["inbox"]
        "#;

        let config = GuardsConfig::from_toml_str(toml).unwrap();
        let engine = config.engine.to_engine_config().unwrap();
        assert_eq!(engine.approval_timeout, Duration::from_millis(1500));
        assert_eq!(engine.hook_timeout, Duration::from_millis(100));

        let budget = &config.budget.as_ref().unwrap().settings;
        assert_eq!(budget.max_daily_spend, Some(10.0));
        assert_eq!(budget.cost_estimator["search_web"], 0.25);
        // Untouched keys keep their defaults.
        assert_eq!(budget.cost_field, "estimated_cost");

        let deletion = config.deletion.as_ref().unwrap();
        assert!(!deletion.enabled);
        assert_eq!(deletion.settings.protected_resources, vec!["inbox".to_string()]);
        assert!(config.purchase.is_none());
    }

    #[test]
    fn only_enabled_sections_become_guards() {
        let toml = r#"
            [budget]
            [scope]
            [deletion]
            enabled = false
        "#;
        let config = GuardsConfig::from_toml_str(toml).unwrap();
        let names: Vec<String> =
            config.build_guards(clock()).unwrap().iter().map(|g| g.name().to_string()).collect();
        assert_eq!(names, vec!["scope", "budget"]);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = GuardsConfig::from_toml_str("this is not valid toml ][[[").unwrap_err();
        assert!(err.to_string().contains("failed to parse guard TOML"), "got: {err}");

        let unknown = GuardsConfig::from_toml_str("[firewall]\nenabled = true").unwrap_err();
        assert!(unknown.to_string().contains("firewall"), "got: {unknown}");
    }

    #[test]
    fn misspelled_guard_key_is_rejected() {
        let err = GuardsConfig::from_toml_str("[budget]\nmax_dialy_spend = 1.0").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("[budget]"), "got: {message}");
        assert!(message.contains("max_dialy_spend"), "got: {message}");

        let err = GuardsConfig::from_toml_str("[engine]\nhook_timeout = 5").unwrap_err();
        assert!(err.to_string().contains("hook_timeout"), "got: {err}");

        let config = GuardsConfig::from_toml_str("[budget]\nenabled = false\nmax_daily_spend = 1.0").unwrap();
        assert_eq!(config.budget.unwrap().settings.max_daily_spend, Some(1.0));
    }

    #[test]
    fn invalid_guard_settings_fail_the_build() {
        let config = GuardsConfig::from_toml_str("[budget]\nmax_daily_spend = -5.0").unwrap();
        assert!(config.build_engine().is_err());

        let config = GuardsConfig::from_toml_str("[scope]\ndeny_functions = [\"[bad\"]").unwrap();
        assert!(config.build_engine().is_err());

        let config = GuardsConfig::from_toml_str("[engine]\napproval_timeout_secs = -1.0").unwrap();
        assert!(config.build_engine().is_err());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = GuardsConfig::from_file(std::path::Path::new("/nonexistent/warden.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read guard config"));
    }

    // ── 2. Guards inside the engine ───────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn scope_allow_list_through_the_engine() {
        let engine = GuardsConfig::from_toml_str("[scope]\nallow_functions = [\"get_*\"]")
            .unwrap()
            .build_engine_with_clock(clock())
            .unwrap();

        let allowed = engine.evaluate(CallContext::new("get_profile")).await.unwrap();
        assert_eq!(allowed.status, DecisionStatus::Allow);

        let denied = engine.evaluate(CallContext::new("delete_profile")).await.unwrap();
        assert_eq!(denied.status, DecisionStatus::Deny);
        assert_eq!(denied.contributors, vec!["scope".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn spend_is_released_when_another_guard_denies() {
        let clock = clock();
        let budget = Arc::new(
            BudgetGuard::new(BudgetConfig { max_daily_spend: Some(10.0), ..Default::default() })
                .unwrap()
                .with_clock(clock.clone()),
        );
        let scope = ScopeGuard::new(ScopeConfig { deny_functions: vec!["drop_*".into()], ..Default::default() }).unwrap();

        let engine = PolicyEngine::new().with_clock(clock);
        engine.add_guard(budget.clone()).add_guard(Arc::new(scope));

        let blocked = CallContext::new("drop_table").with_estimated_cost(4.0);
        assert_eq!(engine.evaluate(blocked).await.unwrap().status, DecisionStatus::Deny);
        assert_eq!(budget.spend("default", "default").daily, 0.0);

        let allowed = CallContext::new("get_table").with_estimated_cost(4.0);
        assert_eq!(engine.evaluate(allowed).await.unwrap().status, DecisionStatus::Allow);
        assert_eq!(budget.spend("default", "default").daily, 4.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn redaction_merges_with_other_allows() {
        let engine = GuardsConfig::from_toml_str(
            r#"
            [scope]
            [sensitive_data]
            redact_on_modify = true
            "#,
        )
        .unwrap()
        .build_engine_with_clock(clock())
        .unwrap();

        let ctx = CallContext::new("post_note").with_argument("text", "ssn 123-45-6789").with_argument("pinned", true);
        let decision = engine.evaluate(ctx).await.unwrap();
        assert_eq!(decision.status, DecisionStatus::Modify);
        let args = decision.modified_arguments.unwrap();
        assert_eq!(args["text"], json!(sensitive_data::REDACTED));
        assert_eq!(args["pinned"], json!(true));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn approved_call_runs_with_redacted_arguments() {
        let clock = clock();
        let budget = BudgetGuard::new(BudgetConfig {
            max_daily_spend: Some(10.0),
            warn_threshold: 0.8,
            ..Default::default()
        })
        .unwrap()
        .with_clock(clock.clone());
        let sensitive = SensitiveDataGuard::new(SensitiveDataConfig {
            redact_on_modify: true,
            ..Default::default()
        })
        .unwrap();

        let engine = PolicyEngine::new()
            .with_clock(clock)
            .with_approval_handler(Arc::new(AutoApproveHandler));
        engine.add_guard(Arc::new(budget)).add_guard(Arc::new(sensitive));

        let ctx = CallContext::new("post_note")
            .with_argument("text", "ssn 123-45-6789")
            .with_estimated_cost(9.0);
        let sent = guarded(&engine, ctx, |args| async move { args["text"].clone() }).await.unwrap();
        assert_eq!(sent, json!(sensitive_data::REDACTED));
    }

    #[test]
    fn numbers_may_arrive_as_strings() {
        assert_eq!(as_number(&json!(2.5)), Some(2.5));
        assert_eq!(as_number(&json!(" 7 ")), Some(7.0));
        assert_eq!(as_number(&json!("seven")), None);
        assert_eq!(as_number(&json!(null)), None);
    }
}
