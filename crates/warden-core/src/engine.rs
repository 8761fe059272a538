//! The WARDEN policy engine: concurrent guard fan-out, merge, approval.
//!
//! Every call goes through the same pipeline:
//!
//!   validate → snapshot registry → should_apply → evaluate (concurrently)
//!   → contain failures → merge → [approval handshake] → [rollback] → post-hooks
//!
//! The fail-safe rule is absolute: a guard that errors or panics contributes a
//! DENY, so a malfunctioning guard can never silently permit a call.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use futures::future::join_all;
use serde_json::json;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use warden_contracts::{
    approval::{ApprovalOutcome, ApprovalRequest},
    context::CallContext,
    decision::{Decision, DecisionStatus},
    error::WardenResult,
};

use crate::{
    approval::{resolve, run_handshake},
    clock::{Clock, SystemClock},
    handlers::AutoDenyHandler,
    merge::merge,
    traits::{ApprovalHandler, Guard, PostHook},
};

/// Default bound on how long a REQUIRE_APPROVAL call may wait for a verdict.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(300);
/// Default bound on how long `evaluate` waits for post-hooks before returning.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_millis(250);

/// Reason recorded when the caller cancels an evaluation mid-flight.
pub const CANCELLED_REASON: &str = "evaluation cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub approval_timeout: Duration,
    pub hook_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }
}

/// Aborts spawned guard tasks when the evaluation that owns them goes away.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Central evaluator for tool calls.
///
/// Share one engine across tasks behind an `Arc`; `evaluate` takes `&self`
/// and calls may overlap freely. Guard and hook registration take effect for
/// evaluations that start afterwards.
///
/// Guards run as tokio tasks, so `evaluate` must be called from within a
/// tokio runtime.
pub struct PolicyEngine {
    guards: RwLock<Vec<Arc<dyn Guard>>>,
    hooks: RwLock<Vec<Arc<dyn PostHook>>>,
    approval_handler: Arc<dyn ApprovalHandler>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            guards: RwLock::new(Vec::new()),
            hooks: RwLock::new(Vec::new()),
            approval_handler: Arc::new(AutoDenyHandler::new()),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_approval_handler(mut self, handler: Arc<dyn ApprovalHandler>) -> Self {
        self.approval_handler = handler;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Registry ─────────────────────────────────────────────────────────────

    /// Register a guard. A guard with the same name is replaced in place.
    pub fn add_guard(&self, guard: Arc<dyn Guard>) -> &Self {
        let mut guards = self.guards.write().unwrap_or_else(PoisonError::into_inner);
        match guards.iter().position(|g| g.name() == guard.name()) {
            Some(index) => {
                info!(guard = guard.name(), "replacing registered guard");
                guards[index] = guard;
            }
            None => {
                info!(guard = guard.name(), position = guards.len(), "guard registered");
                guards.push(guard);
            }
        }
        self
    }

    /// Remove the guard called `name`. Returns whether one was registered.
    pub fn remove_guard(&self, name: &str) -> bool {
        let mut guards = self.guards.write().unwrap_or_else(PoisonError::into_inner);
        let before = guards.len();
        guards.retain(|g| g.name() != name);
        let removed = guards.len() != before;
        if removed {
            info!(guard = name, "guard removed");
        }
        removed
    }

    pub fn guard_names(&self) -> Vec<String> {
        self.guards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|g| g.name().to_string())
            .collect()
    }

    pub fn has_guard(&self, name: &str) -> bool {
        self.guards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|g| g.name() == name)
    }

    pub fn add_post_hook(&self, hook: Arc<dyn PostHook>) -> &Self {
        self.hooks.write().unwrap_or_else(PoisonError::into_inner).push(hook);
        self
    }

    // ── Evaluation ───────────────────────────────────────────────────────────

    /// Evaluate `ctx` against every applicable guard and return the final
    /// decision.
    ///
    /// # Errors
    ///
    /// Only `WardenError::Validation` for a malformed context. Guard,
    /// handler, and hook failures are folded into the decision or logged.
    pub async fn evaluate(&self, ctx: CallContext) -> WardenResult<Decision> {
        self.evaluate_with_cancel(ctx, &CancellationToken::new()).await
    }

    /// Like [`evaluate`](Self::evaluate), but stops early when `cancel` fires.
    ///
    /// Cancellation aborts outstanding guard tasks and any pending approval,
    /// and resolves to DENY. State already recorded by guards is kept.
    /// Dropping the returned future has the same effect on guard tasks.
    pub async fn evaluate_with_cancel(&self, ctx: CallContext, cancel: &CancellationToken) -> WardenResult<Decision> {
        ctx.validate()?;
        let ctx = Arc::new(ctx);

        let snapshot: Vec<Arc<dyn Guard>> = self
            .guards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let applicable: Vec<Arc<dyn Guard>> = snapshot
            .into_iter()
            .filter(|guard| {
                // A guard that cannot tell whether it applies is evaluated anyway.
                catch_unwind(AssertUnwindSafe(|| guard.should_apply(&ctx))).unwrap_or(true)
            })
            .collect();

        debug!(
            call_id = %ctx.call_id,
            function = %ctx.function_name,
            agent = ctx.agent(),
            guards = applicable.len(),
            "evaluation starting"
        );

        // ── Fan-out ──────────────────────────────────────────────────────────
        let handles: Vec<JoinHandle<WardenResult<Decision>>> = applicable
            .iter()
            .map(|guard| {
                let guard = Arc::clone(guard);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move { guard.evaluate(&ctx).await })
            })
            .collect();
        let abort = AbortOnDrop(handles.iter().map(JoinHandle::abort_handle).collect());

        let joined = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            results = join_all(handles) => Some(results),
        };

        let Some(joined) = joined else {
            info!(call_id = %ctx.call_id, "evaluation cancelled during guard fan-out");
            drop(abort);
            let decision = Self::cancelled();
            self.run_hooks(&ctx, &decision).await;
            return Ok(decision);
        };

        // ── Fan-in ───────────────────────────────────────────────────────────
        let decisions: Vec<Decision> = applicable
            .iter()
            .zip(joined)
            .map(|(guard, result)| Self::contain(&ctx, guard.name(), result))
            .collect();

        let mut decision = merge(&decisions);
        let mut rollback_on_deny = true;

        // ── Approval handshake ───────────────────────────────────────────────
        if decision.status == DecisionStatus::RequireApproval {
            let request = ApprovalRequest::new((*ctx).clone(), decision.clone(), self.clock.now());
            let outcome = run_handshake(
                self.approval_handler.as_ref(),
                &request,
                self.config.approval_timeout,
                cancel,
                self.clock.as_ref(),
            )
            .await;
            // Cancellation never rewinds committed guard state.
            if outcome == ApprovalOutcome::Cancelled {
                rollback_on_deny = false;
            }
            decision = resolve(decision, &outcome);
        }

        // ── Rollback ─────────────────────────────────────────────────────────
        if decision.status == DecisionStatus::Deny && rollback_on_deny {
            Self::release(&ctx, &applicable);
        }

        if decision.status == DecisionStatus::Deny {
            warn!(
                call_id = %ctx.call_id,
                function = %ctx.function_name,
                agent = ctx.agent(),
                risk = decision.risk_score,
                reasons = %decision.reasons.join("; "),
                "call denied"
            );
        } else {
            info!(
                call_id = %ctx.call_id,
                function = %ctx.function_name,
                agent = ctx.agent(),
                status = %decision.status,
                risk = decision.risk_score,
                "evaluation complete"
            );
        }

        self.run_hooks(&ctx, &decision).await;
        Ok(decision)
    }

    /// Turn one guard task result into a normalized decision.
    fn contain(
        ctx: &CallContext,
        guard: &str,
        result: Result<WardenResult<Decision>, JoinError>,
    ) -> Decision {
        match result {
            Ok(Ok(decision)) => decision.normalized(guard),
            Ok(Err(err)) => {
                error!(call_id = %ctx.call_id, guard, error = %err, "guard failed, denying");
                Self::fail_safe(guard, err.to_string())
            }
            Err(join_err) => {
                error!(call_id = %ctx.call_id, guard, error = %join_err, "guard panicked, denying");
                Self::fail_safe(guard, "guard panicked".to_string())
            }
        }
    }

    fn fail_safe(guard: &str, detail: String) -> Decision {
        Decision::deny(guard, format!("guard error: {guard}"))
            .with_risk(1.0)
            .with_details(json!({ "error": detail }))
            .normalized(guard)
    }

    /// Undo whatever the guards recorded for a call that ended in DENY.
    fn release(ctx: &CallContext, guards: &[Arc<dyn Guard>]) {
        for guard in guards {
            if catch_unwind(AssertUnwindSafe(|| guard.rollback(ctx))).is_err() {
                error!(call_id = %ctx.call_id, guard = guard.name(), "guard rollback panicked");
            }
        }
    }

    fn cancelled() -> Decision {
        let mut decision = Decision::unrestricted();
        decision.status = DecisionStatus::Deny;
        decision.reasons.push(CANCELLED_REASON.to_string());
        decision.risk_score = 1.0;
        decision
    }

    /// Run post-hooks concurrently, waiting at most `hook_timeout`.
    ///
    /// Hooks still running after the deadline keep running detached.
    async fn run_hooks(&self, ctx: &Arc<CallContext>, decision: &Decision) {
        let hooks: Vec<Arc<dyn PostHook>> = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if hooks.is_empty() {
            return;
        }

        let shared = Arc::new(decision.clone());
        let handles: Vec<_> = hooks
            .into_iter()
            .map(|hook| {
                let ctx = Arc::clone(ctx);
                let decision = Arc::clone(&shared);
                tokio::spawn(async move { hook.on_decision(&ctx, &decision).await })
            })
            .collect();

        match tokio::time::timeout(self.config.hook_timeout, join_all(handles)).await {
            Ok(results) => {
                for (index, result) in results.into_iter().enumerate() {
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => warn!(call_id = %ctx.call_id, hook = index, error = %err, "post-hook failed"),
                        Err(join_err) => error!(call_id = %ctx.call_id, hook = index, error = %join_err, "post-hook panicked"),
                    }
                }
            }
            Err(_) => warn!(
                call_id = %ctx.call_id,
                timeout_ms = u64::try_from(self.config.hook_timeout.as_millis()).unwrap_or(u64::MAX),
                "post-hooks still running after deadline"
            ),
        }
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use async_trait::async_trait;
    use chrono::Utc;

    use warden_contracts::{
        approval::ApprovalResponse,
        context::Arguments,
        error::WardenError,
    };

    use super::*;
    use crate::{
        handlers::{AutoApproveHandler, CallbackApprovalHandler},
        traits::HookFn,
    };

    // ── Test guards ──────────────────────────────────────────────────────────

    /// Returns a fixed decision after an optional delay.
    struct Fixed {
        name: &'static str,
        decision: Decision,
        delay: Duration,
        applies: bool,
        rollbacks: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, decision: Decision) -> Self {
            Self { name, decision, delay: Duration::ZERO, applies: true, rollbacks: AtomicUsize::new(0) }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn inapplicable(mut self) -> Self {
            self.applies = false;
            self
        }
    }

    #[async_trait]
    impl Guard for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn should_apply(&self, _ctx: &CallContext) -> bool {
            self.applies
        }

        async fn evaluate(&self, _ctx: &CallContext) -> WardenResult<Decision> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.decision.clone())
        }

        fn rollback(&self, _ctx: &CallContext) {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Failing;

    #[async_trait]
    impl Guard for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn evaluate(&self, _ctx: &CallContext) -> WardenResult<Decision> {
            Err(WardenError::guard("failing", "state store unreachable"))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Guard for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn evaluate(&self, _ctx: &CallContext) -> WardenResult<Decision> {
            panic!("bug in custom guard");
        }
    }

    fn engine() -> PolicyEngine {
        PolicyEngine::with_config(EngineConfig {
            approval_timeout: Duration::from_millis(200),
            hook_timeout: Duration::from_millis(200),
        })
    }

    // ── Basics ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn no_guards_allows() {
        let decision = engine().evaluate(CallContext::new("anything")).await.unwrap();
        assert_eq!(decision.status, DecisionStatus::Allow);
        assert_eq!(decision.risk_score, 0.0);
    }

    #[tokio::test]
    async fn invalid_context_is_the_only_error() {
        let err = engine().evaluate(CallContext::new("")).await.unwrap_err();
        assert!(matches!(err, WardenError::Validation { .. }));
    }

    #[tokio::test]
    async fn inapplicable_guards_contribute_nothing() {
        let engine = engine();
        engine.add_guard(Arc::new(Fixed::new("off", Decision::deny("off", "never")).inapplicable()));
        engine.add_guard(Arc::new(Fixed::new("on", Decision::allow("on"))));

        let decision = engine.evaluate(CallContext::new("f")).await.unwrap();
        assert_eq!(decision.status, DecisionStatus::Allow);
        assert!(decision.all_reasons.is_empty());
    }

    #[tokio::test]
    async fn registry_add_remove_and_replace() {
        let engine = engine();
        engine
            .add_guard(Arc::new(Fixed::new("a", Decision::allow("a"))))
            .add_guard(Arc::new(Fixed::new("b", Decision::allow("b"))));
        assert_eq!(engine.guard_names(), vec!["a", "b"]);

        engine.add_guard(Arc::new(Fixed::new("a", Decision::deny("a", "replaced"))));
        assert_eq!(engine.guard_names(), vec!["a", "b"]);
        let decision = engine.evaluate(CallContext::new("f")).await.unwrap();
        assert_eq!(decision.reasons, vec!["replaced"]);

        assert!(engine.remove_guard("a"));
        assert!(!engine.remove_guard("a"));
        assert!(!engine.has_guard("a"));
        assert!(engine.has_guard("b"));
    }

    // ── Fail-safe ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn guard_error_becomes_deny() {
        let engine = engine();
        engine.add_guard(Arc::new(Fixed::new("ok", Decision::allow("ok"))));
        engine.add_guard(Arc::new(Failing));

        let decision = engine.evaluate(CallContext::new("f")).await.unwrap();
        assert_eq!(decision.status, DecisionStatus::Deny);
        assert_eq!(decision.risk_score, 1.0);
        assert_eq!(decision.reasons, vec!["guard error: failing"]);
        assert_eq!(decision.contributors, vec!["failing"]);
    }

    #[tokio::test]
    async fn guard_panic_becomes_deny() {
        let engine = engine();
        engine.add_guard(Arc::new(Panicking));

        let decision = engine.evaluate(CallContext::new("f")).await.unwrap();
        assert_eq!(decision.status, DecisionStatus::Deny);
        assert_eq!(decision.reasons, vec!["guard error: panicking"]);
    }

    // ── Concurrency ──────────────────────────────────────────────────────────

    /// Latency is bounded by the slowest guard, not the sum.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn guards_run_concurrently() {
        let engine = engine();
        for name in ["g1", "g2", "g3", "g4"] {
            engine.add_guard(Arc::new(Fixed::new(name, Decision::allow(name)).slow(Duration::from_millis(150))));
        }

        let started = std::time::Instant::now();
        let decision = engine.evaluate(CallContext::new("f")).await.unwrap();
        assert_eq!(decision.status, DecisionStatus::Allow);
        assert!(started.elapsed() < Duration::from_millis(450), "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn merge_keeps_registration_order_for_reasons() {
        let engine = engine();
        engine.add_guard(Arc::new(
            Fixed::new("slow", Decision::deny("slow", "first registered")).slow(Duration::from_millis(50)),
        ));
        engine.add_guard(Arc::new(Fixed::new("fast", Decision::deny("fast", "second registered"))));

        let decision = engine.evaluate(CallContext::new("f")).await.unwrap();
        assert_eq!(decision.reasons, vec!["first registered", "second registered"]);
    }

    // ── Approval ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn approval_without_handler_denies() {
        let engine = engine();
        engine.add_guard(Arc::new(Fixed::new("budget", Decision::require_approval("budget", "near limit"))));

        let decision = engine.evaluate(CallContext::new("llm_call")).await.unwrap();
        assert_eq!(decision.status, DecisionStatus::Deny);
        assert_eq!(decision.reasons[0], "near limit");
        assert!(decision.reasons[1].starts_with("approval denied by auto_deny"));
    }

    #[tokio::test]
    async fn approval_granted_allows_and_keeps_reasons() {
        let engine = engine().with_approval_handler(Arc::new(AutoApproveHandler));
        let guard = Arc::new(Fixed::new("budget", Decision::require_approval("budget", "near limit")));
        engine.add_guard(guard.clone());

        let decision = engine.evaluate(CallContext::new("llm_call")).await.unwrap();
        assert_eq!(decision.status, DecisionStatus::Allow);
        assert_eq!(decision.reasons, vec!["near limit", "approved by auto_approve"]);
        assert_eq!(guard.rollbacks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn approval_timeout_follows_handler_default() {
        let handler = CallbackApprovalHandler::new(|_req| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ApprovalResponse::approve("late", Utc::now()))
        });
        let engine = engine().with_approval_handler(Arc::new(handler));
        engine.add_guard(Arc::new(Fixed::new("deletion", Decision::require_approval("deletion", "bulk"))));

        let decision = engine.evaluate(CallContext::new("delete_file")).await.unwrap();
        assert_eq!(decision.status, DecisionStatus::Deny);
        assert!(decision.reasons.last().unwrap().contains("timed out after 200ms"));
    }

    #[tokio::test]
    async fn cancellation_during_approval_denies_without_rollback() {
        let handler = CallbackApprovalHandler::new(|_req| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ApprovalResponse::approve("late", Utc::now()))
        });
        let engine = PolicyEngine::new().with_approval_handler(Arc::new(handler));
        let guard = Arc::new(Fixed::new("purchase", Decision::require_approval("purchase", "large")));
        engine.add_guard(guard.clone());

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let decision = engine
            .evaluate_with_cancel(CallContext::new("buy"), &token)
            .await
            .unwrap();
        assert_eq!(decision.status, DecisionStatus::Deny);
        assert!(decision.reasons.last().unwrap().contains("cancelled"));
        assert_eq!(guard.rollbacks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_during_fan_out_denies() {
        let engine = engine();
        let slow = Arc::new(Fixed::new("slow", Decision::allow("slow")).slow(Duration::from_secs(60)));
        engine.add_guard(slow.clone());

        let token = CancellationToken::new();
        token.cancel();
        let decision = engine.evaluate_with_cancel(CallContext::new("f"), &token).await.unwrap();
        assert_eq!(decision.status, DecisionStatus::Deny);
        assert_eq!(decision.reasons, vec![CANCELLED_REASON]);
        assert_eq!(slow.rollbacks.load(Ordering::SeqCst), 0);
    }

    // ── Rollback ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn final_deny_rolls_back_applicable_guards() {
        let engine = engine();
        let recorder = Arc::new(Fixed::new("recorder", Decision::allow("recorder")));
        let skipped = Arc::new(Fixed::new("skipped", Decision::allow("skipped")).inapplicable());
        engine.add_guard(recorder.clone());
        engine.add_guard(skipped.clone());
        engine.add_guard(Arc::new(Fixed::new("scope", Decision::deny("scope", "blocked"))));

        engine.evaluate(CallContext::new("f")).await.unwrap();
        assert_eq!(recorder.rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(skipped.rollbacks.load(Ordering::SeqCst), 0);
    }

    // ── Modify ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn modify_carries_merged_arguments() {
        let mut redacted = Arguments::new();
        redacted.insert("body".into(), json!("[REDACTED]"));

        let engine = engine();
        engine.add_guard(Arc::new(Fixed::new("sensitive_data", Decision::modify("sensitive_data", "redacted", redacted))));

        let decision = engine.evaluate(CallContext::new("send_email")).await.unwrap();
        assert_eq!(decision.status, DecisionStatus::Modify);
        assert_eq!(decision.modified_arguments.unwrap()["body"], json!("[REDACTED]"));
    }

    // ── Post-hooks ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn hooks_see_final_decision_and_failures_are_swallowed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let engine = engine();
        engine.add_guard(Arc::new(Fixed::new("scope", Decision::deny("scope", "blocked"))));
        engine.add_post_hook(Arc::new(HookFn(|_ctx: &CallContext, _d: &Decision| {
            Err(WardenError::Hook { reason: "disk full".into() })
        })));
        engine.add_post_hook(Arc::new(HookFn(move |ctx: &CallContext, d: &Decision| {
            sink.lock().unwrap().push((ctx.function_name.clone(), d.status));
            Ok(())
        })));

        let decision = engine.evaluate(CallContext::new("drop_table")).await.unwrap();
        assert_eq!(decision.status, DecisionStatus::Deny);
        assert_eq!(*seen.lock().unwrap(), vec![("drop_table".to_string(), DecisionStatus::Deny)]);
    }

    struct Stuck;

    #[async_trait]
    impl PostHook for Stuck {
        async fn on_decision(&self, _ctx: &CallContext, _decision: &Decision) -> WardenResult<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn slow_hook_does_not_hold_the_decision() {
        let engine = engine();
        engine.add_post_hook(Arc::new(Stuck));

        let started = std::time::Instant::now();
        let decision = engine.evaluate(CallContext::new("f")).await.unwrap();
        assert_eq!(decision.status, DecisionStatus::Allow);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
