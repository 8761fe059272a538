//! Deletion guard: only lets agents delete what they were told they may.
//!
//! Applies to calls whose function name contains one of the configured
//! deletion keywords. Targets are read from `resource_field`, then from the
//! conventional bulk fields, then from the conventional single-target
//! fields.
//!
//! Call-level checks run first (soft-delete mode, cooldown, bulk size,
//! session and daily counts). Each target is then classified:
//! protected → DENY, deny pattern → DENY, allow pattern → ALLOW (or
//! REQUIRE_APPROVAL when `require_approval_always`), anything else →
//! REQUIRE_APPROVAL.
//!
//! Counts for sessions idle longer than `session_ttl_seconds`, daily tallies
//! from past days and cooldown stamps that no longer bind are swept away.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use warden_contracts::{context::CallContext, decision::Decision, error::WardenResult};
use warden_core::{Clock, Guard, SystemClock};

use crate::{
    pattern::PatternSet,
    window::{check_seconds, check_session_ttl, seconds, Calendar, Sweep, Tally, DEFAULT_SESSION_TTL_SECONDS},
};

pub const NAME: &str = "deletion";

const BULK_FIELDS: [&str; 4] = ["resource_ids", "ids", "items", "targets"];
const SINGLE_FIELDS: [&str; 8] = ["id", "name", "path", "file", "document_id", "email_id", "record_id", "resource"];
const HARD_DELETE_MARKERS: [&str; 5] = ["hard", "permanent", "purge", "wipe", "destroy"];
const MAX_RESERVATIONS: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletionConfig {
    pub allow_patterns: Vec<String>,
    pub deny_patterns: Vec<String>,
    /// Exact resource ids that can never be deleted.
    pub protected_resources: Vec<String>,
    pub require_approval_always: bool,
    pub max_deletions_per_session: Option<u32>,
    pub max_deletions_per_day: Option<u32>,
    pub max_bulk_delete: Option<u32>,
    pub resource_field: String,
    pub soft_delete_only: bool,
    /// Keywords; a function whose lowercased name contains one is a deletion.
    pub deletion_functions: Vec<String>,
    /// Minimum seconds between deletions by the same agent.
    pub cooldown_seconds: f64,
    pub session_ttl_seconds: f64,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            allow_patterns: Vec::new(),
            deny_patterns: Vec::new(),
            protected_resources: Vec::new(),
            require_approval_always: false,
            max_deletions_per_session: None,
            max_deletions_per_day: None,
            max_bulk_delete: Some(10),
            resource_field: "resource_id".to_string(),
            soft_delete_only: false,
            deletion_functions: ["delete", "remove", "drop", "destroy", "purge", "erase", "trash", "wipe", "clear", "truncate"]
                .map(String::from)
                .to_vec(),
            cooldown_seconds: 0.0,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }
}

/// How a single target resource is classified.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Allowed,
    NeedsApproval(String),
    Denied(String),
}

#[derive(Debug)]
struct Reservation {
    call_id: String,
    agent: String,
    session: String,
    items: u64,
    day: DateTime<Utc>,
    previous_last: Option<DateTime<Utc>>,
    at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct SessionCount {
    deleted: u64,
    last_seen: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct History {
    sessions: HashMap<(String, String), SessionCount>,
    daily: HashMap<String, Tally>,
    last_deletion: HashMap<String, DateTime<Utc>>,
    reservations: VecDeque<Reservation>,
    sweep: Sweep,
}

impl History {
    fn evict_idle(&mut self, now: DateTime<Utc>, day: DateTime<Utc>, config: &DeletionConfig) {
        let idle_before = now - seconds(config.session_ttl_seconds);
        let before = self.sessions.len() + self.daily.len() + self.last_deletion.len();
        self.sessions.retain(|_, count| count.last_seen >= idle_before);
        self.daily.retain(|_, tally| tally.window_start == Some(day));
        self.last_deletion
            .retain(|_, at| ((now - *at).num_milliseconds() as f64 / 1000.0) < config.cooldown_seconds);
        let evicted = before - (self.sessions.len() + self.daily.len() + self.last_deletion.len());
        if evicted > 0 {
            debug!(evicted, "idle deletion history dropped");
        }
    }
}

pub struct DeletionGuard {
    config: DeletionConfig,
    allow: PatternSet,
    deny: PatternSet,
    protected: HashSet<String>,
    keywords: Vec<String>,
    clock: Arc<dyn Clock>,
    history: Mutex<History>,
}

impl DeletionGuard {
    pub fn new(config: DeletionConfig) -> WardenResult<Self> {
        check_seconds("cooldown_seconds", config.cooldown_seconds)?;
        check_session_ttl(config.session_ttl_seconds)?;
        let allow = PatternSet::compile("allow_patterns", &config.allow_patterns)?;
        let deny = PatternSet::compile("deny_patterns", &config.deny_patterns)?;
        let protected = config.protected_resources.iter().cloned().collect();
        let keywords = config.deletion_functions.iter().map(|k| k.to_lowercase()).collect();
        Ok(Self {
            config,
            allow,
            deny,
            protected,
            keywords,
            clock: Arc::new(SystemClock),
            history: Mutex::new(History::default()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &DeletionConfig {
        &self.config
    }

    /// Targets named by the call, in argument order.
    fn targets(&self, ctx: &CallContext) -> Vec<String> {
        let mut ids = Vec::new();
        if let Some(value) = ctx.arguments.get(&self.config.resource_field) {
            push_ids(value, &mut ids);
        }
        for field in BULK_FIELDS {
            if let Some(Value::Array(items)) = ctx.arguments.get(field) {
                ids.extend(items.iter().map(render));
            }
        }
        if ids.is_empty() {
            if let Some(value) = SINGLE_FIELDS.iter().find_map(|f| ctx.arguments.get(*f)) {
                push_ids(value, &mut ids);
            }
        }
        ids
    }

    fn is_hard_delete(ctx: &CallContext) -> bool {
        let function = ctx.function_name.to_lowercase();
        HARD_DELETE_MARKERS.iter().any(|m| function.contains(m))
            || ["permanent", "hard_delete"]
                .iter()
                .any(|flag| ctx.arguments.get(*flag).is_some_and(is_truthy))
    }

    fn classify(&self, id: &str) -> Target {
        if self.protected.contains(id) {
            return Target::Denied(format!("resource '{id}' is protected and cannot be deleted"));
        }
        if let Some(pattern) = self.deny.first_match(id) {
            return Target::Denied(format!("resource '{id}' matches deny pattern '{pattern}'"));
        }
        if self.allow.is_match(id) {
            if self.config.require_approval_always {
                return Target::NeedsApproval(format!("deleting '{id}' requires approval"));
            }
            return Target::Allowed;
        }
        Target::NeedsApproval(format!("resource '{id}' matches no allow pattern; deletion requires approval"))
    }

    /// Deletions recorded today for `agent`.
    pub fn deletions_today(&self, agent: &str) -> u64 {
        let day = Calendar::Day.start_of(self.clock.now());
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .daily
            .get(agent)
            .filter(|t| t.window_start == Some(day))
            .map_or(0, |t| t.amount as u64)
    }

    /// Deletions recorded in this agent/session.
    pub fn session_deletions(&self, agent: &str, session: &str) -> u64 {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sessions
            .get(&(agent.to_string(), session.to_string()))
            .map_or(0, |count| count.deleted)
    }

    /// Sessions currently holding a deletion count.
    pub fn tracked_sessions(&self) -> usize {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).sessions.len()
    }

    pub fn reset(&self) {
        *self.history.lock().unwrap_or_else(PoisonError::into_inner) = History::default();
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn push_ids(value: &Value, ids: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::Array(items) => ids.extend(items.iter().map(render)),
        other => ids.push(render(other)),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

#[async_trait]
impl Guard for DeletionGuard {
    fn name(&self) -> &str {
        NAME
    }

    fn should_apply(&self, ctx: &CallContext) -> bool {
        let function = ctx.function_name.to_lowercase();
        self.keywords.iter().any(|k| function.contains(k.as_str()))
    }

    async fn evaluate(&self, ctx: &CallContext) -> WardenResult<Decision> {
        let ids = self.targets(ctx);
        let items = ids.len() as u64;
        let details = json!({ "function": ctx.function_name, "resource_ids": &ids });

        if self.config.soft_delete_only && Self::is_hard_delete(ctx) {
            return Ok(Decision::deny(NAME, "hard delete requested but only soft deletes are allowed")
                .with_details(details));
        }

        let now = self.clock.now();
        let day = Calendar::Day.start_of(now);
        let agent = ctx.agent().to_string();
        let session_key = (agent.clone(), ctx.session().to_string());

        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.sweep.due(now) {
            history.evict_idle(now, day, &self.config);
        }

        if self.config.cooldown_seconds > 0.0 {
            if let Some(last) = history.last_deletion.get(&agent) {
                let elapsed = (now - *last).num_milliseconds() as f64 / 1000.0;
                if elapsed < self.config.cooldown_seconds {
                    let remaining = self.config.cooldown_seconds - elapsed;
                    return Ok(Decision::deny(NAME, format!("deletion cooldown active: {remaining:.1}s remaining"))
                        .with_details(details));
                }
            }
        }

        if let Some(max) = self.config.max_bulk_delete {
            if items > u64::from(max) {
                return Ok(Decision::deny(
                    NAME,
                    format!("bulk delete of {items} items exceeds limit of {max}"),
                )
                .with_details(details));
            }
        }

        if let Some(max) = self.config.max_deletions_per_session {
            let projected = history.sessions.get(&session_key).map_or(0, |count| count.deleted) + items;
            if projected > u64::from(max) {
                return Ok(Decision::deny(
                    NAME,
                    format!("session deletion count {projected} would exceed limit {max}"),
                )
                .with_details(details));
            }
        }

        if let Some(max) = self.config.max_deletions_per_day {
            let projected = history.daily.entry(agent.clone()).or_default().roll(day).amount as u64 + items;
            if projected > u64::from(max) {
                return Ok(Decision::deny(
                    NAME,
                    format!("daily deletion count {projected} would exceed limit {max}"),
                )
                .with_details(details));
            }
        }

        if ids.is_empty() {
            return Ok(Decision::require_approval(NAME, "cannot identify the resource being deleted")
                .with_risk(0.9)
                .with_details(details));
        }

        let mut approvals = Vec::new();
        for id in &ids {
            match self.classify(id) {
                Target::Denied(reason) => {
                    return Ok(Decision::deny(NAME, reason).with_details(details));
                }
                Target::NeedsApproval(reason) => approvals.push(reason),
                Target::Allowed => {}
            }
        }

        let previous_last = history.last_deletion.insert(agent.clone(), now);
        let count = history
            .sessions
            .entry(session_key.clone())
            .or_insert(SessionCount { deleted: 0, last_seen: now });
        count.deleted += items;
        count.last_seen = now;
        let tally = history.daily.entry(agent.clone()).or_default().roll(day);
        tally.amount += items as f64;
        tally.count += 1;
        if history.reservations.len() == MAX_RESERVATIONS {
            history.reservations.pop_front();
        }
        history.reservations.push_back(Reservation {
            call_id: ctx.call_id.clone(),
            agent,
            session: session_key.1,
            items,
            day,
            previous_last,
            at: now,
        });
        drop(history);

        if !approvals.is_empty() {
            return Ok(Decision::require_approval(NAME, String::new())
                .with_reasons(approvals)
                .with_risk(0.6)
                .with_details(details));
        }

        debug!(call_id = %ctx.call_id, items, "deletion permitted");
        Ok(Decision::allow(NAME)
            .with_reason(format!("deletion of {items} resource(s) permitted"))
            .with_details(details))
    }

    fn rollback(&self, ctx: &CallContext) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(index) = history.reservations.iter().position(|r| r.call_id == ctx.call_id) else {
            return;
        };
        let Some(r) = history.reservations.remove(index) else {
            return;
        };
        if let Some(count) = history.sessions.get_mut(&(r.agent.clone(), r.session.clone())) {
            count.deleted = count.deleted.saturating_sub(r.items);
        }
        if let Some(tally) = history.daily.get_mut(&r.agent) {
            tally.remove(r.day, r.items as f64);
        }
        if history.last_deletion.get(&r.agent) == Some(&r.at) {
            match r.previous_last {
                Some(previous) => history.last_deletion.insert(r.agent.clone(), previous),
                None => history.last_deletion.remove(&r.agent),
            };
        }
        debug!(call_id = %ctx.call_id, items = r.items, "deletion reservation released");
    }
}

impl std::fmt::Debug for DeletionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionGuard").field("config", &self.config).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use warden_contracts::decision::DecisionStatus;
    use warden_core::ManualClock;

    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn guard(config: DeletionConfig) -> (DeletionGuard, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 14, 10, 0, 0).unwrap());
        let guard = DeletionGuard::new(config).unwrap().with_clock(Arc::new(clock.clone()));
        (guard, clock)
    }

    fn delete(id: &str) -> CallContext {
        CallContext::new("delete_email").with_argument("email_id", id)
    }

    #[tokio::test]
    async fn protected_resource_is_denied_without_deny_patterns() {
        let (guard, _) = guard(DeletionConfig {
            protected_resources: strings(&["inbox"]),
            allow_patterns: strings(&["temp_*"]),
            ..Default::default()
        });
        let decision = guard.evaluate(&delete("inbox")).await.unwrap();
        assert_eq!(decision.status, DecisionStatus::Deny);
        assert!(decision.reasons[0].contains("protected"));
    }

    #[tokio::test]
    async fn classification_precedence() {
        let (guard, _) = guard(DeletionConfig {
            allow_patterns: strings(&["temp_*"]),
            deny_patterns: strings(&["*_backup"]),
            ..Default::default()
        });

        assert_eq!(guard.evaluate(&delete("temp_1")).await.unwrap().status, DecisionStatus::Allow);
        // Deny pattern beats allow pattern.
        assert_eq!(guard.evaluate(&delete("temp_backup")).await.unwrap().status, DecisionStatus::Deny);
        // Unclassified resources need a human.
        assert_eq!(
            guard.evaluate(&delete("q3-report")).await.unwrap().status,
            DecisionStatus::RequireApproval
        );
    }

    #[tokio::test]
    async fn require_approval_always_gates_allowed_resources() {
        let (guard, _) = guard(DeletionConfig {
            allow_patterns: strings(&["*"]),
            require_approval_always: true,
            ..Default::default()
        });
        assert_eq!(guard.evaluate(&delete("temp_1")).await.unwrap().status, DecisionStatus::RequireApproval);
    }

    #[tokio::test]
    async fn bulk_limit_and_target_extraction() {
        let (guard, _) = guard(DeletionConfig {
            allow_patterns: strings(&["*"]),
            max_bulk_delete: Some(2),
            ..Default::default()
        });
        let bulk = CallContext::new("bulk_delete").with_argument("ids", json!(["a", "b", "c"]));
        assert_eq!(guard.targets(&bulk), strings(&["a", "b", "c"]));
        let decision = guard.evaluate(&bulk).await.unwrap();
        assert_eq!(decision.status, DecisionStatus::Deny);
        assert!(decision.reasons[0].contains("3 items"));

        let custom = CallContext::new("remove_row").with_argument("resource_id", 42).with_argument("name", "ignored");
        assert_eq!(guard.targets(&custom), strings(&["42"]));
    }

    #[tokio::test]
    async fn unidentifiable_target_needs_approval() {
        let (guard, _) = guard(DeletionConfig::default());
        let decision = guard.evaluate(&CallContext::new("delete_everything")).await.unwrap();
        assert_eq!(decision.status, DecisionStatus::RequireApproval);
        assert_eq!(decision.risk_score, 0.9);
    }

    #[tokio::test]
    async fn soft_delete_only_rejects_hard_deletes() {
        let (guard, _) = guard(DeletionConfig {
            allow_patterns: strings(&["*"]),
            soft_delete_only: true,
            ..Default::default()
        });
        assert_eq!(
            guard.evaluate(&CallContext::new("purge_file").with_argument("path", "x")).await.unwrap().status,
            DecisionStatus::Deny
        );
        assert_eq!(
            guard.evaluate(&delete("x").with_argument("permanent", true)).await.unwrap().status,
            DecisionStatus::Deny
        );
        assert_eq!(guard.evaluate(&delete("x")).await.unwrap().status, DecisionStatus::Allow);
    }

    #[tokio::test]
    async fn daily_limit_and_cooldown() {
        let (guard, clock) = guard(DeletionConfig {
            allow_patterns: strings(&["*"]),
            max_deletions_per_day: Some(2),
            cooldown_seconds: 10.0,
            ..Default::default()
        });

        assert_eq!(guard.evaluate(&delete("a")).await.unwrap().status, DecisionStatus::Allow);
        let cooling = guard.evaluate(&delete("b")).await.unwrap();
        assert!(cooling.reasons[0].contains("cooldown"));

        clock.advance(TimeDelta::seconds(11));
        assert_eq!(guard.evaluate(&delete("b")).await.unwrap().status, DecisionStatus::Allow);
        clock.advance(TimeDelta::seconds(11));
        let over = guard.evaluate(&delete("c")).await.unwrap();
        assert!(over.reasons[0].contains("daily deletion count 3"));
        assert_eq!(guard.deletions_today("default"), 2);
    }

    #[tokio::test]
    async fn rollback_restores_counts_and_cooldown() {
        let (guard, _) = guard(DeletionConfig {
            allow_patterns: strings(&["*"]),
            cooldown_seconds: 60.0,
            ..Default::default()
        });
        let ctx = delete("a");
        guard.evaluate(&ctx).await.unwrap();
        assert_eq!(guard.deletions_today("default"), 1);

        guard.rollback(&ctx);
        assert_eq!(guard.deletions_today("default"), 0);
        assert_eq!(guard.evaluate(&delete("b")).await.unwrap().status, DecisionStatus::Allow);
    }

    // ── Idle history ──

    #[tokio::test]
    async fn idle_sessions_and_past_days_are_swept() {
        let (guard, clock) = guard(DeletionConfig {
            allow_patterns: strings(&["*"]),
            max_deletions_per_session: Some(5),
            cooldown_seconds: 30.0,
            session_ttl_seconds: 3_600.0,
            ..Default::default()
        });
        for n in 0..20 {
            let ctx = delete(&format!("m{n}")).with_agent(format!("agent{n}")).with_session(format!("s{n}"));
            assert_eq!(guard.evaluate(&ctx).await.unwrap().status, DecisionStatus::Allow);
        }
        assert_eq!(guard.tracked_sessions(), 20);

        clock.advance(TimeDelta::minutes(30));
        let active = delete("x").with_agent("agent0").with_session("s0");
        assert_eq!(guard.evaluate(&active).await.unwrap().status, DecisionStatus::Allow);

        clock.advance(TimeDelta::minutes(31));
        let late = delete("y").with_agent("late").with_session("new");
        assert_eq!(guard.evaluate(&late).await.unwrap().status, DecisionStatus::Allow);
        assert_eq!(guard.tracked_sessions(), 2);
        assert_eq!(guard.session_deletions("agent0", "s0"), 2);
        assert_eq!(guard.session_deletions("agent1", "s1"), 0);

        let history = guard.history.lock().unwrap();
        assert_eq!(history.last_deletion.len(), 1);
        assert_eq!(history.daily.len(), 20 + 1);
        drop(history);

        // Past days go on the next sweep after midnight.
        clock.advance(TimeDelta::days(1));
        let tomorrow = delete("z").with_agent("late").with_session("new");
        assert_eq!(guard.evaluate(&tomorrow).await.unwrap().status, DecisionStatus::Allow);
        assert_eq!(guard.history.lock().unwrap().daily.len(), 1);
    }

    #[tokio::test]
    async fn rollback_after_eviction_is_harmless() {
        let (guard, clock) = guard(DeletionConfig {
            allow_patterns: strings(&["*"]),
            session_ttl_seconds: 60.0,
            ..Default::default()
        });
        let ctx = delete("a").with_session("old");
        guard.evaluate(&ctx).await.unwrap();
        clock.advance(TimeDelta::minutes(2));
        guard.evaluate(&delete("b").with_session("new")).await.unwrap();
        assert_eq!(guard.session_deletions("default", "old"), 0);

        guard.rollback(&ctx);
        assert_eq!(guard.session_deletions("default", "new"), 1);
        assert_eq!(guard.deletions_today("default"), 1);
    }

    #[test]
    fn should_apply_matches_keywords() {
        let guard = DeletionGuard::new(DeletionConfig::default()).unwrap();
        assert!(guard.should_apply(&CallContext::new("Delete_Email")));
        assert!(guard.should_apply(&CallContext::new("trash_message")));
        assert!(!guard.should_apply(&CallContext::new("send_email")));
    }

    #[test]
    fn bad_glob_fails_construction() {
        let config = DeletionConfig { deny_patterns: strings(&["[oops"]), ..Default::default() };
        assert!(DeletionGuard::new(config).is_err());
    }
}
