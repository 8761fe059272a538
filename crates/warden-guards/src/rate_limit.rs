//! Rate-limit guard: stops runaway loops and call floods.
//!
//! State is kept per (agent, session). Checks run in this order, first hit
//! wins:
//!
//! 1. an active cooldown denies everything until it expires
//! 2. the same function with identical arguments at the tail of the history
//!    `max_identical_calls` times (loop detection)
//! 3. calls in the last 60 s, overall and for this function
//! 4. total calls in the session
//! 5. calls inside the burst window, which also starts a cooldown
//!
//! Only calls this guard lets through are recorded. A call later vetoed by
//! another guard was still attempted, so there is no rollback.
//!
//! A session unseen for `session_ttl_seconds` is forgotten, unless it is
//! still cooling down or has calls inside the rate windows.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use warden_contracts::{
    context::{Arguments, CallContext},
    decision::Decision,
    error::{WardenError, WardenResult},
};
use warden_core::{Clock, Guard, SystemClock};

use crate::window::{check_seconds, check_session_ttl, seconds, Sweep, DEFAULT_SESSION_TTL_SECONDS};

pub const NAME: &str = "rate_limit";

/// Recent calls remembered for loop detection.
const HISTORY_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_calls_per_minute: Option<u32>,
    pub max_calls_per_minute_per_function: Option<u32>,
    pub max_calls_per_session: Option<u32>,
    pub max_identical_calls: u32,
    pub burst_window_seconds: f64,
    pub burst_threshold: u32,
    pub cooldown_seconds: f64,
    pub session_ttl_seconds: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls_per_minute: Some(60),
            max_calls_per_minute_per_function: Some(20),
            max_calls_per_session: None,
            max_identical_calls: 3,
            burst_window_seconds: 5.0,
            burst_threshold: 10,
            cooldown_seconds: 30.0,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> WardenResult<()> {
        check_seconds("burst_window_seconds", self.burst_window_seconds)?;
        check_seconds("cooldown_seconds", self.cooldown_seconds)?;
        check_session_ttl(self.session_ttl_seconds)?;
        if self.burst_window_seconds > 86_400.0 || self.cooldown_seconds > 86_400.0 {
            return Err(WardenError::config("rate-limit windows must not exceed one day"));
        }
        if self.max_identical_calls == 0 {
            return Err(WardenError::config("max_identical_calls must be at least 1"));
        }
        if self.burst_threshold == 0 {
            return Err(WardenError::config("burst_threshold must be at least 1"));
        }
        Ok(())
    }

    fn burst_window(&self) -> TimeDelta {
        seconds(self.burst_window_seconds)
    }

    fn cooldown(&self) -> TimeDelta {
        seconds(self.cooldown_seconds)
    }

    /// How far back the per-minute and burst checks look.
    fn retention(&self) -> TimeDelta {
        TimeDelta::minutes(1).max(self.burst_window())
    }
}

/// Canonical form of the arguments used to spot identical calls.
fn fingerprint(arguments: &Arguments) -> String {
    let sorted: BTreeMap<&String, &serde_json::Value> = arguments.iter().collect();
    serde_json::to_string(&sorted).unwrap_or_default()
}

#[derive(Debug, Default)]
struct CallLog {
    calls: VecDeque<(DateTime<Utc>, String)>,
    recent: VecDeque<(String, String)>,
    session_total: u64,
    cooldown_until: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
}

impl CallLog {
    fn is_idle(&self, now: DateTime<Utc>, idle_before: DateTime<Utc>) -> bool {
        !self.last_seen.is_some_and(|seen| seen >= idle_before) && !self.cooldown_until.is_some_and(|until| until > now)
    }

    fn prune(&mut self, cutoff: DateTime<Utc>) {
        while self.calls.front().is_some_and(|(at, _)| *at < cutoff) {
            self.calls.pop_front();
        }
    }

    fn since(&self, cutoff: DateTime<Utc>) -> usize {
        self.calls.iter().rev().take_while(|(at, _)| *at >= cutoff).count()
    }

    fn identical_tail(&self, function: &str, fingerprint: &str) -> usize {
        self.recent
            .iter()
            .rev()
            .take_while(|(f, p)| f == function && p == fingerprint)
            .count()
    }

    fn record(&mut self, now: DateTime<Utc>, function: &str, fingerprint: String) {
        self.calls.push_back((now, function.to_string()));
        if self.recent.len() == HISTORY_LEN {
            self.recent.pop_front();
        }
        self.recent.push_back((function.to_string(), fingerprint));
        self.session_total += 1;
    }
}

#[derive(Debug, Default)]
struct Logs {
    sessions: HashMap<(String, String), CallLog>,
    sweep: Sweep,
}

pub struct RateLimitGuard {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    logs: Mutex<Logs>,
}

impl RateLimitGuard {
    pub fn new(config: RateLimitConfig) -> WardenResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock: Arc::new(SystemClock),
            logs: Mutex::new(Logs::default()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Calls recorded for this agent/session so far.
    pub fn session_calls(&self, agent: &str, session: &str) -> u64 {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sessions
            .get(&(agent.to_string(), session.to_string()))
            .map_or(0, |log| log.session_total)
    }

    /// Sessions currently holding state.
    pub fn tracked_sessions(&self) -> usize {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner).sessions.len()
    }

    pub fn reset(&self) {
        *self.logs.lock().unwrap_or_else(PoisonError::into_inner) = Logs::default();
    }
}

#[async_trait]
impl Guard for RateLimitGuard {
    fn name(&self) -> &str {
        NAME
    }

    async fn evaluate(&self, ctx: &CallContext) -> WardenResult<Decision> {
        let now = self.clock.now();
        let function = ctx.function_name.as_str();
        let fingerprint = fingerprint(&ctx.arguments);
        let key = (ctx.agent().to_string(), ctx.session().to_string());

        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        if logs.sweep.due(now) {
            let idle_before = now - seconds(self.config.session_ttl_seconds).max(self.config.retention());
            let before = logs.sessions.len();
            logs.sessions.retain(|_, log| !log.is_idle(now, idle_before));
            let evicted = before - logs.sessions.len();
            if evicted > 0 {
                debug!(evicted, "idle rate-limit sessions dropped");
            }
        }
        let log = logs.sessions.entry(key).or_default();
        log.last_seen = Some(now);
        log.prune(now - self.config.retention());

        if let Some(until) = log.cooldown_until {
            if now < until {
                let remaining = (until - now).num_milliseconds() as f64 / 1000.0;
                return Ok(Decision::deny(NAME, format!("rate limit cooldown active: {remaining:.1}s remaining"))
                    .with_details(json!({ "cooldown_remaining_secs": remaining })));
            }
            log.cooldown_until = None;
        }

        let identical = log.identical_tail(function, &fingerprint);
        if identical >= self.config.max_identical_calls as usize {
            warn!(call_id = %ctx.call_id, function, identical, "possible agent loop");
            return Ok(Decision::deny(
                NAME,
                format!("possible agent loop: '{function}' called {identical} times in a row with identical arguments"),
            )
            .with_details(json!({ "identical_count": identical })));
        }

        let minute_ago = now - TimeDelta::minutes(1);
        if let Some(limit) = self.config.max_calls_per_minute {
            let count = log.since(minute_ago);
            if count >= limit as usize {
                return Ok(Decision::deny(NAME, format!("rate limit exceeded: {count}/{limit} calls per minute"))
                    .with_details(json!({ "calls_per_minute": count })));
            }
        }

        if let Some(limit) = self.config.max_calls_per_minute_per_function {
            let count = log
                .calls
                .iter()
                .rev()
                .take_while(|(at, _)| *at >= minute_ago)
                .filter(|(_, f)| f == function)
                .count();
            if count >= limit as usize {
                return Ok(Decision::deny(
                    NAME,
                    format!("rate limit exceeded for '{function}': {count}/{limit} calls per minute"),
                )
                .with_details(json!({ "function_calls_per_minute": count })));
            }
        }

        if let Some(limit) = self.config.max_calls_per_session {
            if log.session_total >= u64::from(limit) {
                return Ok(Decision::deny(
                    NAME,
                    format!("session call limit reached: {}/{limit}", log.session_total),
                )
                .with_details(json!({ "session_calls": log.session_total })));
            }
        }

        let burst = log.since(now - self.config.burst_window());
        if burst >= self.config.burst_threshold as usize {
            log.cooldown_until = Some(now + self.config.cooldown());
            warn!(
                call_id = %ctx.call_id,
                agent = ctx.agent(),
                burst,
                cooldown_secs = self.config.cooldown_seconds,
                "call burst detected, cooling down"
            );
            return Ok(Decision::deny(
                NAME,
                format!(
                    "burst detected: {burst} calls in {}s, cooling down for {}s",
                    self.config.burst_window_seconds, self.config.cooldown_seconds
                ),
            )
            .with_details(json!({ "burst_count": burst })));
        }

        log.record(now, function, fingerprint);
        debug!(call_id = %ctx.call_id, session_calls = log.session_total, "rate limit ok");
        Ok(Decision::allow(NAME))
    }
}

impl std::fmt::Debug for RateLimitGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitGuard").field("config", &self.config).finish_non_exhaustive()
    }
}
