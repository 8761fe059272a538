//! Budget guard: caps spend per call, per session, per day, and per month.
//!
//! The session window is keyed by (agent, session). Day and month windows
//! are keyed by agent and reset at UTC calendar boundaries.
//!
//! Spend is recorded optimistically when the guard lets a call through
//! (ALLOW or REQUIRE_APPROVAL) and released again by `rollback` if the
//! engine's final decision is DENY.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use warden_contracts::{
    context::CallContext,
    decision::Decision,
    error::{WardenError, WardenResult},
};
use warden_core::{Clock, Guard, SystemClock};

use crate::{
    as_number,
    window::{check_fraction, check_limit, Calendar, Tally, EPSILON},
};

pub const NAME: &str = "budget";

/// Reservations kept for rollback. Older ones can no longer be released.
const MAX_RESERVATIONS: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_call_cost: Option<f64>,
    pub max_session_spend: Option<f64>,
    pub max_daily_spend: Option<f64>,
    pub max_monthly_spend: Option<f64>,
    /// Fraction of a window limit at which calls need approval.
    pub warn_threshold: f64,
    /// Argument (or metadata) key holding a per-call cost.
    pub cost_field: String,
    /// Fixed cost per function name, used when the call carries none.
    pub cost_estimator: BTreeMap<String, f64>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_call_cost: None,
            max_session_spend: None,
            max_daily_spend: None,
            max_monthly_spend: None,
            warn_threshold: 0.8,
            cost_field: "estimated_cost".to_string(),
            cost_estimator: BTreeMap::new(),
        }
    }
}

impl BudgetConfig {
    pub fn validate(&self) -> WardenResult<()> {
        check_limit("max_call_cost", self.max_call_cost)?;
        check_limit("max_session_spend", self.max_session_spend)?;
        check_limit("max_daily_spend", self.max_daily_spend)?;
        check_limit("max_monthly_spend", self.max_monthly_spend)?;
        check_fraction("warn_threshold", self.warn_threshold)?;
        for (function, cost) in &self.cost_estimator {
            check_limit(&format!("cost_estimator.{function}"), Some(*cost))?;
        }
        Ok(())
    }
}

/// Point-in-time totals for one agent/session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SpendSnapshot {
    pub session: f64,
    pub daily: f64,
    pub monthly: f64,
}

#[derive(Debug)]
struct Reservation {
    call_id: String,
    agent: String,
    session: String,
    cost: f64,
    day: DateTime<Utc>,
    month: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Ledger {
    sessions: HashMap<(String, String), f64>,
    daily: HashMap<String, Tally>,
    monthly: HashMap<String, Tally>,
    reservations: VecDeque<Reservation>,
}

pub struct BudgetGuard {
    config: BudgetConfig,
    clock: Arc<dyn Clock>,
    ledger: Mutex<Ledger>,
}

impl BudgetGuard {
    pub fn new(config: BudgetConfig) -> WardenResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock: Arc::new(SystemClock),
            ledger: Mutex::new(Ledger::default()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Cost of `ctx`: explicit estimate, then the cost field in arguments or
    /// metadata, then the estimator table, else zero.
    fn call_cost(&self, ctx: &CallContext) -> WardenResult<f64> {
        if let Some(cost) = ctx.estimated_cost {
            return Ok(cost);
        }
        let field = ctx
            .arguments
            .get(&self.config.cost_field)
            .or_else(|| ctx.metadata.get(&self.config.cost_field));
        if let Some(value) = field {
            return match as_number(value) {
                Some(cost) if cost.is_finite() && cost >= 0.0 => Ok(cost),
                _ => Err(WardenError::guard(
                    NAME,
                    format!("'{}' is not a non-negative number: {}", self.config.cost_field, value),
                )),
            };
        }
        Ok(self.config.cost_estimator.get(&ctx.function_name).copied().unwrap_or(0.0))
    }

    pub fn spend(&self, agent: &str, session: &str) -> SpendSnapshot {
        let now = self.clock.now();
        let ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        let current = |tallies: &HashMap<String, Tally>, calendar: Calendar| {
            tallies
                .get(agent)
                .filter(|t| t.window_start == Some(calendar.start_of(now)))
                .map_or(0.0, |t| t.amount)
        };
        SpendSnapshot {
            session: ledger
                .sessions
                .get(&(agent.to_string(), session.to_string()))
                .copied()
                .unwrap_or(0.0),
            daily: current(&ledger.daily, Calendar::Day),
            monthly: current(&ledger.monthly, Calendar::Month),
        }
    }

    pub fn reset(&self) {
        *self.ledger.lock().unwrap_or_else(PoisonError::into_inner) = Ledger::default();
    }
}

/// One window's verdict for a projected total.
enum WindowCheck {
    Within,
    Near { reason: String, ratio: f64 },
    Over(String),
}

fn check_window(label: &str, projected: f64, limit: Option<f64>, warn_threshold: f64) -> WindowCheck {
    let Some(limit) = limit else {
        return WindowCheck::Within;
    };
    if projected > limit + EPSILON {
        return WindowCheck::Over(format!(
            "{label} spend ${projected:.4} would exceed limit ${limit:.4}"
        ));
    }
    if limit <= 0.0 {
        return WindowCheck::Within;
    }
    let ratio = projected / limit;
    if ratio + EPSILON >= warn_threshold {
        return WindowCheck::Near {
            reason: format!(
                "{label} spend ${projected:.4} is {:.0}% of limit ${limit:.4}",
                ratio * 100.0
            ),
            ratio,
        };
    }
    WindowCheck::Within
}

#[async_trait]
impl Guard for BudgetGuard {
    fn name(&self) -> &str {
        NAME
    }

    async fn evaluate(&self, ctx: &CallContext) -> WardenResult<Decision> {
        let cost = self.call_cost(ctx)?;

        if let Some(max) = self.config.max_call_cost {
            if cost > max + EPSILON {
                return Ok(Decision::deny(
                    NAME,
                    format!("call cost ${cost:.4} exceeds per-call limit ${max:.4}"),
                )
                .with_details(json!({ "estimated_cost": cost, "max_call_cost": max })));
            }
        }

        let now = self.clock.now();
        let day = Calendar::Day.start_of(now);
        let month = Calendar::Month.start_of(now);
        let agent = ctx.agent().to_string();
        let session_key = (agent.clone(), ctx.session().to_string());

        // Check and record under one lock so concurrent calls cannot both
        // squeeze under the same limit.
        let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);

        let session_total = ledger.sessions.get(&session_key).copied().unwrap_or(0.0) + cost;
        let daily_total = ledger.daily.entry(agent.clone()).or_default().roll(day).amount + cost;
        let monthly_total = ledger.monthly.entry(agent.clone()).or_default().roll(month).amount + cost;

        let details = json!({
            "estimated_cost": cost,
            "session_spend": session_total,
            "daily_spend": daily_total,
            "monthly_spend": monthly_total,
        });

        let checks = [
            check_window("session", session_total, self.config.max_session_spend, self.config.warn_threshold),
            check_window("daily", daily_total, self.config.max_daily_spend, self.config.warn_threshold),
            check_window("monthly", monthly_total, self.config.max_monthly_spend, self.config.warn_threshold),
        ];

        let mut over = Vec::new();
        let mut near = Vec::new();
        let mut worst_ratio: f64 = 0.0;
        for check in checks {
            match check {
                WindowCheck::Within => {}
                WindowCheck::Near { reason, ratio } => {
                    near.push(reason);
                    worst_ratio = worst_ratio.max(ratio);
                }
                WindowCheck::Over(reason) => over.push(reason),
            }
        }

        if !over.is_empty() {
            debug!(call_id = %ctx.call_id, agent = %agent, cost, "budget exceeded");
            return Ok(Decision::deny(NAME, String::new())
                .with_reasons(over)
                .with_reasons(near)
                .with_details(details));
        }

        *ledger.sessions.entry(session_key.clone()).or_insert(0.0) += cost;
        ledger.daily.entry(agent.clone()).or_default().roll(day).add(cost);
        ledger.monthly.entry(agent.clone()).or_default().roll(month).add(cost);
        if ledger.reservations.len() == MAX_RESERVATIONS {
            ledger.reservations.pop_front();
        }
        ledger.reservations.push_back(Reservation {
            call_id: ctx.call_id.clone(),
            agent,
            session: session_key.1,
            cost,
            day,
            month,
        });
        drop(ledger);

        if !near.is_empty() {
            return Ok(Decision::require_approval(NAME, String::new())
                .with_reasons(near)
                .with_risk(worst_ratio.clamp(0.0, 1.0))
                .with_details(details));
        }

        Ok(Decision::allow(NAME)
            .with_reason(format!("budget ok (cost ${cost:.4})"))
            .with_details(details))
    }

    fn rollback(&self, ctx: &CallContext) {
        let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(index) = ledger.reservations.iter().position(|r| r.call_id == ctx.call_id) else {
            return;
        };
        let Some(r) = ledger.reservations.remove(index) else {
            return;
        };
        if let Some(total) = ledger.sessions.get_mut(&(r.agent.clone(), r.session.clone())) {
            *total = (*total - r.cost).max(0.0);
        }
        if let Some(tally) = ledger.daily.get_mut(&r.agent) {
            tally.remove(r.day, r.cost);
        }
        if let Some(tally) = ledger.monthly.get_mut(&r.agent) {
            tally.remove(r.month, r.cost);
        }
        debug!(call_id = %ctx.call_id, cost = r.cost, "budget reservation released");
    }
}

impl std::fmt::Debug for BudgetGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetGuard").field("config", &self.config).finish_non_exhaustive()
    }
}
