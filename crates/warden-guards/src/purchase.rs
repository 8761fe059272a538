//! Purchase guard: transaction caps, daily totals, and category rules.
//!
//! Applies to calls whose function name contains a purchase keyword. Daily
//! totals are kept per agent and reset at UTC midnight; a purchase is
//! recorded when the guard lets it through and released by `rollback`.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use warden_contracts::{
    context::CallContext,
    decision::Decision,
    error::{WardenError, WardenResult},
};
use warden_core::{Clock, Guard, SystemClock};

use crate::{
    as_number,
    window::{check_limit, Calendar, Tally, EPSILON},
};

pub const NAME: &str = "purchase";

const AMOUNT_FALLBACKS: [&str; 4] = ["price", "total", "cost", "value"];
const MAX_RESERVATIONS: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurchaseConfig {
    pub max_single_purchase: Option<f64>,
    pub max_daily_purchases: Option<f64>,
    pub max_purchase_count_per_day: Option<u32>,
    pub require_approval_above: Option<f64>,
    /// Substrings; a category containing one is refused.
    pub blocked_categories: Vec<String>,
    /// When non-empty, a category must contain one of these.
    pub allowed_categories: Vec<String>,
    pub amount_field: String,
    pub category_field: String,
    pub currency: String,
    pub purchase_functions: Vec<String>,
}

impl Default for PurchaseConfig {
    fn default() -> Self {
        Self {
            max_single_purchase: None,
            max_daily_purchases: None,
            max_purchase_count_per_day: None,
            require_approval_above: None,
            blocked_categories: Vec::new(),
            allowed_categories: Vec::new(),
            amount_field: "amount".to_string(),
            category_field: "category".to_string(),
            currency: "USD".to_string(),
            purchase_functions: [
                "purchase", "buy", "order", "checkout", "make_payment", "place_order", "subscribe", "pay",
                "transfer_funds",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

impl PurchaseConfig {
    pub fn validate(&self) -> WardenResult<()> {
        check_limit("max_single_purchase", self.max_single_purchase)?;
        check_limit("max_daily_purchases", self.max_daily_purchases)?;
        check_limit("require_approval_above", self.require_approval_above)?;
        Ok(())
    }
}

#[derive(Debug)]
struct Reservation {
    call_id: String,
    agent: String,
    amount: f64,
    day: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Purchases {
    daily: HashMap<String, Tally>,
    reservations: VecDeque<Reservation>,
}

pub struct PurchaseGuard {
    config: PurchaseConfig,
    blocked: Vec<String>,
    allowed: Vec<String>,
    keywords: Vec<String>,
    clock: Arc<dyn Clock>,
    purchases: Mutex<Purchases>,
}

impl PurchaseGuard {
    pub fn new(config: PurchaseConfig) -> WardenResult<Self> {
        config.validate()?;
        let lower = |items: &[String]| items.iter().map(|s| s.to_lowercase()).collect::<Vec<_>>();
        Ok(Self {
            blocked: lower(&config.blocked_categories),
            allowed: lower(&config.allowed_categories),
            keywords: lower(&config.purchase_functions),
            config,
            clock: Arc::new(SystemClock),
            purchases: Mutex::new(Purchases::default()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PurchaseConfig {
        &self.config
    }

    /// Amount of the purchase, or `None` when the call does not say.
    fn amount(&self, ctx: &CallContext) -> WardenResult<Option<f64>> {
        let value = std::iter::once(self.config.amount_field.as_str())
            .chain(AMOUNT_FALLBACKS)
            .find_map(|field| ctx.arguments.get(field).filter(|v| !v.is_null()));
        let Some(value) = value else {
            return Ok(None);
        };
        match as_number(value) {
            Some(amount) if amount.is_finite() && amount >= 0.0 => Ok(Some(amount)),
            Some(amount) => Err(WardenError::guard(NAME, format!("purchase amount {amount} is not valid"))),
            None => Ok(None),
        }
    }

    fn category(&self, ctx: &CallContext) -> Option<String> {
        let render = |v: &Value| match v {
            Value::String(s) => s.to_lowercase(),
            other => other.to_string().to_lowercase(),
        };
        if let Some(value) = ctx.arguments.get(&self.config.category_field).filter(|v| !v.is_null()) {
            return Some(render(value));
        }
        ctx.arguments
            .get("item")
            .and_then(|item| item.get("category"))
            .map(render)
            .filter(|c| !c.is_empty())
    }

    /// (total amount, purchase count) recorded today for `agent`.
    pub fn today(&self, agent: &str) -> (f64, u64) {
        let day = Calendar::Day.start_of(self.clock.now());
        self.purchases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .daily
            .get(agent)
            .filter(|t| t.window_start == Some(day))
            .map_or((0.0, 0), |t| (t.amount, t.count))
    }

    pub fn reset(&self) {
        *self.purchases.lock().unwrap_or_else(PoisonError::into_inner) = Purchases::default();
    }
}

#[async_trait]
impl Guard for PurchaseGuard {
    fn name(&self) -> &str {
        NAME
    }

    fn should_apply(&self, ctx: &CallContext) -> bool {
        let function = ctx.function_name.to_lowercase();
        self.keywords.iter().any(|k| function.contains(k.as_str()))
    }

    async fn evaluate(&self, ctx: &CallContext) -> WardenResult<Decision> {
        let amount = self.amount(ctx)?;
        let category = self.category(ctx);
        let details = json!({
            "function": ctx.function_name,
            "amount": amount,
            "category": category,
            "currency": self.config.currency,
        });

        // Category rules hold whatever the amount, known or not.
        if let Some(category) = &category {
            if let Some(blocked) = self.blocked.iter().find(|b| category.contains(b.as_str())) {
                return Ok(Decision::deny(
                    NAME,
                    format!("purchase category '{category}' is blocked ('{blocked}')"),
                )
                .with_details(details));
            }
            if !self.allowed.is_empty() && !self.allowed.iter().any(|a| category.contains(a.as_str())) {
                return Ok(Decision::deny(NAME, format!("purchase category '{category}' is not in the allowed list"))
                    .with_details(details));
            }
        }

        let Some(amount) = amount else {
            return Ok(Decision::require_approval(NAME, "cannot determine purchase amount")
                .with_risk(0.8)
                .with_details(details));
        };

        if let Some(max) = self.config.max_single_purchase {
            if amount > max + EPSILON {
                return Ok(Decision::deny(
                    NAME,
                    format!("purchase {amount:.2} exceeds single-purchase limit {max:.2}"),
                )
                .with_details(details));
            }
        }

        let now = self.clock.now();
        let day = Calendar::Day.start_of(now);
        let agent = ctx.agent().to_string();

        let mut purchases = self.purchases.lock().unwrap_or_else(PoisonError::into_inner);
        let today = *purchases.daily.entry(agent.clone()).or_default().roll(day);

        if let Some(max) = self.config.max_purchase_count_per_day {
            if today.count >= u64::from(max) {
                return Ok(Decision::deny(
                    NAME,
                    format!("daily purchase count {} has reached limit {max}", today.count),
                )
                .with_details(details));
            }
        }

        if let Some(max) = self.config.max_daily_purchases {
            let projected = today.amount + amount;
            if projected > max + EPSILON {
                return Ok(Decision::deny(
                    NAME,
                    format!("daily purchase total {projected:.2} would exceed limit {max:.2}"),
                )
                .with_details(details));
            }
        }

        purchases.daily.entry(agent.clone()).or_default().roll(day).add(amount);
        if purchases.reservations.len() == MAX_RESERVATIONS {
            purchases.reservations.pop_front();
        }
        purchases.reservations.push_back(Reservation { call_id: ctx.call_id.clone(), agent, amount, day });
        drop(purchases);

        if let Some(threshold) = self.config.require_approval_above {
            if amount > threshold + EPSILON {
                let scale = self.config.max_single_purchase.unwrap_or(amount * 2.0);
                let risk = if scale > 0.0 { (amount / scale).min(1.0) } else { 1.0 };
                return Ok(Decision::require_approval(
                    NAME,
                    format!("purchase {amount:.2} is above approval threshold {threshold:.2}"),
                )
                .with_risk(risk)
                .with_details(details));
            }
        }

        debug!(call_id = %ctx.call_id, amount, "purchase permitted");
        Ok(Decision::allow(NAME)
            .with_reason(format!("purchase {amount:.2} {} permitted", self.config.currency))
            .with_details(details))
    }

    fn rollback(&self, ctx: &CallContext) {
        let mut purchases = self.purchases.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(index) = purchases.reservations.iter().position(|r| r.call_id == ctx.call_id) else {
            return;
        };
        if let Some(r) = purchases.reservations.remove(index) {
            if let Some(tally) = purchases.daily.get_mut(&r.agent) {
                tally.remove(r.day, r.amount);
            }
            debug!(call_id = %ctx.call_id, amount = r.amount, "purchase reservation released");
        }
    }
}

impl std::fmt::Debug for PurchaseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurchaseGuard").field("config", &self.config).finish_non_exhaustive()
    }
}
