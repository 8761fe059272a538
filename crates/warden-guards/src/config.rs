//! TOML configuration for a complete engine.
//!
//! ```toml
//! [engine]
//! approval_timeout_secs = 120
//! hook_timeout_ms = 250
//!
//! [budget]
//! max_daily_spend = 10.0
//! warn_threshold = 0.9
//!
//! [deletion]
//! enabled = false
//! ```
//!
//! Every guard table is optional; a missing table means that guard is not
//! installed. Inside a table, `enabled` defaults to true and every other key
//! takes the guard's own default. A key the guard does not know fails the
//! load, so a misspelled limit can never silently disable that limit.

use std::{path::Path, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::info;

use warden_contracts::error::{WardenError, WardenResult};
use warden_core::{Clock, EngineConfig, Guard, PolicyEngine, SystemClock};

use crate::{
    budget::{BudgetConfig, BudgetGuard},
    deletion::{DeletionConfig, DeletionGuard},
    purchase::{PurchaseConfig, PurchaseGuard},
    rate_limit::{RateLimitConfig, RateLimitGuard},
    scope::{ScopeConfig, ScopeGuard},
    sensitive_data::{SensitiveDataConfig, SensitiveDataGuard},
};

fn enabled() -> bool {
    true
}

/// One guard's table: an `enabled` switch plus the guard's own settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardSection<T> {
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub settings: T,
    /// Whatever `settings` did not claim.
    #[serde(flatten)]
    unknown: toml::Table,
}

impl<T> GuardSection<T> {
    pub fn new(settings: T) -> Self {
        Self { enabled: true, settings, unknown: toml::Table::new() }
    }

    fn check_keys(&self, table: &str) -> WardenResult<()> {
        if self.unknown.is_empty() {
            return Ok(());
        }
        let keys: Vec<&str> = self.unknown.keys().map(String::as_str).collect();
        Err(WardenError::config(format!("unknown key(s) in [{table}]: {}", keys.join(", "))))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    pub approval_timeout_secs: f64,
    pub hook_timeout_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            approval_timeout_secs: defaults.approval_timeout.as_secs_f64(),
            hook_timeout_ms: defaults.hook_timeout.as_millis() as u64,
        }
    }
}

impl EngineSection {
    pub fn to_engine_config(&self) -> WardenResult<EngineConfig> {
        let approval_timeout = Duration::try_from_secs_f64(self.approval_timeout_secs).map_err(|e| {
            WardenError::config(format!(
                "engine.approval_timeout_secs: invalid duration {}: {e}",
                self.approval_timeout_secs
            ))
        })?;
        Ok(EngineConfig { approval_timeout, hook_timeout: Duration::from_millis(self.hook_timeout_ms) })
    }
}

/// Full engine configuration as loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardsConfig {
    pub engine: EngineSection,
    pub scope: Option<GuardSection<ScopeConfig>>,
    pub sensitive_data: Option<GuardSection<SensitiveDataConfig>>,
    pub rate_limit: Option<GuardSection<RateLimitConfig>>,
    pub budget: Option<GuardSection<BudgetConfig>>,
    pub purchase: Option<GuardSection<PurchaseConfig>>,
    pub deletion: Option<GuardSection<DeletionConfig>>,
}

/// Settings of an enabled section, `None` if absent or disabled.
fn active<T>(section: &Option<GuardSection<T>>) -> Option<&T> {
    section.as_ref().filter(|s| s.enabled).map(|s| &s.settings)
}

impl GuardsConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `WardenError::Config` if the TOML is malformed or has a
    /// table or key no guard recognizes.
    pub fn from_toml_str(s: &str) -> WardenResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| WardenError::config(format!("failed to parse guard TOML: {e}")))?;
        config.check_keys()?;
        Ok(config)
    }

    fn check_keys(&self) -> WardenResult<()> {
        fn check<T>(table: &str, section: &Option<GuardSection<T>>) -> WardenResult<()> {
            section.as_ref().map_or(Ok(()), |s| s.check_keys(table))
        }
        check("scope", &self.scope)?;
        check("sensitive_data", &self.sensitive_data)?;
        check("rate_limit", &self.rate_limit)?;
        check("budget", &self.budget)?;
        check("purchase", &self.purchase)?;
        check("deletion", &self.deletion)
    }

    pub fn from_file(path: &Path) -> WardenResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            WardenError::config(format!("failed to read guard config '{}': {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Construct every enabled guard, in a fixed order: scope, sensitive
    /// data, rate limit, budget, purchase, deletion.
    pub fn build_guards(&self, clock: Arc<dyn Clock>) -> WardenResult<Vec<Arc<dyn Guard>>> {
        let mut guards: Vec<Arc<dyn Guard>> = Vec::new();
        if let Some(settings) = active(&self.scope) {
            guards.push(Arc::new(ScopeGuard::new(settings.clone())?));
        }
        if let Some(settings) = active(&self.sensitive_data) {
            guards.push(Arc::new(SensitiveDataGuard::new(settings.clone())?));
        }
        if let Some(settings) = active(&self.rate_limit) {
            guards.push(Arc::new(RateLimitGuard::new(settings.clone())?.with_clock(Arc::clone(&clock))));
        }
        if let Some(settings) = active(&self.budget) {
            guards.push(Arc::new(BudgetGuard::new(settings.clone())?.with_clock(Arc::clone(&clock))));
        }
        if let Some(settings) = active(&self.purchase) {
            guards.push(Arc::new(PurchaseGuard::new(settings.clone())?.with_clock(Arc::clone(&clock))));
        }
        if let Some(settings) = active(&self.deletion) {
            guards.push(Arc::new(DeletionGuard::new(settings.clone())?.with_clock(Arc::clone(&clock))));
        }
        Ok(guards)
    }

    pub fn build_engine(&self) -> WardenResult<PolicyEngine> {
        self.build_engine_with_clock(Arc::new(SystemClock))
    }

    /// Build an engine whose guards and handshake share `clock`.
    pub fn build_engine_with_clock(&self, clock: Arc<dyn Clock>) -> WardenResult<PolicyEngine> {
        let engine = PolicyEngine::with_config(self.engine.to_engine_config()?).with_clock(Arc::clone(&clock));
        for guard in self.build_guards(clock)? {
            engine.add_guard(guard);
        }
        info!(guards = ?engine.guard_names(), "engine built from configuration");
        Ok(engine)
    }
}
