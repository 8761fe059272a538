//! Scope guard: which functions an agent may call at all.
//!
//! Resolution order, first match wins:
//!
//! 1. `deny_by_agent[agent]` matches → DENY
//! 2. `allow_by_agent[agent]` configured and does not match → DENY
//! 3. `require_approval_functions` matches → REQUIRE_APPROVAL
//! 4. `deny_functions` matches → DENY
//! 5. an allow list applies (the agent's own, else `allow_functions`) and
//!    does not match → DENY
//! 6. `read_only_mode` and no `read_only_patterns` match → DENY
//! 7. ALLOW
//!
//! Patterns are globs (`*` matches any substring) compiled once at
//! construction.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use warden_contracts::{context::CallContext, decision::Decision, error::WardenResult};
use warden_core::Guard;

use crate::pattern::PatternSet;

pub const NAME: &str = "scope";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub allow_functions: Vec<String>,
    pub deny_functions: Vec<String>,
    pub allow_by_agent: BTreeMap<String, Vec<String>>,
    pub deny_by_agent: BTreeMap<String, Vec<String>>,
    pub require_approval_functions: Vec<String>,
    pub read_only_mode: bool,
    pub read_only_patterns: Vec<String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            allow_functions: Vec::new(),
            deny_functions: Vec::new(),
            allow_by_agent: BTreeMap::new(),
            deny_by_agent: BTreeMap::new(),
            require_approval_functions: Vec::new(),
            read_only_mode: false,
            read_only_patterns: [
                "get_*", "read_*", "list_*", "fetch_*", "search_*", "query_*", "find_*", "lookup_*", "describe_*",
                "show_*",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

#[derive(Debug)]
pub struct ScopeGuard {
    config: ScopeConfig,
    allow: PatternSet,
    deny: PatternSet,
    allow_by_agent: HashMap<String, PatternSet>,
    deny_by_agent: HashMap<String, PatternSet>,
    approval: PatternSet,
    read_only: PatternSet,
}

fn compile_per_agent(field: &str, lists: &BTreeMap<String, Vec<String>>) -> WardenResult<HashMap<String, PatternSet>> {
    lists
        .iter()
        .map(|(agent, patterns)| Ok((agent.clone(), PatternSet::compile(&format!("{field}.{agent}"), patterns)?)))
        .collect()
}

impl ScopeGuard {
    pub fn new(config: ScopeConfig) -> WardenResult<Self> {
        Ok(Self {
            allow: PatternSet::compile("allow_functions", &config.allow_functions)?,
            deny: PatternSet::compile("deny_functions", &config.deny_functions)?,
            allow_by_agent: compile_per_agent("allow_by_agent", &config.allow_by_agent)?,
            deny_by_agent: compile_per_agent("deny_by_agent", &config.deny_by_agent)?,
            approval: PatternSet::compile("require_approval_functions", &config.require_approval_functions)?,
            read_only: PatternSet::compile("read_only_patterns", &config.read_only_patterns)?,
            config,
        })
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    fn resolve(&self, function: &str, agent: &str) -> Decision {
        let details = json!({ "function": function, "agent_id": agent });

        if let Some(pattern) = self.deny_by_agent.get(agent).and_then(|p| p.first_match(function)) {
            return Decision::deny(NAME, format!("agent '{agent}' may not call '{function}' (matches '{pattern}')"))
                .with_details(details);
        }

        let agent_allow = self.allow_by_agent.get(agent);
        if let Some(allow) = agent_allow {
            if !allow.is_match(function) {
                return Decision::deny(NAME, format!("'{function}' is not in the allow list for agent '{agent}'"))
                    .with_details(details);
            }
        }

        if let Some(pattern) = self.approval.first_match(function) {
            return Decision::require_approval(NAME, format!("'{function}' requires approval (matches '{pattern}')"))
                .with_risk(0.6)
                .with_details(details);
        }

        if let Some(pattern) = self.deny.first_match(function) {
            return Decision::deny(NAME, format!("'{function}' is denied (matches '{pattern}')")).with_details(details);
        }

        if agent_allow.is_none() && !self.allow.is_empty() && !self.allow.is_match(function) {
            return Decision::deny(NAME, format!("'{function}' is not in the allowed function list"))
                .with_details(details);
        }

        if self.config.read_only_mode && !self.read_only.is_match(function) {
            return Decision::deny(NAME, format!("read-only mode: '{function}' is not a read operation"))
                .with_details(details);
        }

        Decision::allow(NAME).with_reason(format!("'{function}' is in scope")).with_details(details)
    }
}

#[async_trait]
impl Guard for ScopeGuard {
    fn name(&self) -> &str {
        NAME
    }

    async fn evaluate(&self, ctx: &CallContext) -> WardenResult<Decision> {
        Ok(self.resolve(&ctx.function_name, ctx.agent()))
    }
}
