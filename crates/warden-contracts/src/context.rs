//! The candidate call being evaluated.
//!
//! A `CallContext` describes one tool/function invocation an agent wants to
//! make. It is built by the caller, handed to the engine by value, and only
//! ever lent to guards as `&CallContext`. A guard that wants different
//! arguments says so through a MODIFY decision, never by mutating the context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{WardenError, WardenResult};

/// Ordered argument mapping (string keys, arbitrary JSON values).
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// Identity used for counters when the caller does not name an agent.
pub const DEFAULT_AGENT_ID: &str = "default";

/// Session used for counters when the caller does not name a session.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Immutable snapshot of one agent tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallContext {
    /// Short unique identifier for this call (16 hex chars).
    pub call_id: String,
    /// Name of the function/tool being invoked. Must be non-empty.
    pub function_name: String,
    /// Arguments as the agent supplied them.
    pub arguments: Arguments,
    /// Calling agent, if known.
    pub agent_id: Option<String>,
    /// Conversation/session the call belongs to, if known.
    pub session_id: Option<String>,
    /// When the call was initiated.
    pub timestamp: DateTime<Utc>,
    /// Caller-supplied cost estimate, consumed by budget enforcement.
    pub estimated_cost: Option<f64>,
    /// Free-form metadata for custom guards.
    pub metadata: Arguments,
}

impl CallContext {
    /// Start a context for `function_name` with no arguments.
    pub fn new(function_name: impl Into<String>) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            call_id: id[..16].to_string(),
            function_name: function_name.into(),
            arguments: Arguments::new(),
            agent_id: None,
            session_id: None,
            timestamp: Utc::now(),
            estimated_cost: None,
            metadata: Arguments::new(),
        }
    }

    /// Add one argument.
    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Replace the whole argument map.
    pub fn with_arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_estimated_cost(mut self, cost: f64) -> Self {
        self.estimated_cost = Some(cost);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Agent identity used for keyed state, falling back to [`DEFAULT_AGENT_ID`].
    pub fn agent(&self) -> &str {
        self.agent_id.as_deref().unwrap_or(DEFAULT_AGENT_ID)
    }

    /// Session identity used for keyed state, falling back to [`DEFAULT_SESSION_ID`].
    pub fn session(&self) -> &str {
        self.session_id.as_deref().unwrap_or(DEFAULT_SESSION_ID)
    }

    /// Check the caller-side invariants.
    ///
    /// A malformed context is a caller bug, so this is the one error the
    /// engine hands back instead of turning into a decision.
    pub fn validate(&self) -> WardenResult<()> {
        if self.function_name.trim().is_empty() {
            return Err(WardenError::Validation {
                reason: "function_name must not be empty".to_string(),
            });
        }
        if let Some(cost) = self.estimated_cost {
            if !cost.is_finite() || cost < 0.0 {
                return Err(WardenError::Validation {
                    reason: format!("estimated_cost must be a non-negative number, got {cost}"),
                });
            }
        }
        Ok(())
    }
}
