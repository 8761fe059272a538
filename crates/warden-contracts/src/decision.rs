//! Decision types produced by guards and by the merger.
//!
//! A guard returns one `Decision` per evaluated call. The engine merges all
//! guard decisions into a single `Decision` whose status is the strictest
//! one present: DENY > REQUIRE_APPROVAL > MODIFY > ALLOW.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::Arguments;

/// Outcome category of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Allow,
    Modify,
    RequireApproval,
    Deny,
}

impl DecisionStatus {
    /// Merge precedence; higher wins.
    pub fn priority(self) -> u8 {
        match self {
            Self::Allow => 0,
            Self::Modify => 1,
            Self::RequireApproval => 2,
            Self::Deny => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Modify => "modify",
            Self::RequireApproval => "require_approval",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating one call, either for a single guard or merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub status: DecisionStatus,
    /// Human-readable reasons, one per contributing guard.
    pub reasons: Vec<String>,
    /// Risk in `[0, 1]`.
    pub risk_score: f64,
    /// Guard that produced this decision; `None` on a merged decision.
    pub guard_name: Option<String>,
    /// Replacement arguments. A guard sets them only with MODIFY; a merged
    /// decision keeps every MODIFY guard's arguments whatever its status.
    pub modified_arguments: Option<Arguments>,
    /// Guards whose decisions share the merged status, in evaluation order.
    #[serde(default)]
    pub contributors: Vec<String>,
    /// Every guard's reasons, including those dropped from `reasons` by the
    /// merge. Formatted as `"[guard] status: reason"`.
    #[serde(default)]
    pub all_reasons: Vec<String>,
    /// Structured data about why the decision was made.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Decision {
    fn base(status: DecisionStatus, guard: &str, reason: Option<String>, risk_score: f64) -> Self {
        Self {
            status,
            reasons: reason.into_iter().filter(|r| !r.is_empty()).collect(),
            risk_score,
            guard_name: Some(guard.to_string()),
            modified_arguments: None,
            contributors: vec![guard.to_string()],
            all_reasons: Vec::new(),
            details: serde_json::Value::Null,
        }
    }

    /// Permit the call. Reasons on ALLOW are informational only.
    pub fn allow(guard: &str) -> Self {
        Self::base(DecisionStatus::Allow, guard, None, 0.0)
    }

    pub fn deny(guard: &str, reason: impl Into<String>) -> Self {
        Self::base(DecisionStatus::Deny, guard, Some(reason.into()), 1.0)
    }

    pub fn require_approval(guard: &str, reason: impl Into<String>) -> Self {
        Self::base(DecisionStatus::RequireApproval, guard, Some(reason.into()), 0.7)
    }

    pub fn modify(guard: &str, reason: impl Into<String>, modified_arguments: Arguments) -> Self {
        let mut decision = Self::base(DecisionStatus::Modify, guard, Some(reason.into()), 0.0);
        decision.modified_arguments = Some(modified_arguments);
        decision
    }

    /// The decision returned when no guard applies.
    pub fn unrestricted() -> Self {
        Self {
            status: DecisionStatus::Allow,
            reasons: Vec::new(),
            risk_score: 0.0,
            guard_name: None,
            modified_arguments: None,
            contributors: Vec::new(),
            all_reasons: Vec::new(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if !reason.is_empty() {
            self.reasons.push(reason);
        }
        self
    }

    pub fn with_reasons<I, S>(self, reasons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        reasons.into_iter().fold(self, Self::with_reason)
    }

    pub fn with_risk(mut self, risk_score: f64) -> Self {
        self.risk_score = risk_score;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// True for DENY and REQUIRE_APPROVAL.
    pub fn is_blocked(&self) -> bool {
        matches!(self.status, DecisionStatus::Deny | DecisionStatus::RequireApproval)
    }

    pub fn is_denied(&self) -> bool {
        self.status == DecisionStatus::Deny
    }

    pub fn needs_approval(&self) -> bool {
        self.status == DecisionStatus::RequireApproval
    }

    /// True when the caller may run the underlying call.
    pub fn permits_execution(&self) -> bool {
        matches!(self.status, DecisionStatus::Allow | DecisionStatus::Modify)
    }

    /// Enforce the decision invariants for a decision produced by `guard`.
    ///
    /// Non-ALLOW decisions must carry a reason, `risk_score` must lie in
    /// `[0, 1]` (NaN counts as worst case), and only MODIFY may carry
    /// replacement arguments. User-defined guards are not trusted to get
    /// this right, so the engine calls this on every guard decision.
    pub fn normalized(mut self, guard: &str) -> Self {
        if self.guard_name.is_none() {
            self.guard_name = Some(guard.to_string());
        }
        if self.contributors.is_empty() {
            self.contributors.push(guard.to_string());
        }
        self.reasons.retain(|r| !r.is_empty());
        if self.status != DecisionStatus::Allow && self.reasons.is_empty() {
            self.reasons
                .push(format!("guard '{}' returned {} without a reason", guard, self.status));
        }
        self.risk_score = if self.risk_score.is_nan() {
            1.0
        } else {
            self.risk_score.clamp(0.0, 1.0)
        };
        match self.status {
            DecisionStatus::Modify => {
                if self.modified_arguments.is_none() {
                    self.modified_arguments = Some(Arguments::new());
                }
            }
            _ => self.modified_arguments = None,
        }
        self
    }

    /// Reasons joined for display.
    pub fn summary(&self) -> String {
        if self.reasons.is_empty() {
            return self.status.to_string();
        }
        format!("{}: {}", self.status, self.reasons.join("; "))
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.guard_name {
            Some(guard) => write!(f, "[{}] {}", guard, self.summary()),
            None => write!(f, "{} (risk={:.2})", self.summary(), self.risk_score),
        }
    }
}
