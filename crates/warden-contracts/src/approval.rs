//! Human-in-the-loop approval request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{context::CallContext, decision::Decision};

/// Sent to an approval handler when the merged decision is REQUIRE_APPROVAL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// The call awaiting a verdict.
    pub call_context: CallContext,
    /// The merged decision before approval.
    pub decision: Decision,
    pub requested_at: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn new(call_context: CallContext, decision: Decision, requested_at: DateTime<Utc>) -> Self {
        Self { call_context, decision, requested_at }
    }

    /// Reasons the call was flagged, joined for display.
    pub fn reason(&self) -> String {
        self.decision.reasons.join("; ")
    }
}

/// A handler's answer to an [`ApprovalRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub approved: bool,
    /// Who decided, e.g. `"console:user"` or `"auto_deny"`.
    pub approver: String,
    pub note: Option<String>,
    pub responded_at: DateTime<Utc>,
}

impl ApprovalResponse {
    pub fn approve(approver: impl Into<String>, responded_at: DateTime<Utc>) -> Self {
        Self { approved: true, approver: approver.into(), note: None, responded_at }
    }

    pub fn deny(approver: impl Into<String>, responded_at: DateTime<Utc>) -> Self {
        Self { approved: false, approver: approver.into(), note: None, responded_at }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// What a handler resolves to when nobody answers in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutOutcome {
    #[default]
    Deny,
    Approve,
}

/// Terminal state of one approval handshake.
///
/// The handshake starts PENDING and ends in exactly one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ApprovalOutcome {
    Approved { response: ApprovalResponse },
    Denied { response: ApprovalResponse },
    /// No answer within the timeout; `response` is the synthetic verdict
    /// derived from the handler's [`TimeoutOutcome`].
    TimedOut { timeout_ms: u64, response: ApprovalResponse },
    /// The caller cancelled the evaluation while the request was pending.
    Cancelled,
}

impl ApprovalOutcome {
    /// Whether the call may proceed.
    pub fn is_approved(&self) -> bool {
        match self {
            Self::Approved { .. } => true,
            Self::TimedOut { response, .. } => response.approved,
            Self::Denied { .. } | Self::Cancelled => false,
        }
    }

    /// Reason appended to the final decision.
    pub fn describe(&self) -> String {
        match self {
            Self::Approved { response } => match &response.note {
                Some(note) => format!("approved by {}: {}", response.approver, note),
                None => format!("approved by {}", response.approver),
            },
            Self::Denied { response } => match &response.note {
                Some(note) => format!("approval denied by {}: {}", response.approver, note),
                None => format!("approval denied by {}", response.approver),
            },
            Self::TimedOut { timeout_ms, response } => format!(
                "approval timed out after {}ms; resolved to {}",
                timeout_ms,
                if response.approved { "approve" } else { "deny" }
            ),
            Self::Cancelled => "approval cancelled before a response arrived".to_string(),
        }
    }
}
