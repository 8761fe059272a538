//! Audit record and entry types.
//!
//! `AuditRecord` is what the engine decided about one call. `AuditEntry`
//! wraps it with a sequence number and the SHA-256 hashes that link it into
//! the chain. `AuditLog` is an exported snapshot of the chain.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use warden_contracts::{
    approval::ApprovalOutcome,
    context::{Arguments, CallContext},
    decision::{Decision, DecisionStatus},
};

/// Longest argument rendering kept in `arguments_summary`, in characters.
pub const MAX_ARGUMENT_CHARS: usize = 100;

/// The final decision for one call, as recorded in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub call_id: String,
    pub function_name: String,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    /// Each argument rendered as text and truncated.
    pub arguments_summary: BTreeMap<String, String>,
    pub status: DecisionStatus,
    pub reasons: Vec<String>,
    pub risk_score: f64,
    pub contributors: Vec<String>,
    /// Every guard's reasons as `"[guard] status: reason"`, including
    /// guards outranked by the final status.
    #[serde(default)]
    pub all_reasons: Vec<String>,
    /// Set when the decision went through the approval handshake.
    pub approval: Option<ApprovalOutcome>,
    pub execution_allowed: bool,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(ctx: &CallContext, decision: &Decision, recorded_at: DateTime<Utc>) -> Self {
        let approval = decision
            .details
            .get("approval")
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        Self {
            call_id: ctx.call_id.clone(),
            function_name: ctx.function_name.clone(),
            agent_id: ctx.agent_id.clone(),
            session_id: ctx.session_id.clone(),
            arguments_summary: summarize_arguments(&ctx.arguments),
            status: decision.status,
            reasons: decision.reasons.clone(),
            risk_score: decision.risk_score,
            contributors: decision.contributors.clone(),
            all_reasons: decision.all_reasons.clone(),
            approval,
            execution_allowed: decision.permits_execution(),
            recorded_at,
        }
    }

    /// Approver named by the handshake, if there was one.
    pub fn approver(&self) -> Option<&str> {
        match self.approval.as_ref()? {
            ApprovalOutcome::Approved { response }
            | ApprovalOutcome::Denied { response }
            | ApprovalOutcome::TimedOut { response, .. } => Some(&response.approver),
            ApprovalOutcome::Cancelled => None,
        }
    }
}

pub fn summarize_arguments(arguments: &Arguments) -> BTreeMap<String, String> {
    arguments
        .iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), truncate(&text))
        })
        .collect()
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_ARGUMENT_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// One link in the hash chain.
///
/// `this_hash` commits to `sequence`, `prev_hash` and the full `record`;
/// changing any of them is detected by `verify_chain`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub record: AuditRecord,
    pub prev_hash: String,
    pub this_hash: String,
}

impl AuditEntry {
    /// `prev_hash` of the first entry ever written.
    pub const GENESIS_HASH: &'static str = "0000000000000000000000000000000000000000000000000000000000000000";
}

/// Snapshot of an audit chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub entries: Vec<AuditEntry>,
    /// `prev_hash` expected of the first retained entry. Equals
    /// `GENESIS_HASH` unless older entries were evicted.
    pub anchor_hash: String,
    /// `this_hash` of the last entry, empty when there are none.
    pub terminal_hash: String,
    pub exported_at: DateTime<Utc>,
}
