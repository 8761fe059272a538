//! Approval handshake.
//!
//! Turns a merged REQUIRE_APPROVAL decision into a terminal ALLOW or DENY by
//! consulting an [`ApprovalHandler`]. Exactly one of four things happens:
//! the handler answers, the timeout fires, the evaluation is cancelled, or
//! the handler fails. Every path resolves to an [`ApprovalOutcome`].

use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use warden_contracts::{
    approval::{ApprovalOutcome, ApprovalRequest, ApprovalResponse, TimeoutOutcome},
    decision::{Decision, DecisionStatus},
    error::WardenError,
};

use crate::{clock::Clock, traits::ApprovalHandler};

/// Approver recorded on responses the engine synthesizes after a timeout.
pub const TIMEOUT_APPROVER: &str = "system:timeout";
/// Approver recorded when the handler itself failed.
pub const ERROR_APPROVER: &str = "system:error";

/// Run the handshake against `handler`, bounded by `timeout` and `cancel`.
///
/// Dropping the returned future (or firing `cancel`) drops the in-flight
/// handler future with it.
pub async fn run_handshake(
    handler: &dyn ApprovalHandler,
    request: &ApprovalRequest,
    timeout: Duration,
    cancel: &CancellationToken,
    clock: &dyn Clock,
) -> ApprovalOutcome {
    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

    info!(
        call_id = %request.call_context.call_id,
        function = %request.call_context.function_name,
        handler = handler.name(),
        timeout_ms,
        "approval requested"
    );

    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        answered = tokio::time::timeout(timeout, handler.request(request, timeout)) => Some(answered),
    };

    let outcome = match result {
        None => ApprovalOutcome::Cancelled,
        Some(Ok(Ok(response))) => {
            if response.approved {
                handler.on_approved(request, &response).await;
                ApprovalOutcome::Approved { response }
            } else {
                handler.on_denied(request, &response).await;
                ApprovalOutcome::Denied { response }
            }
        }
        Some(Err(_elapsed)) => {
            let err = WardenError::ApprovalTimeout { timeout_ms };
            let response = match handler.timeout_outcome() {
                TimeoutOutcome::Approve => ApprovalResponse::approve(TIMEOUT_APPROVER, clock.now()),
                TimeoutOutcome::Deny => ApprovalResponse::deny(TIMEOUT_APPROVER, clock.now()),
            };
            warn!(
                call_id = %request.call_context.call_id,
                error = %err,
                approved = response.approved,
                "no approval response before deadline"
            );
            ApprovalOutcome::TimedOut { timeout_ms, response }
        }
        Some(Ok(Err(err))) => {
            warn!(
                call_id = %request.call_context.call_id,
                handler = handler.name(),
                error = %err,
                "approval handler failed, treating as denied"
            );
            ApprovalOutcome::Denied {
                response: ApprovalResponse::deny(ERROR_APPROVER, clock.now()).with_note(err.to_string()),
            }
        }
    };

    info!(
        call_id = %request.call_context.call_id,
        approved = outcome.is_approved(),
        outcome = %outcome.describe(),
        "approval resolved"
    );
    outcome
}

/// Rewrite a REQUIRE_APPROVAL decision into its terminal form.
///
/// The original reasons are kept and the outcome's description appended.
pub fn resolve(mut decision: Decision, outcome: &ApprovalOutcome) -> Decision {
    decision.status = if outcome.is_approved() {
        DecisionStatus::Allow
    } else {
        DecisionStatus::Deny
    };
    decision.reasons.push(outcome.describe());

    let approval = serde_json::to_value(outcome).unwrap_or(Value::Null);
    match &mut decision.details {
        Value::Object(map) => {
            map.insert("approval".to_string(), approval);
        }
        other => *other = json!({ "approval": approval }),
    }
    decision
}
