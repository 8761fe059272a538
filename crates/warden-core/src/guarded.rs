//! Run a tool call only if the engine lets it through.

use std::future::Future;

use warden_contracts::{
    context::{Arguments, CallContext},
    decision::DecisionStatus,
    error::{WardenError, WardenResult},
};

use crate::engine::PolicyEngine;

/// Evaluate `ctx` and, unless the call is blocked, invoke `call` with the
/// arguments it should run with.
///
/// Replacement arguments from any MODIFY guard are merged over the
/// originals before `call` sees them, including after an approval.
///
/// # Errors
///
/// `WardenError::Blocked` carrying the decision when the call may not run,
/// or `WardenError::Validation` for a malformed context.
pub async fn guarded<F, Fut, T>(engine: &PolicyEngine, ctx: CallContext, call: F) -> WardenResult<T>
where
    F: FnOnce(Arguments) -> Fut,
    Fut: Future<Output = T>,
{
    let mut arguments = ctx.arguments.clone();
    let decision = engine.evaluate(ctx).await?;

    match decision.status {
        DecisionStatus::Allow | DecisionStatus::Modify => {
            if let Some(modified) = &decision.modified_arguments {
                for (key, value) in modified {
                    arguments.insert(key.clone(), value.clone());
                }
            }
        }
        DecisionStatus::RequireApproval | DecisionStatus::Deny => {
            return Err(WardenError::Blocked { decision: Box::new(decision) });
        }
    }

    Ok(call(arguments).await)
}
