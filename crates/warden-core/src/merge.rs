//! Decision merger.
//!
//! Reduces per-guard decisions to one:
//!
//! 1. The merged status is the highest-priority status present
//!    (DENY > REQUIRE_APPROVAL > MODIFY > ALLOW).
//! 2. `reasons` concatenates, in evaluation order, only the reasons of
//!    decisions at the merged status. Every reason lands in `all_reasons`.
//! 3. `risk_score` is the maximum among decisions at the merged status.
//! 4. Every MODIFY decision's arguments are unioned in evaluation order,
//!    later guards overwriting earlier ones key by key. The union is kept
//!    even when a stricter status wins, so a call that is later approved
//!    still runs with the rewritten arguments.
//! 5. No decisions at all means ALLOW with zero risk.

use serde_json::Value;

use warden_contracts::{context::Arguments, decision::{Decision, DecisionStatus}};

/// Merge guard decisions into the engine's single decision.
pub fn merge(decisions: &[Decision]) -> Decision {
    let Some(top) = decisions.iter().map(|d| d.status).max_by_key(|s| s.priority()) else {
        return Decision::unrestricted();
    };

    let mut merged = Decision::unrestricted();
    merged.status = top;

    let mut modifications: Option<Arguments> = None;
    let mut details = serde_json::Map::new();

    for decision in decisions {
        let guard = decision.guard_name.as_deref().unwrap_or("unknown");

        for reason in &decision.reasons {
            merged
                .all_reasons
                .push(format!("[{}] {}: {}", guard, decision.status, reason));
        }

        if decision.status == DecisionStatus::Modify {
            if let Some(args) = &decision.modified_arguments {
                let union = modifications.get_or_insert_with(Arguments::new);
                for (key, value) in args {
                    union.insert(key.clone(), value.clone());
                }
            }
        }

        if decision.status != top {
            continue;
        }

        merged.reasons.extend(decision.reasons.iter().cloned());
        merged.risk_score = merged.risk_score.max(decision.risk_score);
        merged.contributors.push(guard.to_string());

        if !decision.details.is_null() {
            details.insert(guard.to_string(), decision.details.clone());
        }
    }

    merged.modified_arguments = modifications;
    if top == DecisionStatus::Modify && merged.modified_arguments.is_none() {
        merged.modified_arguments = Some(Arguments::new());
    }
    if !details.is_empty() {
        merged.details = Value::Object(details);
    }

    merged
}
