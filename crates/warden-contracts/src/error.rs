//! Error types for the WARDEN policy engine.
//!
//! Only `Validation` ever escapes `PolicyEngine::evaluate`. Everything that
//! originates inside a guard, the approval handshake, or a post-hook is
//! contained by the engine and turned into a decision or a log line.

use thiserror::Error;

use crate::decision::Decision;

/// The unified error type for WARDEN.
#[derive(Debug, Error)]
pub enum WardenError {
    /// The caller passed a malformed `CallContext`.
    #[error("invalid call context: {reason}")]
    Validation { reason: String },

    /// A guard or engine was constructed with invalid parameters.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// A guard failed while evaluating a call.
    ///
    /// The engine converts this into a DENY contribution; callers of
    /// `evaluate` never see it.
    #[error("guard '{guard}' failed: {reason}")]
    GuardEvaluation { guard: String, reason: String },

    /// An approval request was not answered in time.
    #[error("approval timed out after {timeout_ms}ms")]
    ApprovalTimeout { timeout_ms: u64 },

    /// The approval handler could not produce a response.
    #[error("approval handler failed: {reason}")]
    ApprovalHandler { reason: String },

    /// A post-evaluation hook failed. Logged, never propagated.
    #[error("post-hook failed: {reason}")]
    Hook { reason: String },

    /// A guarded call was not executed because the final decision was DENY.
    #[error("call blocked: {}", decision.summary())]
    Blocked { decision: Box<Decision> },
}

impl WardenError {
    pub fn guard(guard: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::GuardEvaluation { guard: guard.into(), reason: reason.into() }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config { reason: reason.into() }
    }
}

/// Convenience alias used throughout the WARDEN crates.
pub type WardenResult<T> = Result<T, WardenError>;
