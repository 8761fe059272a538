//! # warden-contracts
//!
//! Shared types and error contracts for the WARDEN tool-call policy engine.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod approval;
pub mod context;
pub mod decision;
pub mod error;

pub use approval::{ApprovalOutcome, ApprovalRequest, ApprovalResponse, TimeoutOutcome};
pub use context::{Arguments, CallContext};
pub use decision::{Decision, DecisionStatus};
pub use error::{WardenError, WardenResult};
