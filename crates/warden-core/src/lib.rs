//! # warden-core
//!
//! The WARDEN evaluation pipeline: the `Guard`, `ApprovalHandler`, and
//! `PostHook` seams, the decision merger, the approval handshake, and the
//! `PolicyEngine` that drives them.
//!
//! Built-in guards live in `warden-guards`; audit hooks in `warden-audit`.

pub mod approval;
pub mod clock;
pub mod engine;
pub mod guarded;
pub mod handlers;
pub mod merge;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{EngineConfig, PolicyEngine};
pub use guarded::guarded;
pub use handlers::{AutoApproveHandler, AutoDenyHandler, CallbackApprovalHandler, ConsoleApprovalHandler};
pub use merge::merge;
pub use traits::{ApprovalHandler, Guard, HookFn, PostHook};
