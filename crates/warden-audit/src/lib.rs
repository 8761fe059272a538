//! # warden-audit
//!
//! Audit post-hooks for the WARDEN policy engine.
//!
//! [`InMemoryAuditLog`] appends every final decision to a SHA-256 hash
//! chain: each entry links to the previous one through its hash, so
//! modifying any stored entry is detected by [`verify_chain`].
//! [`TracingAuditHook`] emits the same information as `tracing` events.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_audit::{AuditQuery, InMemoryAuditLog, TracingAuditHook};
//!
//! let audit = Arc::new(InMemoryAuditLog::new());
//! engine.add_post_hook(audit.clone()).add_post_hook(Arc::new(TracingAuditHook));
//!
//! // ... evaluate calls ...
//!
//! assert!(audit.verify_integrity());
//! let denied = audit.query(&AuditQuery::new().status(DecisionStatus::Deny));
//! ```

pub mod chain;
pub mod event;
pub mod memory;
pub mod tracing_hook;

pub use chain::{hash_entry, verify_chain};
pub use event::{AuditEntry, AuditLog, AuditRecord};
pub use memory::{AuditQuery, InMemoryAuditLog};
pub use tracing_hook::TracingAuditHook;

// ── Tests ─────────────────────────────────────────────────────────────────────
