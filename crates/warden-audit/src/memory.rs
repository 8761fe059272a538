//! In-memory audit log.
//!
//! `InMemoryAuditLog` keeps the most recent entries of a SHA-256 hash chain
//! behind a `Mutex`. Register it on an engine with `add_post_hook` and keep
//! an `Arc` clone to query it. When the log is full the oldest entry is
//! evicted and its `this_hash` becomes the anchor the remaining chain is
//! verified against.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use warden_contracts::{
    context::CallContext,
    decision::{Decision, DecisionStatus},
    error::WardenResult,
};
use warden_core::{Clock, PostHook, SystemClock};

use crate::{
    chain::{hash_entry, verify_chain},
    event::{AuditEntry, AuditLog, AuditRecord},
};

pub const DEFAULT_CAPACITY: usize = 10_000;
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Filters for [`InMemoryAuditLog::query`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditQuery {
    pub function_name: Option<String>,
    pub status: Option<DecisionStatus>,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    /// Most recent matches returned; [`DEFAULT_QUERY_LIMIT`] when unset.
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function(mut self, name: impl Into<String>) -> Self {
        self.function_name = Some(name.into());
        self
    }

    pub fn status(mut self, status: DecisionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.function_name.as_ref().map_or(true, |f| *f == record.function_name)
            && self.status.map_or(true, |s| s == record.status)
            && self.agent_id.as_deref().map_or(true, |a| record.agent_id.as_deref() == Some(a))
            && self.session_id.as_deref().map_or(true, |s| record.session_id.as_deref() == Some(s))
            && self.since.map_or(true, |t| record.recorded_at >= t)
    }
}

pub(crate) struct State {
    pub(crate) entries: VecDeque<AuditEntry>,
    next_sequence: u64,
    last_hash: String,
    /// `prev_hash` of the oldest retained entry.
    anchor: String,
    evicted: u64,
}

/// Bounded, append-only audit chain.
pub struct InMemoryAuditLog {
    pub(crate) state: Mutex<State>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A log holding at most `capacity` entries (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                entries: VecDeque::new(),
                next_sequence: 0,
                last_hash: AuditEntry::GENESIS_HASH.to_string(),
                anchor: AuditEntry::GENESIS_HASH.to_string(),
                evicted: 0,
            }),
            capacity: capacity.max(1),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append the final decision for `ctx` to the chain.
    pub fn record(&self, ctx: &CallContext, decision: &Decision) -> WardenResult<AuditEntry> {
        let record = AuditRecord::new(ctx, decision, self.clock.now());

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let sequence = state.next_sequence;
        let this_hash = hash_entry(sequence, &record, &state.last_hash)?;
        let entry = AuditEntry { sequence, record, prev_hash: state.last_hash.clone(), this_hash: this_hash.clone() };

        if state.entries.len() == self.capacity {
            if let Some(oldest) = state.entries.pop_front() {
                state.anchor = oldest.this_hash;
                state.evicted += 1;
            }
        }
        state.entries.push_back(entry.clone());
        state.next_sequence += 1;
        state.last_hash = this_hash;

        debug!(call_id = %ctx.call_id, sequence, status = %decision.status, "audit entry recorded");
        Ok(entry)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries dropped to stay within capacity.
    pub fn evicted(&self) -> u64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).evicted
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).entries.iter().cloned().collect()
    }

    /// Most recent entries matching `query`, oldest first.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        let limit = query.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut matches: Vec<AuditEntry> =
            state.entries.iter().rev().filter(|e| query.matches(&e.record)).take(limit).cloned().collect();
        matches.reverse();
        matches
    }

    /// Whether the retained chain is intact.
    pub fn verify_integrity(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        verify_chain(&state.entries, &state.anchor)
    }

    pub fn export_log(&self) -> AuditLog {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        AuditLog {
            entries: state.entries.iter().cloned().collect(),
            anchor_hash: state.anchor.clone(),
            terminal_hash: state.entries.back().map(|e| e.this_hash.clone()).unwrap_or_default(),
            exported_at: self.clock.now(),
        }
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryAuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAuditLog")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PostHook for InMemoryAuditLog {
    async fn on_decision(&self, ctx: &CallContext, decision: &Decision) -> WardenResult<()> {
        self.record(ctx, decision).map(|_| ())
    }
}
