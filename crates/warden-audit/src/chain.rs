//! Hash-chain primitives.
//!
//! Hash input layout (bytes, in order):
//!   1. sequence as 8-byte little-endian
//!   2. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   3. compact JSON of the record

use sha2::{Digest, Sha256};

use warden_contracts::error::{WardenError, WardenResult};

use crate::event::{AuditEntry, AuditRecord};

/// SHA-256 of one entry as a lowercase 64-character hex string.
pub fn hash_entry(sequence: u64, record: &AuditRecord, prev_hash: &str) -> WardenResult<String> {
    let record_json = serde_json::to_vec(record).map_err(|e| WardenError::Hook {
        reason: format!("audit record for call {} is not serializable: {e}", record.call_id),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);
    Ok(hex::encode(hasher.finalize()))
}

/// Check a run of entries against the hash the first one must link to.
///
/// Each entry must follow its predecessor's sequence number, carry its
/// predecessor's `this_hash` (or `anchor` for the first entry) as
/// `prev_hash`, and store the hash recomputed from its own fields. An empty
/// run is valid.
pub fn verify_chain<'a>(entries: impl IntoIterator<Item = &'a AuditEntry>, anchor: &str) -> bool {
    let mut expected_prev = anchor.to_string();
    let mut expected_sequence = None;

    for entry in entries {
        if entry.prev_hash != expected_prev {
            return false;
        }
        if expected_sequence.is_some_and(|s| s != entry.sequence) {
            return false;
        }
        match hash_entry(entry.sequence, &entry.record, &entry.prev_hash) {
            Ok(hash) if hash == entry.this_hash => {}
            _ => return false,
        }
        expected_prev = entry.this_hash.clone();
        expected_sequence = Some(entry.sequence + 1);
    }

    true
}
