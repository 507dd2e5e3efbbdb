//! Content hash tokens.
//!
//! A content hash is a SHA-256 digest over four canonical fields: the subject
//! id, the RFC3339 UTC timestamp, the canonical JSON payload and the author id.
//! Each field is length-prefixed (8-byte big-endian) before its UTF-8 bytes so
//! adjacent fields can never be re-split into a colliding input.

use crate::error::HashError;
use chrono::{DateTime, Utc};
use concord_types::format_timestamp;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// `prev_hash` of the genesis block.
pub const GENESIS_PREV_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Digest of `(subject_id, timestamp_utc, canonical_payload_json, author_id)`.
pub fn content_hash(
    subject_id: &str,
    timestamp_utc: &str,
    canonical_payload_json: &str,
    author_id: &str,
) -> String {
    let mut hasher = Sha256::new();
    for field in [subject_id, timestamp_utc, canonical_payload_json, author_id] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Canonicalize `payload` and hash it together with its subject, time and author.
pub fn hash_record<T: Serialize + ?Sized>(
    subject_id: &str,
    timestamp: &DateTime<Utc>,
    payload: &T,
    author_id: &str,
) -> Result<String, HashError> {
    let canonical = canonical_json(payload)?;
    Ok(content_hash(
        subject_id,
        &format_timestamp(timestamp),
        &canonical,
        author_id,
    ))
}

/// Compact JSON with object keys sorted at every depth.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, HashError> {
    let value = canonicalize(serde_json::to_value(value)?);
    Ok(serde_json::to_string(&value)?)
}

/// Plain SHA-256 hex digest of `bytes`.
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// Rebuilds objects in key order; independent of serde_json's map backing.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
