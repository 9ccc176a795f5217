//! Canonical serialization and SHA-256 fingerprints.
//!
//! Two runs configured with semantically identical rules and thresholds must
//! be provably identical without diffing raw config files. Canonicalization
//! sorts object keys recursively and serializes with compact separators, so
//! the fingerprint is insensitive to key insertion order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::config::Thresholds;

/// Recursively sort object keys. Arrays keep their order; scalars pass
/// through.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), canonicalize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serialize a value to canonical JSON: sorted keys, compact `,`/`:`
/// separators, UTF-8 left unescaped.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v = serde_json::to_value(value)?;
    serde_json::to_string(&canonicalize(&v))
}

/// SHA-256 hex digest of the canonical JSON form of `value`.
pub fn fingerprint<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Audit record tying a run to the exact configuration it used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditInfo {
    pub thresholds: Thresholds,
    pub config_fingerprint: String,
}
