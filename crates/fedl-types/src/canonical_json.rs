//! Canonical JSON serialization
//!
//! Every replica that re-executes a transaction must derive the same key for
//! the same submission. Keys are therefore computed over a canonical form of
//! the submission rather than over whatever byte layout serde happens to emit.
//!
//! # Canonical Format
//!
//! 1. **Key Ordering**: object keys sorted lexicographically (UTF-8 byte order)
//! 2. **No Whitespace**: compact representation
//! 3. **Integers**: floats with no fractional part are written as integers
//! 4. **No Null Values**: fields holding null are omitted
//!
//! Array order is preserved: `inModelKeys` order is meaningful.

use crate::error::{Result, TypesError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Serialize value to canonical JSON string
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let json_value = serde_json::to_value(value)?;
    let canonical = canonicalize_value(json_value);
    Ok(serde_json::to_string(&canonical)?)
}

/// Blake3 hash of the canonical JSON representation
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<[u8; 32]> {
    let canonical_json = to_canonical_json(value)?;
    let hash = blake3::hash(canonical_json.as_bytes());
    Ok(*hash.as_bytes())
}

/// Hex encoded canonical hash, used as a ledger key for content-derived assets
pub fn content_key<T: Serialize>(value: &T) -> Result<String> {
    let key = hex::encode(canonical_hash(value)?);
    debug_assert_eq!(key.len(), crate::CONTENT_KEY_LEN);
    Ok(key)
}

/// Verify that a JSON document hashes to the expected digest
pub fn parse_and_verify_hash(json: &str, expected_hash: &[u8; 32]) -> Result<Value> {
    let value: Value = serde_json::from_str(json)?;
    if canonical_hash(&value)? != *expected_hash {
        return Err(TypesError::InvalidStructure("Hash mismatch".to_string()));
    }
    Ok(value)
}

fn canonicalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, canonicalize_value(v)))
                .collect();

            let mut canonical_map = Map::new();
            for (k, v) in sorted {
                canonical_map.insert(k, v);
            }
            Value::Object(canonical_map)
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize_value).collect()),
        Value::Number(n) => {
            if n.is_f64() {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < (1u64 << 53) as f64 => {
                        Value::Number(serde_json::Number::from(f as i64))
                    }
                    _ => Value::Number(n),
                }
            } else {
                Value::Number(n)
            }
        }
        other => other,
    }
}
