//! Content hashing for entities without a natural identifier.
//!
//! The hash is SHA-256 over the canonical JSON form of the entity: object keys
//! sorted, null members dropped. Two payloads that differ only in key order or
//! in explicit nulls hash the same.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Canonical form of a value: sorted keys, no null members
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(canonicalize_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn canonicalize_map(map: &Map<String, Value>) -> Map<String, Value> {
    let mut entries: Vec<(&String, &Value)> = map.iter().filter(|(_, v)| !v.is_null()).collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(k, v)| (k.clone(), canonicalize(v)))
        .collect()
}

/// Hex-encoded SHA-256 of the canonical form of `value`
pub fn content_hash(value: &Value) -> String {
    digest(&canonicalize(value))
}

/// [`content_hash`] for a bare object
pub fn content_hash_map(map: &Map<String, Value>) -> String {
    digest(&Value::Object(canonicalize_map(map)))
}

fn digest(canonical: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a = json!({"Description": "Widget", "Amount": 9.99, "Tracking": [{"Name": "Region", "Option": "North"}]});
        let b = json!({"Tracking": [{"Option": "North", "Name": "Region"}], "Amount": 9.99, "Description": "Widget"});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_any_value_change_changes_hash() {
        let a = json!({"Description": "Widget", "Amount": 9.99});
        let b = json!({"Description": "Widget", "Amount": 10.0});
        let c = json!({"Description": "Gadget", "Amount": 9.99});
        assert_ne!(content_hash(&a), content_hash(&b));
        assert_ne!(content_hash(&a), content_hash(&c));
    }

    #[test]
    fn test_nulls_are_ignored() {
        let a = json!({"Description": "Widget"});
        let b = json!({"Description": "Widget", "Quantity": null});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_map_and_value_agree() {
        let value = json!({"b": 1, "a": "x"});
        let map = value.as_object().unwrap();
        assert_eq!(content_hash(&value), content_hash_map(map));
        assert_eq!(content_hash(&value).len(), 64);
    }

    #[test]
    fn test_stable_across_calls() {
        let value = json!({"AccountCode": "200", "Quantity": 1});
        assert_eq!(content_hash(&value), content_hash(&value.clone()));
    }
}
