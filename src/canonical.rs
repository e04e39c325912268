//! Canonical JSON serialization and `canonical_hash` (§4.4). Grounded on the
//! teacher's `Cargo.toml` dependency on `sha2` (present but unused by the
//! teacher's own code — the hook this crate was waiting for).

use crate::state::ParamMap;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Serializes a `serde_json::Value` with object keys sorted lexicographically
/// at every depth, arrays order-preserved, numbers in serde_json's shortest
/// lossless form, and `null` literal — the representation `canonical_hash`
/// digests.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Null => out.push_str("null"),
        serde_json::Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        serde_json::Value::Number(n) => out.push_str(&n.to_string()),
        serde_json::Value::String(s) => {
            out.push_str(&serde_json::to_string(s).expect("string serialization cannot fail"))
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<&String, &serde_json::Value> = map.iter().collect();
            out.push('{');
            for (i, (k, v)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(k).expect("string serialization cannot fail"));
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
    }
}

/// `canonical_hash(tool, params)` — a hex-encoded SHA-256 digest of
/// `tool + ":" + canonical_json(params)`. Stable across key-insertion order,
/// sensitive to value and key differences (§8 invariants).
pub fn canonical_hash(tool: &str, params: &ParamMap) -> String {
    let value = serde_json::to_value(params).unwrap_or(serde_json::Value::Null);
    let canonical = canonical_json(&value);
    let mut hasher = Sha256::new();
    hasher.update(tool.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push(HEX[(b >> 4) as usize] as char);
        s.push(HEX[(b & 0x0f) as usize] as char);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn params(pairs: &[(&str, serde_json::Value)]) -> ParamMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<HashMap<_, _>>()
    }

    #[test]
    fn same_pairs_any_order_hash_equal() {
        let p1 = params(&[("a", json!(5)), ("b", json!(3))]);
        let p2 = params(&[("b", json!(3)), ("a", json!(5))]);
        assert_eq!(canonical_hash("add", &p1), canonical_hash("add", &p2));
    }

    #[test]
    fn different_tool_hash_differs() {
        let p = params(&[("a", json!(5))]);
        assert_ne!(canonical_hash("add", &p), canonical_hash("sub", &p));
    }

    #[test]
    fn different_value_hash_differs() {
        let p1 = params(&[("a", json!(5))]);
        let p2 = params(&[("a", json!(6))]);
        assert_ne!(canonical_hash("add", &p1), canonical_hash("add", &p2));
    }

    #[test]
    fn empty_params_and_null_values_are_stable() {
        let empty = ParamMap::new();
        let h1 = canonical_hash("noop", &empty);
        let h2 = canonical_hash("noop", &empty);
        assert_eq!(h1, h2);

        let with_null = params(&[("x", json!(null))]);
        let h3 = canonical_hash("noop", &with_null);
        let h4 = canonical_hash("noop", &with_null);
        assert_eq!(h3, h4);
        assert_ne!(h1, h3);
    }

    #[test]
    fn nested_object_key_order_is_irrelevant() {
        let p1 = params(&[("obj", json!({"z": 1, "a": 2}))]);
        let p2 = params(&[("obj", json!({"a": 2, "z": 1}))]);
        assert_eq!(canonical_hash("t", &p1), canonical_hash("t", &p2));
    }
}
