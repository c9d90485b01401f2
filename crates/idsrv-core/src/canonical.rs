//! # Canonical Serialization: JCS-Compatible Byte Production
//!
//! This module defines `CanonicalBytes`, the sole construction path for bytes
//! that are signed or verified anywhere in the server.
//!
//! ## Security Invariant
//!
//! The `CanonicalBytes` newtype has a private inner field. The only way to
//! construct it is through `CanonicalBytes::new()`, which applies the type
//! checks below before JCS serialization. Any function that signs must accept
//! `&CanonicalBytes`, so signing a non-canonical encoding does not compile.
//!
//! ## Rules
//!
//! 1. **Reject floats.** Lookup replies only carry strings and integer epoch
//!    milliseconds. Floats have non-deterministic number serialization edge
//!    cases across implementations and are refused.
//! 2. **Sorted keys, compact separators, UTF-8.** Serialization uses
//!    `serde_jcs` (RFC 8785). For payloads made of objects, strings and
//!    integers this is byte-identical to Matrix canonical JSON, which is what
//!    remote verifiers compute.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS canonicalization.
///
/// # Invariants
///
/// - The only constructor is `CanonicalBytes::new()`.
/// - No float values are present.
/// - Object keys are sorted, separators are compact (RFC 8785).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError::FloatRejected` if the value contains a
    /// float. Returns `CanonicalizationError::SerializationFailed` if JCS
    /// serialization fails.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        ensure_no_floats(&value)?;
        Ok(Self(serialize_canonical(&value)?))
    }

    /// Access the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Deterministic encoder from a generic JSON object to signable bytes.
///
/// Injected into the lookup pipeline so the encoding step is an explicit
/// collaborator. Implementations must be pure: the same logical object must
/// always produce the same bytes regardless of key insertion order.
pub trait CanonicalEncoder: Send + Sync {
    /// Encode a JSON object into canonical bytes.
    fn encode(&self, object: &Map<String, Value>) -> Result<CanonicalBytes, CanonicalizationError>;
}

/// The production encoder: RFC 8785 JSON Canonicalization Scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct JcsEncoder;

impl CanonicalEncoder for JcsEncoder {
    fn encode(&self, object: &Map<String, Value>) -> Result<CanonicalBytes, CanonicalizationError> {
        CanonicalBytes::new(object)
    }
}

/// Refuse any non-integer number anywhere in `value`.
fn ensure_no_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Number(n) if !n.is_i64() && !n.is_u64() => Err(
            CanonicalizationError::FloatRejected(n.as_f64().unwrap_or(f64::NAN)),
        ),
        Value::Object(map) => map.values().try_for_each(ensure_no_floats),
        Value::Array(items) => items.iter().try_for_each(ensure_no_floats),
        _ => Ok(()),
    }
}

/// Serialize a JSON value in JCS-canonical form (RFC 8785).
fn serialize_canonical(value: &Value) -> Result<Vec<u8>, CanonicalizationError> {
    let s = serde_jcs::to_string(value)?;
    Ok(s.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_bytes_sorted_keys() {
        let data = serde_json::json!({"mxid": "@a:b", "address": "a@b.c", "medium": "email"});
        let cb = CanonicalBytes::new(&data).expect("should canonicalize");
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert_eq!(s, r#"{"address":"a@b.c","medium":"email","mxid":"@a:b"}"#);
    }

    #[test]
    fn test_canonical_bytes_nested() {
        let data = serde_json::json!({
            "signatures": {"example.org": {"ed25519:0": "sig"}},
            "ts": 1
        });
        let cb = CanonicalBytes::new(&data).expect("should canonicalize");
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert_eq!(
            s,
            r#"{"signatures":{"example.org":{"ed25519:0":"sig"}},"ts":1}"#
        );
    }

    #[test]
    fn test_epoch_millis_integers_accepted() {
        let data = serde_json::json!({"not_after": 253402300799000i64, "not_before": 0});
        let cb = CanonicalBytes::new(&data).expect("integers should be accepted");
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert_eq!(s, r#"{"not_after":253402300799000,"not_before":0}"#);
    }

    #[test]
    fn test_float_rejection() {
        let data = serde_json::json!({"ts": 1.5});
        match CanonicalBytes::new(&data).unwrap_err() {
            CanonicalizationError::FloatRejected(f) => assert_eq!(f, 1.5),
            other => panic!("Expected FloatRejected, got: {other}"),
        }
    }

    #[test]
    fn test_deeply_nested_float_rejected() {
        let data = serde_json::json!({"a": {"b": [{"c": 3.25}]}});
        assert!(CanonicalBytes::new(&data).is_err());
    }

    #[test]
    fn test_empty_object() {
        let data = serde_json::json!({});
        let cb = CanonicalBytes::new(&data).expect("empty object should work");
        assert_eq!(cb.as_bytes(), b"{}");
        assert_eq!(cb.len(), 2);
        assert!(!cb.is_empty());
    }

    #[test]
    fn test_unicode_passthrough() {
        let data = serde_json::json!({"address": "z\u{00fc}rich@example.org"});
        let cb = CanonicalBytes::new(&data).unwrap();
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert!(s.contains('\u{00fc}'));
    }

    #[test]
    fn test_jcs_encoder_ignores_insertion_order() {
        let mut a = Map::new();
        a.insert("medium".into(), Value::from("email"));
        a.insert("address".into(), Value::from("a@example.org"));
        let mut b = Map::new();
        b.insert("address".into(), Value::from("a@example.org"));
        b.insert("medium".into(), Value::from("email"));
        let enc = JcsEncoder;
        assert_eq!(enc.encode(&a).unwrap(), enc.encode(&b).unwrap());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn json_value_no_floats() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| serde_json::json!(n)),
            "[a-zA-Z0-9_@:. ]{0,40}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,10}", inner, 0..8).prop_map(|m| {
                    let map: Map<String, Value> = m.into_iter().collect();
                    Value::Object(map)
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn canonical_bytes_deterministic(value in json_value_no_floats()) {
            let a = CanonicalBytes::new(&value).unwrap();
            let b = CanonicalBytes::new(&value).unwrap();
            prop_assert_eq!(a.as_bytes(), b.as_bytes());
        }

        /// Parsing canonical output and canonicalizing again is a fixed point.
        /// Verifiers rely on this when they re-encode a received response.
        #[test]
        fn canonical_bytes_reencode_fixed_point(value in json_value_no_floats()) {
            let cb = CanonicalBytes::new(&value).unwrap();
            let parsed: Value = serde_json::from_slice(cb.as_bytes()).unwrap();
            let again = CanonicalBytes::new(&parsed).unwrap();
            prop_assert_eq!(cb.as_bytes(), again.as_bytes());
        }

        #[test]
        fn float_always_rejected(f in any::<f64>().prop_filter("not integer", |f| {
            f.fract() != 0.0 && f.is_finite()
        })) {
            let data = serde_json::json!({"val": f});
            prop_assert!(CanonicalBytes::new(&data).is_err());
        }
    }
}
