//! Tag-prefixed encoding of the store's small value universe (spec §3.1, §4.1).
//!
//! Layering note: the source this crate reproduces decodes a container-reference
//! tag straight through a process-wide ambient registry. Rust's module graph is
//! static, so that step is split in two here: [`decode`] only recovers the
//! referenced container's *name* (`Value::Ref`); resolving a name to a live handle
//! is a [`crate::store::registry`] concern layered above the codec. This keeps the
//! codec free of any dependency on the store, matching spec §9's redesign note that
//! references should decode "against the registry in scope, not ambient global
//! state" — here that scope is simply "whoever calls resolve next".

use std::collections::BTreeMap;

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};

use crate::errors::{Result, StoreError};

const TAG_STRING: u8 = b's';
const TAG_INT: u8 = b'i';
const TAG_BYTES: u8 = b'b';
const TAG_NULL: u8 = b'n';
const TAG_REF: u8 = b'r';

/// One of the five tagged values the store persists inside opaque container bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
    Bytes(Vec<u8>),
    Null,
    /// The *name* of a referenced container; not yet resolved to a handle.
    Ref(String),
}

impl Value {
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_ref_name(&self) -> Option<&str> {
        match self {
            Self::Ref(n) => Some(n),
            _ => None,
        }
    }
}

/// Encodes `v` as `tag_byte || payload` (spec §3.1, §4.1).
#[must_use]
pub fn encode(v: &Value) -> Vec<u8> {
    match v {
        Value::Str(s) => {
            let mut out = Vec::with_capacity(1 + s.len());
            out.push(TAG_STRING);
            out.extend_from_slice(s.as_bytes());
            out
        }
        Value::Int(i) => {
            let rendered = i.to_string();
            let mut out = Vec::with_capacity(1 + rendered.len());
            out.push(TAG_INT);
            out.extend_from_slice(rendered.as_bytes());
            out
        }
        Value::Bytes(b) => {
            let mut out = Vec::with_capacity(1 + b.len());
            out.push(TAG_BYTES);
            out.extend_from_slice(b);
            out
        }
        Value::Null => vec![TAG_NULL],
        Value::Ref(name) => {
            let mut out = Vec::with_capacity(1 + name.len());
            out.push(TAG_REF);
            out.extend_from_slice(name.as_bytes());
            out
        }
    }
}

/// Inverse of [`encode`].
///
/// # Errors
/// Returns [`StoreError::UnknownTag`] for an unrecognized leading byte, or
/// [`StoreError::StoreCorrupt`] if a string/reference/integer payload is not
/// valid UTF-8 or not a valid decimal integer.
pub fn decode(b: &[u8]) -> Result<Value> {
    let (tag, payload) = b.split_first().ok_or(StoreError::StoreCorrupt("empty encoded value".to_string()))?;
    match *tag {
        TAG_STRING => Ok(Value::Str(
            std::str::from_utf8(payload)
                .map_err(|e| StoreError::StoreCorrupt(format!("non-utf8 string value: {e}")))?
                .to_string(),
        )),
        TAG_INT => {
            let text = std::str::from_utf8(payload)
                .map_err(|e| StoreError::StoreCorrupt(format!("non-utf8 integer value: {e}")))?;
            let parsed = text
                .parse::<i64>()
                .map_err(|e| StoreError::StoreCorrupt(format!("malformed integer value {text:?}: {e}")))?;
            Ok(Value::Int(parsed))
        }
        TAG_BYTES => Ok(Value::Bytes(payload.to_vec())),
        TAG_NULL => Ok(Value::Null),
        TAG_REF => Ok(Value::Ref(
            std::str::from_utf8(payload)
                .map_err(|e| StoreError::StoreCorrupt(format!("non-utf8 reference name: {e}")))?
                .to_string(),
        )),
        other => Err(StoreError::UnknownTag(other)),
    }
}

/// Serializes a bytes→bytes sub-map for storage as a single bucketed page (spec §3.5).
///
/// # Errors
/// Returns an error if bincode serialization fails.
pub fn serialize_submap(m: &BTreeMap<Vec<u8>, Vec<u8>>) -> Result<Vec<u8>> {
    encode_to_vec(m, standard()).map_err(|e| StoreError::Codec(e.to_string()))
}

/// Inverse of [`serialize_submap`].
///
/// # Errors
/// Returns an error if the bytes are not a valid serialized sub-map.
pub fn deserialize_submap(b: &[u8]) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
    decode_from_slice(b, standard()).map(|(m, _)| m).map_err(|e| StoreError::Codec(e.to_string()))
}

/// Assigns `key` to a bucket in `[0, bucket_count)` via a fast, deterministic,
/// non-cryptographic hash (spec §3.2, §4.1).
#[must_use]
pub fn bucket(key: &[u8], bucket_count: u64) -> u64 {
    if bucket_count == 0 {
        return 0;
    }
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(key);
    u64::from(hasher.finalize()) % bucket_count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        let values = vec![
            Value::Str("hello".to_string()),
            Value::Int(-42),
            Value::Int(0),
            Value::Bytes(vec![0, 1, 2, 255]),
            Value::Null,
            Value::Ref("node_hashes".to_string()),
        ];
        for v in values {
            let encoded = encode(&v);
            let decoded = decode(&encoded).unwrap();
            assert_eq!(decoded, v);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = decode(&[b'z', 1, 2, 3]).unwrap_err();
        assert!(matches!(err, StoreError::UnknownTag(b'z')));
    }

    #[test]
    fn bucket_is_deterministic_and_bounded() {
        let b1 = bucket(b"some-key", 8);
        let b2 = bucket(b"some-key", 8);
        assert_eq!(b1, b2);
        assert!(b1 < 8);
        // Independent of key length.
        assert!(bucket(b"a", 16) < 16);
        assert!(bucket(b"a much longer key than the other one", 16) < 16);
    }

    #[test]
    fn submap_round_trips() {
        let mut m = BTreeMap::new();
        m.insert(b"k1".to_vec(), b"v1".to_vec());
        m.insert(b"k2".to_vec(), b"v2".to_vec());
        let bytes = serialize_submap(&m).unwrap();
        let back = deserialize_submap(&bytes).unwrap();
        assert_eq!(m, back);
    }
}
