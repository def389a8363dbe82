//! Canonical JSON encoding and content checksums.
//!
//! Records are hashed over a deterministic JSON rendering of their data:
//! - Object keys sorted by byte comparison, at every depth
//! - No insignificant whitespace
//! - Strings and numbers rendered by `serde_json`
//!
//! The encoding only has to be stable for this engine's own reads and writes;
//! it is used to detect storage corruption, not for security.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::Result;

/// Encode a JSON value to canonical bytes.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Serialize any value and encode it canonically.
pub fn canonical_bytes_of<T: Serialize>(data: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(data)?;
    Ok(canonical_bytes(&value))
}

fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => buf.extend_from_slice(b"null"),
        Value::Bool(true) => buf.extend_from_slice(b"true"),
        Value::Bool(false) => buf.extend_from_slice(b"false"),
        Value::Number(n) => buf.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => encode_string(buf, s),
        Value::Array(items) => {
            buf.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                encode_value_to(buf, item);
            }
            buf.push(b']');
        }
        Value::Object(map) => {
            // Sort explicitly: serde_json may be built with `preserve_order`.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            buf.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                encode_string(buf, key);
                buf.push(b':');
                encode_value_to(buf, item);
            }
            buf.push(b'}');
        }
    }
}

fn encode_string(buf: &mut Vec<u8>, s: &str) {
    // Writing a &str into a Vec cannot fail.
    let _ = serde_json::to_writer(&mut *buf, s);
}

/// Content hash of a record's data, rendered as lowercase hex.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Blake3 of raw bytes.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(blake3::hash(bytes).as_bytes()))
    }

    /// Checksum of a JSON value's canonical encoding.
    pub fn of_value(value: &Value) -> Self {
        Self::of_bytes(&canonical_bytes(value))
    }

    /// Checksum of any serializable data.
    pub fn of_data<T: Serialize>(data: &T) -> Result<Self> {
        Ok(Self::of_bytes(&canonical_bytes_of(data)?))
    }

    /// Wrap a checksum read back from storage.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.0.get(..16).unwrap_or(&self.0);
        write!(f, "Checksum({})", short)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_at_every_depth() {
        let value = json!({"b": 1, "a": {"z": true, "y": null}, "c": [ {"k": 2, "j": 1} ]});
        let bytes = canonical_bytes(&value);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"y":null,"z":true},"b":1,"c":[{"j":1,"k":2}]}"#
        );
    }

    #[test]
    fn test_strings_escaped() {
        let value = json!({"name": "Caf\u{e9} \"Bar\"\n"});
        let bytes = canonical_bytes(&value);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "{\"name\":\"Caf\u{e9} \\\"Bar\\\"\\n\"}"
        );
    }

    #[test]
    fn test_checksum_ignores_key_order() {
        let a = json!({"sku": "A-1", "price": 250});
        let b = json!({"price": 250, "sku": "A-1"});
        assert_eq!(Checksum::of_value(&a), Checksum::of_value(&b));
    }

    #[test]
    fn test_checksum_detects_change() {
        let a = json!({"sku": "A-1", "price": 250});
        let b = json!({"sku": "A-1", "price": 251});
        assert_ne!(Checksum::of_value(&a), Checksum::of_value(&b));
        assert_eq!(Checksum::of_value(&a).as_str().len(), 64);
    }
}
