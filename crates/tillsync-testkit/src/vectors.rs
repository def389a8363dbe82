//! Canonical JSON vectors.
//!
//! Stored checksums are only comparable if the canonical encoding never
//! drifts. Each vector pins one input to its exact canonical rendering.

use serde_json::Value;

use tillsync_core::{canonical_bytes, Checksum};

/// Blake3 of the empty input.
pub const EMPTY_BLAKE3: &str = "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262";

/// A canonical encoding test vector.
#[derive(Debug, Clone)]
pub struct CanonicalVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// JSON input, as a caller might have written it.
    pub input: &'static str,
    /// Expected canonical rendering.
    pub canonical: &'static str,
}

impl CanonicalVector {
    pub fn value(&self) -> Value {
        serde_json::from_str(self.input).unwrap_or(Value::Null)
    }

    /// Canonical rendering of `input`, as a string.
    pub fn encode(&self) -> String {
        String::from_utf8(canonical_bytes(&self.value())).unwrap_or_default()
    }

    pub fn checksum(&self) -> Checksum {
        Checksum::of_value(&self.value())
    }
}

/// Get all canonical vectors.
pub fn all_vectors() -> Vec<CanonicalVector> {
    vec![
        CanonicalVector {
            name: "empty object",
            input: "{}",
            canonical: "{}",
        },
        CanonicalVector {
            name: "keys sorted",
            input: r#"{"sku": "A-1", "name": "Coffee", "priceCents": 350}"#,
            canonical: r#"{"name":"Coffee","priceCents":350,"sku":"A-1"}"#,
        },
        CanonicalVector {
            name: "nested objects sorted at every depth",
            input: r#"{"z": {"b": 2, "a": 1}, "a": [{"y": null, "x": true}]}"#,
            canonical: r#"{"a":[{"x":true,"y":null}],"z":{"a":1,"b":2}}"#,
        },
        CanonicalVector {
            name: "array order preserved",
            input: r#"[3, 1, 2]"#,
            canonical: "[3,1,2]",
        },
        CanonicalVector {
            name: "byte order, uppercase first",
            input: r#"{"b": 1, "B": 2, "a": 3, "_": 4}"#,
            canonical: r#"{"B":2,"_":4,"a":3,"b":1}"#,
        },
        CanonicalVector {
            name: "string escapes",
            input: r#"{"note": "line\nbreak \"quoted\""}"#,
            canonical: r#"{"note":"line\nbreak \"quoted\""}"#,
        },
        CanonicalVector {
            name: "numbers",
            input: r#"{"neg": -42, "float": 1.5, "zero": 0}"#,
            canonical: r#"{"float":1.5,"neg":-42,"zero":0}"#,
        },
        CanonicalVector {
            name: "sale",
            input: r#"{
                "id": "s-1",
                "totalCents": 800,
                "items": [
                    {"unitCents": 350, "quantity": 2, "productId": "p-1"},
                    {"unitCents": 100, "quantity": 1, "productId": "p-2"}
                ]
            }"#,
            canonical: concat!(
                r#"{"id":"s-1","items":["#,
                r#"{"productId":"p-1","quantity":2,"unitCents":350},"#,
                r#"{"productId":"p-2","quantity":1,"unitCents":100}"#,
                r#"],"totalCents":800}"#
            ),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vectors_encode_canonically() {
        for vector in all_vectors() {
            assert_eq!(vector.encode(), vector.canonical, "vector: {}", vector.name);
        }
    }

    #[test]
    fn test_canonical_form_is_a_fixed_point() {
        for vector in all_vectors() {
            let reparsed: Value = serde_json::from_str(vector.canonical).unwrap();
            assert_eq!(
                Checksum::of_value(&reparsed),
                vector.checksum(),
                "vector: {}",
                vector.name
            );
        }
    }

    #[test]
    fn test_empty_hash() {
        assert_eq!(Checksum::of_bytes(b"").as_str(), EMPTY_BLAKE3);
    }
}
