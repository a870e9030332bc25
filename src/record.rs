//! Raw record representation and identity keys.
//!
//! Records travel through the pipeline as JSON objects. An [`IdentityKey`]
//! is the normalized form of a record's identity field values, so that the
//! number `1` and the string `"1"` address the same stored instance.

use std::fmt;

use serde_json::{Map, Value};

/// A single raw item as exchanged with the server.
pub type Record = Map<String, Value>;

/// Parsed list response: the raw items plus any envelope metadata.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListData {
    /// Raw items in server order.
    pub items: Vec<Record>,
    /// Envelope members other than the item list, such as `count`.
    pub meta: Record,
}

impl ListData {
    /// List data without metadata.
    #[must_use]
    pub fn new(items: Vec<Record>) -> Self {
        Self {
            items,
            meta: Record::new(),
        }
    }
}

/// Normalized identity of a record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Build a key from the values of the identity fields, in field order.
    ///
    /// A single field keys by its normalized text. Composite keys render as
    /// a JSON array of the normalized parts, so separators inside a value
    /// cannot make two identities collide.
    ///
    /// Returns `None` if any identity value is missing or `null`.
    #[must_use]
    pub fn from_values<'a>(values: impl IntoIterator<Item = Option<&'a Value>>) -> Option<Self> {
        let mut parts = Vec::new();
        for value in values {
            parts.push(normalize_identity_value(value?)?);
        }
        match parts.len() {
            0 => None,
            1 => parts.pop().map(Self),
            _ => Some(Self(
                Value::Array(parts.into_iter().map(Value::String).collect()).to_string(),
            )),
        }
    }

    /// Borrow the normalized key text.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

fn normalize_identity_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => number
            .as_i64()
            .map(|n| n.to_string())
            .or_else(|| number.as_u64().map(|n| n.to_string()))
            .or_else(|| number.as_f64().map(float_identity)),
        other => Some(other.to_string()),
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "only taken when the float is integral and in range"
)]
fn float_identity(value: f64) -> String {
    // Integral floats collide with their integer form.
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

/// Stable text form of a JSON value with object keys sorted.
///
/// Used to key in-flight requests and to compare callback payloads.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn numbers_and_numeric_strings_share_a_key() {
        let from_number = IdentityKey::from_values([Some(&json!(1))]);
        let from_string = IdentityKey::from_values([Some(&json!("1"))]);
        let from_float = IdentityKey::from_values([Some(&json!(1.0))]);
        assert_eq!(from_number, from_string);
        assert_eq!(from_number, from_float);
    }

    #[test]
    fn missing_or_null_identity_yields_none() {
        assert!(IdentityKey::from_values([None]).is_none());
        assert!(IdentityKey::from_values([Some(&Value::Null)]).is_none());
        assert!(IdentityKey::from_values(std::iter::empty()).is_none());
    }

    #[test]
    fn composite_keys_join_in_field_order() {
        let key = IdentityKey::from_values([Some(&json!("a")), Some(&json!(2))])
            .expect("composite key");
        assert_eq!(key.as_str(), r#"["a","2"]"#);
    }

    #[test]
    fn separators_inside_composite_parts_stay_distinct() {
        let split_late = IdentityKey::from_values([Some(&json!("a|b")), Some(&json!("c"))]);
        let split_early = IdentityKey::from_values([Some(&json!("a")), Some(&json!("b|c"))]);
        assert!(split_late.is_some());
        assert_ne!(split_late, split_early);

        let quoted = IdentityKey::from_values([Some(&json!(r#"a",""#)), Some(&json!("b"))]);
        let plain = IdentityKey::from_values([Some(&json!("a")), Some(&json!(r#"","b"#))]);
        assert_ne!(quoted, plain);
    }

    #[test]
    fn canonical_json_ignores_key_order() {
        let a = json!({"b": 1, "a": [1, {"y": 2, "x": 1}]});
        let b = json!({"a": [1, {"x": 1, "y": 2}], "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }
}
