//! Bracketed query-string encoding of JSON descriptors.
//!
//! Objects nest as `outer[inner]`, arrays append with `name[]`. Scalars are
//! written as their plain text; strings carry no quotes.

use serde_json::{Map, Value};

pub(super) fn encode(value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    if let Value::Object(map) = value {
        for (key, inner) in map {
            encode_into(key.clone(), inner, &mut out);
        }
    }
    out
}

fn encode_into(name: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                encode_into(format!("{name}[{key}]"), inner, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                encode_into(format!("{name}[]"), item, out);
            }
        }
        Value::Null => out.push((name, String::new())),
        Value::String(text) => out.push((name, text.clone())),
        scalar => out.push((name, scalar.to_string())),
    }
}

pub(super) fn decode<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Value
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut root = Value::Object(Map::new());
    for (key, value) in pairs {
        let segments = split_key(key.as_ref());
        insert(&mut root, &segments, Value::String(value.as_ref().to_string()));
    }
    root
}

fn split_key(key: &str) -> Vec<&str> {
    let (head, mut rest) = match key.find('[') {
        Some(open) => (&key[..open], &key[open..]),
        None => return vec![key],
    };
    let mut segments = vec![head];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            break;
        };
        segments.push(&stripped[..close]);
        rest = &stripped[close + 1..];
    }
    segments
}

fn insert(target: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *target = value;
        return;
    };
    if first.is_empty() {
        if !target.is_array() {
            *target = Value::Array(Vec::new());
        }
        if let Value::Array(items) = target {
            let mut slot = Value::Null;
            insert(&mut slot, rest, value);
            items.push(slot);
        }
        return;
    }
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        let slot = map.entry((*first).to_string()).or_insert(Value::Null);
        insert(slot, rest, value);
    }
}
