//! Label merge algebra.
//!
//! A label is either a JSON object or a hierarchical attribute list of the
//! form `key=v1,v2:key2=v3`. Merging two labels of the same shape follows
//! one of three policies; mixed shapes fall back to the attribute-list
//! rules with each whole label treated as opaque text. Output ordering is
//! deterministic: JSON objects serialize with sorted keys, attribute lists
//! keep first-seen key order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergePolicy {
    /// Keep everything from both sides; conflicting scalars collect into
    /// arrays.
    Union,
    /// Keep only keys both sides agree on.
    Intersect,
    /// Incoming wins per key; existing-only keys survive.
    Replace,
}

/// Merge two label strings under `policy`.
pub fn merge_label(existing: &str, incoming: &str, policy: MergePolicy) -> String {
    if existing.is_empty() {
        return incoming.to_string();
    }
    if incoming.is_empty() {
        return existing.to_string();
    }

    match (parse_object(existing), parse_object(incoming)) {
        (Some(a), Some(b)) => {
            let merged = merge_objects(a, b, policy);
            // Map with sorted keys; serialization cannot fail for plain
            // JSON values.
            serde_json::to_string(&Value::Object(merged)).unwrap_or_default()
        }
        _ => merge_attr_lists(existing, incoming, policy),
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str(text) {
        Ok(Value::Object(m)) => Some(m),
        _ => None,
    }
}

fn merge_objects(a: Map<String, Value>, mut b: Map<String, Value>, policy: MergePolicy) -> Map<String, Value> {
    let mut out = Map::new();
    match policy {
        MergePolicy::Union => {
            for (k, va) in a {
                match b.remove(&k) {
                    Some(vb) => out.insert(k, union_values(va, vb)),
                    None => out.insert(k, va),
                };
            }
            for (k, vb) in b {
                out.insert(k, vb);
            }
        }
        MergePolicy::Intersect => {
            for (k, va) in a {
                if let Some(vb) = b.remove(&k) {
                    match (va, vb) {
                        (Value::Object(oa), Value::Object(ob)) => {
                            let inner = merge_objects(oa, ob, policy);
                            if !inner.is_empty() {
                                out.insert(k, Value::Object(inner));
                            }
                        }
                        (va, vb) if va == vb => {
                            out.insert(k, va);
                        }
                        _ => {}
                    }
                }
            }
        }
        MergePolicy::Replace => {
            for (k, va) in a {
                match b.remove(&k) {
                    Some(vb) => match (va, vb) {
                        (Value::Object(oa), Value::Object(ob)) => {
                            out.insert(k, Value::Object(merge_objects(oa, ob, policy)));
                        }
                        (_, vb) => {
                            out.insert(k, vb);
                        }
                    },
                    None => {
                        out.insert(k, va);
                    }
                }
            }
            for (k, vb) in b {
                out.insert(k, vb);
            }
        }
    }
    out
}

fn union_values(a: Value, b: Value) -> Value {
    match (a, b) {
        (a, b) if a == b => a,
        (Value::Object(oa), Value::Object(ob)) => {
            Value::Object(merge_objects(oa, ob, MergePolicy::Union))
        }
        (Value::Array(mut xs), Value::Array(ys)) => {
            for y in ys {
                if !xs.contains(&y) {
                    xs.push(y);
                }
            }
            Value::Array(xs)
        }
        (Value::Array(mut xs), b) => {
            if !xs.contains(&b) {
                xs.push(b);
            }
            Value::Array(xs)
        }
        (a, Value::Array(ys)) => {
            let mut xs = vec![a];
            for y in ys {
                if !xs.contains(&y) {
                    xs.push(y);
                }
            }
            Value::Array(xs)
        }
        (a, b) => Value::Array(vec![a, b]),
    }
}

/// Parsed attribute list: keys in first-seen order, each with its values
/// in first-seen order.
fn parse_attrs(text: &str) -> Vec<(String, Vec<String>)> {
    let mut out: Vec<(String, Vec<String>)> = Vec::new();
    for part in text.split(':').filter(|p| !p.is_empty()) {
        let (key, values) = match part.split_once('=') {
            Some((k, v)) => (k.to_string(), v.split(',').map(str::to_string).collect()),
            // A bare word is a key with no values.
            None => (part.to_string(), Vec::new()),
        };
        match out.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => {
                for v in values {
                    if !existing.contains(&v) {
                        existing.push(v);
                    }
                }
            }
            None => out.push((key, values)),
        }
    }
    out
}

fn format_attrs(attrs: &[(String, Vec<String>)]) -> String {
    attrs
        .iter()
        .map(|(k, vs)| {
            if vs.is_empty() {
                k.clone()
            } else {
                format!("{}={}", k, vs.join(","))
            }
        })
        .collect::<Vec<_>>()
        .join(":")
}

fn merge_attr_lists(existing: &str, incoming: &str, policy: MergePolicy) -> String {
    let a = parse_attrs(existing);
    let mut b = parse_attrs(incoming);
    let mut out: Vec<(String, Vec<String>)> = Vec::new();

    let take = |b: &mut Vec<(String, Vec<String>)>, key: &str| -> Option<Vec<String>> {
        b.iter()
            .position(|(k, _)| k == key)
            .map(|i| b.remove(i).1)
    };

    match policy {
        MergePolicy::Union => {
            for (k, mut vs) in a {
                if let Some(bv) = take(&mut b, &k) {
                    for v in bv {
                        if !vs.contains(&v) {
                            vs.push(v);
                        }
                    }
                }
                out.push((k, vs));
            }
            out.extend(b);
        }
        MergePolicy::Intersect => {
            for (k, vs) in a {
                if let Some(bv) = take(&mut b, &k) {
                    let common: Vec<String> =
                        vs.into_iter().filter(|v| bv.contains(v)).collect();
                    if !common.is_empty() {
                        out.push((k, common));
                    }
                }
            }
        }
        MergePolicy::Replace => {
            for (k, vs) in a {
                match take(&mut b, &k) {
                    Some(bv) => out.push((k, bv)),
                    None => out.push((k, vs)),
                }
            }
            out.extend(b);
        }
    }
    format_attrs(&out)
}
