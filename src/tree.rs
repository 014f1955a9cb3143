// Lookups over untyped JSON trees embedded in source documents.
//
// Listing data sits at version-dependent depths, so every exact-path access
// has a structural search next to it. Object keys are visited in document
// order (serde_json `preserve_order`), which makes "first match" deterministic.

use serde_json::{Map, Value};

/// Resolves `keys` exactly from `tree`. Fails as soon as a key is missing or
/// the current node is not an object.
pub fn get_path<'a, K: AsRef<str>>(tree: &'a Value, keys: &[K]) -> Option<&'a Value> {
    keys.iter()
        .try_fold(tree, |node, key| node.as_object()?.get(key.as_ref()))
}

/// Finds `keys` anywhere in `tree`, depth-first, first match wins.
///
/// At an object holding the first key the rest of the path is resolved
/// exactly from there; if that fails (or the key is absent) every child is
/// searched with the full key list. Arrays are searched element by element.
pub fn find_nested<'a, K: AsRef<str>>(tree: &'a Value, keys: &[K]) -> Option<&'a Value> {
    let (first, rest) = keys.split_first()?;
    match tree {
        Value::Object(map) => map
            .get(first.as_ref())
            .and_then(|child| get_path(child, rest))
            .or_else(|| map.values().find_map(|child| find_nested(child, keys))),
        Value::Array(items) => items.iter().find_map(|item| find_nested(item, keys)),
        _ => None,
    }
}

/// Returns the first object, in depth-first document order, accepted by
/// `predicate`. The root itself is a candidate.
pub fn find_first_matching<'a, P>(tree: &'a Value, predicate: &P) -> Option<&'a Map<String, Value>>
where
    P: Fn(&Map<String, Value>) -> bool,
{
    match tree {
        Value::Object(map) if predicate(map) => Some(map),
        Value::Object(map) => map
            .values()
            .find_map(|child| find_first_matching(child, predicate)),
        Value::Array(items) => items
            .iter()
            .find_map(|item| find_first_matching(item, predicate)),
        _ => None,
    }
}

// Scalar accessors used by the adapters. Numbers and booleans are rendered to
// text because sources are inconsistent about quoting ids and scores.
pub fn text_at<K: AsRef<str>>(tree: &Value, keys: &[K]) -> Option<String> {
    get_path(tree, keys).and_then(scalar_text)
}

pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
