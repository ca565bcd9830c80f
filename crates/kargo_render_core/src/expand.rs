//! `${n}` placeholder expansion with captures from a branch-name pattern.

use serde_json::Value;

/// Replace every literal `${i}` in `template` with `values[i]`.
///
/// Index 0 is the whole pattern match. Placeholders without a corresponding
/// value are left untouched.
pub fn expand(template: &str, values: &[String]) -> String {
    let mut expanded = template.to_string();
    for (i, value) in values.iter().enumerate() {
        expanded = expanded.replace(&format!("${{{i}}}"), value);
    }
    expanded
}

/// Expand every string reachable in a JSON tree, in place.
///
/// This is how nested config-management settings are expanded: the typed
/// config is round-tripped through [`Value`] so new fields never need
/// bespoke traversal code.
pub fn expand_value(value: &mut Value, values: &[String]) {
    match value {
        Value::String(s) => *s = expand(s, values),
        Value::Array(items) => {
            for item in items {
                expand_value(item, values);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                expand_value(item, values);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}
