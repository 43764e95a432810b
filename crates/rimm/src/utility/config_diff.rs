//! # Config Diffs
//!
//! Hyperparameter sets are compared through their `serde_json` form, so any
//! `Config` can be diffed without requiring `PartialEq`.

use serde::Serialize;
use serde_json::{Map, Value};

/// Serialize a config to a JSON value.
pub fn config_value<C: Serialize>(config: &C) -> Result<Value, serde_json::Error> {
    serde_json::to_value(config)
}

/// Dotted paths at which two JSON values differ.
///
/// Objects are walked key by key; arrays and scalars are compared whole.
/// The root path is the empty string.
pub fn value_diff(
    expected: &Value,
    actual: &Value,
) -> Vec<String> {
    fn walk(
        path: &str,
        expected: &Value,
        actual: &Value,
        out: &mut Vec<String>,
    ) {
        match (expected, actual) {
            (Value::Object(e), Value::Object(a)) => walk_objects(path, e, a, out),
            (e, a) if e == a => {}
            _ => out.push(path.to_string()),
        }
    }

    fn walk_objects(
        path: &str,
        expected: &Map<String, Value>,
        actual: &Map<String, Value>,
        out: &mut Vec<String>,
    ) {
        let extra = actual.keys().filter(|k| !expected.contains_key(*k));
        for key in expected.keys().chain(extra) {
            let child = if path.is_empty() {
                key.clone()
            } else {
                format!("{path}.{key}")
            };
            match (expected.get(key), actual.get(key)) {
                (Some(e), Some(a)) => walk(&child, e, a, out),
                _ => out.push(child),
            }
        }
    }

    let mut out = Vec::new();
    walk("", expected, actual, &mut out);
    out
}

/// Top-level fields at which two configs differ, skipping `ignored` fields.
///
/// A nested difference is reported under its top-level field name.
pub fn mismatched_fields(
    expected: &Value,
    actual: &Value,
    ignored: &[&str],
) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for path in value_diff(expected, actual) {
        let field = path.split('.').next().unwrap_or_default().to_string();
        if ignored.contains(&field.as_str()) || fields.contains(&field) {
            continue;
        }
        fields.push(field);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_diff() {
        let a = json!({"dim": 48, "blocks": [6, 6, 12], "act": {"PRelu": {"alpha": 0.25}}});
        let b = json!({"dim": 48, "blocks": [6, 6, 8], "act": {"PRelu": {"alpha": 0.5}}, "x": 1});
        assert_eq!(value_diff(&a, &a), Vec::<String>::new());
        let mut diff = value_diff(&a, &b);
        diff.sort();
        assert_eq!(diff, vec!["act.PRelu.alpha", "blocks", "x"]);
        assert_eq!(value_diff(&json!(1), &json!(2)), vec![""]);
    }

    #[test]
    fn test_mismatched_fields() {
        let a = json!({"dim": 48, "factor": 2.66, "act": {"PRelu": {"alpha": 0.25}}});
        let b = json!({"dim": 32, "factor": 2.5, "act": {"PRelu": {"alpha": 0.5}}});
        let mut fields = mismatched_fields(&a, &b, &[]);
        fields.sort();
        assert_eq!(fields, vec!["act", "dim", "factor"]);
        assert_eq!(mismatched_fields(&a, &b, &["factor", "act"]), vec!["dim"]);
    }

    #[test]
    fn test_config_value() {
        #[derive(Serialize)]
        struct Sample {
            a: usize,
            b: Vec<bool>,
        }
        let value = config_value(&Sample {
            a: 3,
            b: vec![true],
        })
        .unwrap();
        assert_eq!(value, json!({"a": 3, "b": [true]}));
    }
}
