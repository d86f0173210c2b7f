//! Named-argument extraction for template functions.
//!
//! Tera calls functions with named arguments only (`image(ref="base")`).
//! These helpers turn a missing or mistyped argument into an error that names
//! both the function and the argument.

use tera::Value;

use crate::registry::Args;

fn missing(function: &str, key: &str) -> tera::Error {
    tera::Error::msg(format!("`{function}` requires argument `{key}`"))
}

fn mistyped(function: &str, key: &str, expected: &str, got: &Value) -> tera::Error {
    tera::Error::msg(format!(
        "`{function}` argument `{key}` must be {expected}, got {got}"
    ))
}

/// A required string argument.
pub fn string(args: &Args, function: &str, key: &str) -> tera::Result<String> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(mistyped(function, key, "a string", other)),
        None => Err(missing(function, key)),
    }
}

/// A required integer argument.
pub fn int(args: &Args, function: &str, key: &str) -> tera::Result<i64> {
    match args.get(key) {
        Some(value) => value
            .as_i64()
            .ok_or_else(|| mistyped(function, key, "an integer", value)),
        None => Err(missing(function, key)),
    }
}

/// A required list argument.
pub fn list(args: &Args, function: &str, key: &str) -> tera::Result<Vec<Value>> {
    match args.get(key) {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(mistyped(function, key, "a list", other)),
        None => Err(missing(function, key)),
    }
}

/// A required list-of-strings argument. A single string is accepted as a
/// one-element list.
pub fn string_list(args: &Args, function: &str, key: &str) -> tera::Result<Vec<String>> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(mistyped(function, key, "a list of strings", other)),
            })
            .collect(),
        Some(other) => Err(mistyped(function, key, "a list of strings", other)),
        None => Err(missing(function, key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, Value)]) -> Args {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn string_present() {
        let a = args(&[("ref", Value::from("base"))]);
        assert_eq!(string(&a, "image", "ref").unwrap(), "base");
    }

    #[test]
    fn string_missing_names_function_and_key() {
        let err = string(&Args::new(), "image", "ref").unwrap_err();
        assert!(err.to_string().contains("`image`"));
        assert!(err.to_string().contains("`ref`"));
    }

    #[test]
    fn int_rejects_strings() {
        let a = args(&[("version", Value::from("15"))]);
        assert!(int(&a, "postgres_url", "version").is_err());
        let a = args(&[("version", Value::from(15))]);
        assert_eq!(int(&a, "postgres_url", "version").unwrap(), 15);
    }

    #[test]
    fn string_list_accepts_single_string() {
        let a = args(&[("names", Value::from("busybox"))]);
        assert_eq!(string_list(&a, "alpine_packages", "names").unwrap(), vec!["busybox"]);
    }

    #[test]
    fn string_list_rejects_mixed_items() {
        let a = args(&[("names", serde_json::json!(["a", 1]))]);
        assert!(string_list(&a, "alpine_packages", "names").is_err());
    }

    #[test]
    fn list_passes_through() {
        let a = args(&[("items", serde_json::json!([1, "b"]))]);
        assert_eq!(list(&a, "arr", "items").unwrap().len(), 2);
    }
}
