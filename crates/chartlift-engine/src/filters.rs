//! Helm-flavoured template filters and functions
//!
//! Only the helpers charts commonly lean on when building image strings
//! and container specs are provided.

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};

fn invalid(e: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::InvalidOperation, e.to_string())
}

/// Convert a value to YAML format
///
/// Usage: {{ values.resources | toyaml }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    let json: serde_json::Value = serde_json::to_value(&value).map_err(invalid)?;
    let yaml = serde_yaml::to_string(&json).map_err(invalid)?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Convert a value to compact JSON
///
/// Usage: {{ values.annotations | tojson }}
pub fn tojson(value: Value) -> Result<String, Error> {
    let json: serde_json::Value = serde_json::to_value(&value).map_err(invalid)?;
    serde_json::to_string(&json).map_err(invalid)
}

/// Usage: {{ secret | b64encode }}
#[must_use]
pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

/// Quote a string with double quotes
///
/// Usage: {{ values.image.tag | quote }}
#[must_use]
pub fn quote(value: Value) -> String {
    let s = value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string());
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Indent every non-empty line, prefixed by a newline
///
/// Usage: {{ values.env | toyaml | nindent(12) }}
#[must_use]
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// Indent every non-empty line
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fail rendering when a value is missing or empty
///
/// Usage: {{ values.image.repository | required("image.repository is required") }}
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined()
        || value.is_none()
        || value.as_str().is_some_and(|s| s.is_empty());
    if missing {
        let msg = message.unwrap_or_else(|| "required value is missing".to_string());
        return Err(Error::new(ErrorKind::InvalidOperation, msg));
    }
    Ok(value)
}

/// Usage: {{ name | trunc(63) }}
pub fn trunc(value: String, length: usize) -> String {
    value.chars().take(length).collect()
}

/// Usage: {{ tag | trimprefix("v") }}
pub fn trimprefix(value: String, prefix: String) -> String {
    value.strip_prefix(&prefix).unwrap_or(&value).to_string()
}

/// Usage: {{ name | trimsuffix("-") }}
pub fn trimsuffix(value: String, suffix: String) -> String {
    value.strip_suffix(&suffix).unwrap_or(&value).to_string()
}

/// SHA256 hex digest, often used for checksum annotations
pub fn sha256sum(value: String) -> String {
    use sha2::{Digest, Sha256};
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

/// Return the first non-empty argument
///
/// Usage: {{ coalesce(values.image.tag, chart.appVersion) }}
pub fn coalesce(args: Vec<Value>) -> Value {
    args.into_iter()
        .find(|arg| {
            !arg.is_undefined() && !arg.is_none() && !arg.as_str().is_some_and(|s| s.is_empty())
        })
        .unwrap_or(Value::UNDEFINED)
}

/// Usage: {{ ternary("a", "b", condition) }}
pub fn ternary(true_val: Value, false_val: Value, condition: Value) -> Value {
    if condition.is_true() { true_val } else { false_val }
}

/// Usage: {{ fail("unsupported mode") }}
pub fn fail(message: String) -> Result<Value, Error> {
    Err(Error::new(ErrorKind::InvalidOperation, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toyaml() {
        let value = Value::from_serialize(serde_json::json!({"name": "web", "port": 8080}));
        let yaml = toyaml(value).unwrap();
        assert!(yaml.contains("name: web"));
        assert!(yaml.contains("port: 8080"));
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote(Value::from("1.0")), "\"1.0\"");
        assert_eq!(quote(Value::from(3)), "\"3\"");
    }

    #[test]
    fn test_nindent() {
        assert_eq!(nindent("a\n\nb".to_string(), 2), "\n  a\n\n  b");
    }

    #[test]
    fn test_required() {
        assert!(required(Value::from("nginx"), None).is_ok());
        assert!(required(Value::UNDEFINED, None).is_err());
        assert!(required(Value::from(""), Some("needed".into())).is_err());
    }

    #[test]
    fn test_coalesce() {
        let v = coalesce(vec![Value::UNDEFINED, Value::from(""), Value::from("1.2")]);
        assert_eq!(v.as_str(), Some("1.2"));
        assert!(coalesce(vec![]).is_undefined());
    }

    #[test]
    fn test_trim_and_trunc() {
        assert_eq!(trimprefix("v1.0".into(), "v".into()), "1.0");
        assert_eq!(trimsuffix("app-".into(), "-".into()), "app");
        assert_eq!(trunc("abcdef".into(), 3), "abc");
    }
}
