pub mod ccp;
pub mod media;
pub mod mlhp;
pub mod rest;

use crate::error::SourceError;
use serde_json::Value;

/// Decodes a response body that must be JSON.
pub(crate) async fn json_body(url: &str, resp: reqwest::Response) -> Result<Value, SourceError> {
    let text = resp.text().await.map_err(crate::http::unavailable(url))?;
    serde_json::from_str(&text).map_err(|e| SourceError::Malformed {
        url: url.to_string(),
        message: format!("invalid JSON: {e}"),
    })
}

/// Parses an integer field that upstream APIs send either as a number or as a
/// numeric string. Empty strings become null.
pub(crate) fn coerce_int(value: &Value) -> Value {
    match value {
        Value::String(s) if s.trim().is_empty() => Value::Null,
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .map(|f| Value::from(f as i64))
            .unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

/// Re-encodes a nested JSON value as a string column.
pub(crate) fn dump_json(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(_) => value.clone(),
        other => Value::String(crate::hash::canonical_json(other)),
    }
}
