//! Content hash stamped into case-management session records as `md5`.
//!
//! Rows loaded before this crate existed were hashed from Python's
//! `json.dumps(record, sort_keys=True)`, so the serialization here reproduces
//! that byte layout: sorted keys, `", "` and `": "` separators, and every
//! character outside printable ASCII written as a `\uXXXX` escape.

use serde::Serialize;
use serde_json::{Map, Value, ser::Formatter};
use std::io;

struct SortedAsciiFormatter;

impl Formatter for SortedAsciiFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if (ch as u32) < 0x7f {
                let mut buf = [0u8; 4];
                writer.write_all(ch.encode_utf8(&mut buf).as_bytes())?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Serializes `value` the way the hash expects.
pub fn canonical_json(value: &Value) -> String {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, SortedAsciiFormatter);
    // Writing a `Value` into a Vec cannot fail.
    if sort_keys(value).serialize(&mut ser).is_err() {
        return String::new();
    }
    String::from_utf8(out).unwrap_or_default()
}

pub fn record_hash(value: &Value) -> String {
    format!("{:x}", md5::compute(canonical_json(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_layout() {
        let value = json!({"b": 1, "a": "x"});
        assert_eq!(canonical_json(&value), r#"{"a": "x", "b": 1}"#);
        assert_eq!(record_hash(&value), "19afc29426da0042fc4e8b7c6b727fdf");
    }

    #[test]
    fn test_nested_and_non_ascii() {
        let value = json!({"name": "Süresh", "data1": [{"k": null, "v": 1.5}], "n": true});
        assert_eq!(
            canonical_json(&value),
            r#"{"data1": [{"k": null, "v": 1.5}], "n": true, "name": "S\u00fcresh"}"#
        );
        assert_eq!(record_hash(&value), "be0835903c764e9bcb177e0c96393caf");
    }

    #[test]
    fn test_astral_chars_use_surrogate_pairs() {
        assert_eq!(canonical_json(&json!("🙂")), r#""\ud83d\ude42""#);
    }
}
