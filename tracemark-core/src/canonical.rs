//! Canonical serialization and content digests.
//!
//! The canonical form of a JSON value is defined recursively:
//!
//! - `null`, booleans, numbers and strings use a fixed literal encoding
//! - arrays are `[` + comma-joined canonical elements in original order + `]`
//! - objects are `{` + comma-joined `"key":canonical(value)` pairs with keys
//!   sorted + `}`
//!
//! No whitespace is emitted. The literal encoding is byte-identical to
//! ECMAScript `JSON.stringify`, and keys sort by UTF-16 code units (the
//! ECMAScript default sort), so a browser client computing
//! `sha256(stableStringify(value))` arrives at the same digest.
//!
//! ```
//! use serde_json::json;
//! use tracemark_core::canonical::{canonicalize_value, digest_value};
//!
//! let a = json!({"b": 2, "a": 1});
//! assert_eq!(canonicalize_value(&a), r#"{"a":1,"b":2}"#);
//! assert_eq!(
//!     digest_value(&a).to_hex(),
//!     "43258cff783fe7036d8a43033f830adfc60ec037382473548ac742b888292777"
//! );
//! ```

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::digest::{sha256, Digest};
use crate::error::{Error, Result};

/// Canonical form of a JSON value.
pub fn canonicalize_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Canonical form of any serializable value.
///
/// Fails only if the value cannot be represented as JSON (for example a map
/// with non-string keys).
pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)
        .map_err(|e| Error::invalid_payload(format!("not representable as JSON: {}", e)))?;
    Ok(canonicalize_value(&value))
}

/// SHA-256 over the UTF-8 bytes of the canonical form.
pub fn digest_value(value: &Value) -> Digest {
    sha256(canonicalize_value(value).as_bytes())
}

/// Digest of any serializable value.
pub fn digest<T: Serialize + ?Sized>(value: &T) -> Result<Digest> {
    Ok(sha256(canonicalize(value)?.as_bytes()))
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(n, out),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => write_object(map, out),
    }
}

fn write_object(map: &Map<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(key, out);
        out.push(':');
        if let Some(v) = map.get(key) {
            write_value(v, out);
        }
    }
    out.push('}');
}

fn write_number(n: &Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
    } else if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
    } else if let Some(f) = n.as_f64() {
        write_float(f, out);
    }
}

/// ECMAScript Number::toString for finite values.
fn write_float(f: f64, out: &mut String) {
    let abs = f.abs();
    if f == 0.0 {
        // Covers -0.0, which JSON.stringify renders as "0".
        out.push('0');
    } else if f.fract() == 0.0 && abs < 1e21 {
        out.push_str(&format!("{:.0}", f));
    } else if (1e-6..1e21).contains(&abs) {
        out.push_str(&format!("{}", f));
    } else {
        let exp = format!("{:e}", f);
        match exp.split_once('e') {
            Some((mantissa, power)) if !power.starts_with('-') => {
                out.push_str(mantissa);
                out.push_str("e+");
                out.push_str(power);
            }
            _ => out.push_str(&exp),
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insertion_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(canonicalize_value(&a), canonicalize_value(&b));
        assert_eq!(digest_value(&a), digest_value(&b));
    }

    #[test]
    fn test_known_answer_vectors() {
        assert_eq!(
            digest_value(&json!({"a": 1})).to_hex(),
            "015abd7f5cc57a2dd94b7590f04ad8084273905ee33ec5cebeae62276a97f862"
        );
        assert_eq!(
            digest_value(&json!({"a": 2})).to_hex(),
            "7e8059f495589fcd981232cc11d00b00da3802c01d688fa1cf1f6bed6e5bb33c"
        );
        assert_eq!(
            digest_value(&json!({"b": {"d": 1, "c": [2, 1]}, "a": "x"})).to_hex(),
            "9485795dd2e31a4134702cc8889e292fa1f69e268326c2988ca687fbc981ea48"
        );
        assert_eq!(
            digest_value(&json!({"item_id": "xwing1", "payload": [1, "two", null, true]})).to_hex(),
            "11b37e40a3025741a2ea5e098ffde38d26ce2e524fd627122185f51c9a37acde"
        );
        assert_eq!(
            digest_value(&Value::Null).to_hex(),
            "74234e98afe7498fb5daf1f36ac2d78acc339464f950703b8c019892f982b90b"
        );
    }

    #[test]
    fn test_nested_structure() {
        let v = json!({"z": [{"y": 1, "x": null}], "a": {"c": true, "b": false}});
        assert_eq!(
            canonicalize_value(&v),
            r#"{"a":{"b":false,"c":true},"z":[{"x":null,"y":1}]}"#
        );
    }

    #[test]
    fn test_arrays_keep_order() {
        assert_ne!(
            canonicalize_value(&json!([1, 2])),
            canonicalize_value(&json!([2, 1]))
        );
    }

    #[test]
    fn test_float_encoding_matches_ecmascript() {
        assert_eq!(canonicalize_value(&json!(1.0)), "1");
        assert_eq!(canonicalize_value(&json!(-0.0)), "0");
        assert_eq!(canonicalize_value(&json!(1.5)), "1.5");
        assert_eq!(canonicalize_value(&json!(0.1)), "0.1");
        assert_eq!(canonicalize_value(&json!(0.000001)), "0.000001");
        assert_eq!(canonicalize_value(&json!(1e-7)), "1e-7");
        assert_eq!(canonicalize_value(&json!(1e21)), "1e+21");
        assert_eq!(canonicalize_value(&json!(-2.5e22)), "-2.5e+22");
        assert_eq!(
            digest_value(&json!({"qty": 1, "price": 1.5})).to_hex(),
            "b8aef58f8151a31a08c0e36cc9671d035f37f3c926d0fef8e76c61ba3426a9e0"
        );
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(
            canonicalize_value(&json!("a\"b\\c\nd\te\u{01}")),
            r#""a\"b\\c\nd\te\u0001""#
        );
        assert_eq!(canonicalize_value(&json!("caf\u{e9}")), "\"caf\u{e9}\"");
    }

    #[test]
    fn test_keys_sort_by_utf16_code_units() {
        // U+FF61 precedes U+1F600 by code point but follows its surrogate pair.
        let v = json!({"\u{1F600}": 1, "\u{FF61}": 2});
        assert_eq!(canonicalize_value(&v), "{\"\u{1F600}\":1,\"\u{FF61}\":2}");
    }

    #[test]
    fn test_canonicalize_serializable() {
        #[derive(Serialize)]
        struct Memo<'a> {
            item_id: &'a str,
            event_type: &'a str,
        }
        let memo = Memo {
            item_id: "xwing1",
            event_type: "METADATA_UPDATED",
        };
        assert_eq!(
            canonicalize(&memo).unwrap(),
            r#"{"event_type":"METADATA_UPDATED","item_id":"xwing1"}"#
        );
    }

    #[test]
    fn test_non_string_map_keys_rejected() {
        let mut m = std::collections::BTreeMap::new();
        m.insert(vec![1u8], 1);
        assert!(canonicalize(&m).is_err());
    }
}
