//! Typed-attribute JSON envelope.
//!
//! Item attributes travel as `{ "<name>": { "<kind>": <value> } }` with kinds
//! `N` (number), `S` (string), `B` (base64 blob), `BOOL` and `TS`
//! (`"sec:nsec"`). Integers render decimal and floats scientific, both under
//! the `N` kind; decoding tries the integer reading first.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Value};

use crate::error::{Result, V3ioError};

/// A single attribute value in one of the six supported kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Signed 64-bit integer, rendered decimal under kind `N`.
    Int(i64),
    /// Double-precision float, rendered scientific under kind `N`.
    Float(f64),
    /// UTF-8 string, kind `S`.
    Str(String),
    /// Opaque byte blob, base64 under kind `B`.
    Bytes(Vec<u8>),
    /// Boolean, kind `BOOL`.
    Bool(bool),
    /// Timestamp at nanosecond resolution, kind `TS` as `"sec:nsec"`.
    Timestamp {
        /// Seconds since the Unix epoch.
        secs: i64,
        /// Nanosecond remainder.
        nanos: u32,
    },
}

/// A map from attribute name to typed value.
pub type Item = HashMap<String, AttrValue>;

impl AttrValue {
    /// Encodes this value into its `{kind: rendered}` envelope.
    pub fn to_envelope(&self) -> Value {
        let (kind, rendered) = match self {
            AttrValue::Int(v) => ("N", Value::String(v.to_string())),
            AttrValue::Float(v) => ("N", Value::String(format!("{v:E}"))),
            AttrValue::Str(v) => ("S", Value::String(v.clone())),
            AttrValue::Bytes(v) => ("B", Value::String(BASE64.encode(v))),
            AttrValue::Bool(v) => ("BOOL", Value::Bool(*v)),
            AttrValue::Timestamp { secs, nanos } => ("TS", Value::String(format!("{secs}:{nanos}"))),
        };

        let mut envelope = Map::with_capacity(1);
        envelope.insert(kind.to_string(), rendered);
        Value::Object(envelope)
    }

    /// Decodes a `{kind: rendered}` envelope back into a native value.
    pub fn from_envelope(name: &str, envelope: &Map<String, Value>) -> Result<Self> {
        let type_error = |kind: &str, value: &Value| {
            V3ioError::MalformedAttribute(format!(
                "stated type '{kind}' for attribute '{name}' does not match payload {value}"
            ))
        };

        if let Some(value) = envelope.get("N") {
            let number = value.as_str().ok_or_else(|| type_error("N", value))?;
            if let Ok(int_value) = number.parse::<i64>() {
                return Ok(AttrValue::Int(int_value));
            }
            let float_value = number.parse::<f64>().map_err(|_| {
                V3ioError::MalformedAttribute(format!(
                    "value for '{name}' is neither int nor float: {number}"
                ))
            })?;
            return Ok(AttrValue::Float(float_value));
        }

        if let Some(value) = envelope.get("S") {
            let string = value.as_str().ok_or_else(|| type_error("S", value))?;
            return Ok(AttrValue::Str(string.to_string()));
        }

        if let Some(value) = envelope.get("B") {
            let encoded = value.as_str().ok_or_else(|| type_error("B", value))?;
            let bytes = BASE64.decode(encoded).map_err(|e| {
                V3ioError::MalformedAttribute(format!("invalid base64 for '{name}': {e}"))
            })?;
            return Ok(AttrValue::Bytes(bytes));
        }

        if let Some(value) = envelope.get("BOOL") {
            let boolean = value.as_bool().ok_or_else(|| type_error("BOOL", value))?;
            return Ok(AttrValue::Bool(boolean));
        }

        if let Some(value) = envelope.get("TS") {
            let timestamp = value.as_str().ok_or_else(|| type_error("TS", value))?;
            let (secs, nanos) = timestamp.split_once(':').ok_or_else(|| {
                V3ioError::MalformedAttribute(format!(
                    "incorrect format of timestamp value: {timestamp}"
                ))
            })?;
            let secs = secs.parse::<i64>().map_err(|e| {
                V3ioError::MalformedAttribute(format!("timestamp seconds for '{name}': {e}"))
            })?;
            let nanos = nanos.parse::<u32>().map_err(|e| {
                V3ioError::MalformedAttribute(format!("timestamp nanos for '{name}': {e}"))
            })?;
            return Ok(AttrValue::Timestamp { secs, nanos });
        }

        Err(V3ioError::MalformedAttribute(format!(
            "attribute '{name}' carries no supported kind"
        )))
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl From<Vec<u8>> for AttrValue {
    fn from(v: Vec<u8>) -> Self {
        AttrValue::Bytes(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

/// Encodes an item into its typed-attribute JSON object.
///
/// `{"age": 30, "name": "foo"}` becomes
/// `{"age": {"N": "30"}, "name": {"S": "foo"}}`.
pub fn encode_item(item: &Item) -> Value {
    let mut typed = Map::with_capacity(item.len());
    for (name, value) in item {
        typed.insert(name.clone(), value.to_envelope());
    }
    Value::Object(typed)
}

/// Decodes a typed-attribute JSON object back into an item.
pub fn decode_item(typed: &Map<String, Value>) -> Result<Item> {
    let mut item = Item::with_capacity(typed.len());
    for (name, envelope) in typed {
        let envelope = envelope.as_object().ok_or_else(|| {
            V3ioError::MalformedAttribute(format!("attribute '{name}' is not an envelope object"))
        })?;
        item.insert(name.clone(), AttrValue::from_envelope(name, envelope)?);
    }
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: AttrValue) -> AttrValue {
        let mut item = Item::new();
        item.insert("a".to_string(), value);
        let encoded = encode_item(&item);
        let decoded = decode_item(encoded.as_object().unwrap()).unwrap();
        decoded.into_iter().next().unwrap().1
    }

    #[test]
    fn test_roundtrip_int() {
        assert_eq!(roundtrip(AttrValue::Int(30)), AttrValue::Int(30));
        assert_eq!(roundtrip(AttrValue::Int(-7)), AttrValue::Int(-7));
        assert_eq!(
            roundtrip(AttrValue::Int(i64::MAX)),
            AttrValue::Int(i64::MAX)
        );
    }

    #[test]
    fn test_roundtrip_float() {
        assert_eq!(roundtrip(AttrValue::Float(2.5)), AttrValue::Float(2.5));
        assert_eq!(
            roundtrip(AttrValue::Float(-1.25e-9)),
            AttrValue::Float(-1.25e-9)
        );
        // whole floats must come back as floats, not integers
        assert_eq!(roundtrip(AttrValue::Float(30.0)), AttrValue::Float(30.0));
    }

    #[test]
    fn test_roundtrip_string_and_bool() {
        assert_eq!(
            roundtrip(AttrValue::Str("foo".into())),
            AttrValue::Str("foo".into())
        );
        assert_eq!(roundtrip(AttrValue::Bool(true)), AttrValue::Bool(true));
    }

    #[test]
    fn test_roundtrip_bytes_bytewise() {
        let blob = vec![0u8, 1, 2, 254, 255];
        assert_eq!(
            roundtrip(AttrValue::Bytes(blob.clone())),
            AttrValue::Bytes(blob)
        );
    }

    #[test]
    fn test_roundtrip_timestamp_nanosecond() {
        let ts = AttrValue::Timestamp {
            secs: 1581605100,
            nanos: 498349956,
        };
        assert_eq!(roundtrip(ts.clone()), ts);
    }

    #[test]
    fn test_envelope_shapes() {
        let mut item = Item::new();
        item.insert("age".to_string(), AttrValue::Int(30));
        item.insert("name".to_string(), AttrValue::Str("foo".into()));

        let encoded = encode_item(&item);
        assert_eq!(encoded["age"]["N"], "30");
        assert_eq!(encoded["name"]["S"], "foo");
    }

    #[test]
    fn test_float_renders_scientific() {
        let envelope = AttrValue::Float(0.5).to_envelope();
        let rendered = envelope["N"].as_str().unwrap();
        assert!(rendered.contains('E'), "expected scientific form: {rendered}");
    }

    #[test]
    fn test_decode_number_kind_mismatch() {
        let mut envelope = Map::new();
        envelope.insert("N".to_string(), Value::Bool(true));
        let err = AttrValue::from_envelope("x", &envelope).unwrap_err();
        assert!(matches!(err, V3ioError::MalformedAttribute(_)));
    }

    #[test]
    fn test_decode_unknown_kind() {
        let mut envelope = Map::new();
        envelope.insert("XYZ".to_string(), Value::Null);
        let err = AttrValue::from_envelope("x", &envelope).unwrap_err();
        assert!(matches!(err, V3ioError::MalformedAttribute(_)));
    }

    #[test]
    fn test_decode_bad_timestamp() {
        let mut envelope = Map::new();
        envelope.insert("TS".to_string(), Value::String("12345".to_string()));
        let err = AttrValue::from_envelope("x", &envelope).unwrap_err();
        assert!(matches!(err, V3ioError::MalformedAttribute(_)));
    }
}
