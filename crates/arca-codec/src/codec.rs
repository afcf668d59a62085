use std::collections::BTreeMap;

use arca_types::ValueKind;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat};
use serde_json::{Map, Number, Value as Json};
use uuid::Uuid;

use crate::error::{CodecError, CodecResult};
use crate::value::{Decimal, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Years an RFC 3339 date or timestamp can spell without a sign.
const WIRE_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// Bidirectional conversion between [`Value`] and archive JSON.
///
/// `encode` is deterministic: the same value always yields the same JSON.
/// `decode(encode(v), kind) == v` holds whenever `v` conforms to `kind`.
pub struct ValueCodec;

impl ValueCodec {
    /// Encode a value into its archive form.
    pub fn encode(value: &Value) -> CodecResult<Json> {
        encode_at("", value)
    }

    /// Encode a field value, first checking it against the declared kind.
    pub fn encode_field(field: &str, value: &Value, kind: &ValueKind) -> CodecResult<Json> {
        conform(field, value, kind)?;
        encode_at(field, value)
    }

    /// Decode an archive value given the kind it is expected to hold.
    pub fn decode(value: &Json, kind: &ValueKind) -> CodecResult<Value> {
        decode_at("", value, kind)
    }

    /// Decode a named field, so that errors carry the field path.
    pub fn decode_field(field: &str, value: &Json, kind: &ValueKind) -> CodecResult<Value> {
        decode_at(field, value, kind)
    }
}

fn encode_at(path: &str, value: &Value) -> CodecResult<Json> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Identifier(id) => Json::String(id.hyphenated().to_string()),
        Value::Timestamp(ts) => {
            check_year(path, "timestamp", ts.year())?;
            Json::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, false))
        }
        Value::Date(date) => {
            check_year(path, "date", date.year())?;
            Json::String(date.format(DATE_FORMAT).to_string())
        }
        Value::Decimal(d) => Json::String(d.as_str().to_string()),
        Value::Boolean(b) => Json::Bool(*b),
        Value::Integer(i) => Json::Number(Number::from(*i)),
        Value::Float(f) => Json::Number(Number::from_f64(*f).ok_or_else(|| {
            CodecError::Unsupported {
                field: path.to_string(),
                type_name: format!("non-finite float ({f})"),
            }
        })?),
        Value::Text(s) => Json::String(s.clone()),
        Value::Bytes(bytes) => Json::String(BASE64.encode(bytes)),
        Value::List(items) => Json::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| encode_at(&index_path(path, i), item))
                .collect::<CodecResult<Vec<_>>>()?,
        ),
        Value::Map(entries) => {
            let mut map = Map::new();
            for (key, item) in entries {
                map.insert(key.clone(), encode_at(&key_path(path, key), item)?);
            }
            Json::Object(map)
        }
    })
}

fn check_year(path: &str, what: &str, year: i32) -> CodecResult<()> {
    if WIRE_YEARS.contains(&year) {
        Ok(())
    } else {
        Err(CodecError::Unsupported {
            field: path.to_string(),
            type_name: format!("{what} in year {year}"),
        })
    }
}

/// Check that `value` is representable under `kind` without loss.
fn conform(path: &str, value: &Value, kind: &ValueKind) -> CodecResult<()> {
    let ok = match (kind, value) {
        (_, Value::Null) => true,
        (ValueKind::Identifier, Value::Identifier(_))
        | (ValueKind::Timestamp, Value::Timestamp(_))
        | (ValueKind::Date, Value::Date(_))
        | (ValueKind::Decimal, Value::Decimal(_))
        | (ValueKind::Boolean, Value::Boolean(_))
        | (ValueKind::Integer, Value::Integer(_))
        | (ValueKind::Float, Value::Float(_))
        | (ValueKind::Text, Value::Text(_))
        | (ValueKind::Bytes, Value::Bytes(_)) => true,
        (ValueKind::List(inner), Value::List(items)) => {
            for (i, item) in items.iter().enumerate() {
                conform(&index_path(path, i), item, inner)?;
            }
            true
        }
        (ValueKind::Map(inner), Value::Map(entries)) => {
            for (key, item) in entries {
                conform(&key_path(path, key), item, inner)?;
            }
            true
        }
        (ValueKind::Json, _) => return conform_json(path, value),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(CodecError::Mismatch {
            field: path.to_string(),
            expected: kind.to_string(),
            type_name: value.type_name().to_string(),
        })
    }
}

/// Untyped documents only carry what plain JSON carries natively.
fn conform_json(path: &str, value: &Value) -> CodecResult<()> {
    match value {
        Value::Null | Value::Boolean(_) | Value::Integer(_) | Value::Float(_) | Value::Text(_) => {
            Ok(())
        }
        Value::List(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| conform_json(&index_path(path, i), item)),
        Value::Map(entries) => entries
            .iter()
            .try_for_each(|(key, item)| conform_json(&key_path(path, key), item)),
        other => Err(CodecError::Unsupported {
            field: path.to_string(),
            type_name: format!("{} inside json", other.type_name()),
        }),
    }
}

fn decode_at(path: &str, json: &Json, kind: &ValueKind) -> CodecResult<Value> {
    if json.is_null() {
        return Ok(Value::Null);
    }
    let mismatch = || CodecError::Mismatch {
        field: path.to_string(),
        expected: kind.to_string(),
        type_name: json_type_name(json).to_string(),
    };
    let invalid = |reason: String| CodecError::Invalid {
        field: path.to_string(),
        expected: kind.to_string(),
        reason,
    };

    match kind {
        ValueKind::Identifier => {
            let s = json.as_str().ok_or_else(mismatch)?;
            Uuid::parse_str(s)
                .map(Value::Identifier)
                .map_err(|e| invalid(e.to_string()))
        }
        ValueKind::Timestamp => {
            let s = json.as_str().ok_or_else(mismatch)?;
            DateTime::parse_from_rfc3339(s)
                .map(Value::Timestamp)
                .map_err(|e| invalid(format!("{s:?}: {e}")))
        }
        ValueKind::Date => {
            let s = json.as_str().ok_or_else(mismatch)?;
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .map(Value::Date)
                .map_err(|e| invalid(format!("{s:?}: {e}")))
        }
        ValueKind::Decimal => match json {
            Json::String(s) => s.parse::<Decimal>().map(Value::Decimal).map_err(invalid),
            // Integral JSON numbers are exact; fractional ones went through a float.
            Json::Number(n) if n.is_i64() || n.is_u64() => n
                .to_string()
                .parse::<Decimal>()
                .map(Value::Decimal)
                .map_err(invalid),
            _ => Err(mismatch()),
        },
        ValueKind::Boolean => json.as_bool().map(Value::Boolean).ok_or_else(mismatch),
        ValueKind::Integer => match json {
            Json::Number(n) => n
                .as_i64()
                .map(Value::Integer)
                .ok_or_else(|| invalid(format!("{n} does not fit a signed 64-bit integer"))),
            _ => Err(mismatch()),
        },
        ValueKind::Float => json.as_f64().map(Value::Float).ok_or_else(mismatch),
        ValueKind::Text => json
            .as_str()
            .map(|s| Value::Text(s.to_string()))
            .ok_or_else(mismatch),
        ValueKind::Bytes => {
            let s = json.as_str().ok_or_else(mismatch)?;
            BASE64
                .decode(s)
                .map(Value::Bytes)
                .map_err(|e| invalid(e.to_string()))
        }
        ValueKind::List(inner) => {
            let items = json.as_array().ok_or_else(mismatch)?;
            items
                .iter()
                .enumerate()
                .map(|(i, item)| decode_at(&index_path(path, i), item, inner))
                .collect::<CodecResult<Vec<_>>>()
                .map(Value::List)
        }
        ValueKind::Map(inner) => {
            let entries = json.as_object().ok_or_else(mismatch)?;
            let mut map = BTreeMap::new();
            for (key, item) in entries {
                map.insert(key.clone(), decode_at(&key_path(path, key), item, inner)?);
            }
            Ok(Value::Map(map))
        }
        ValueKind::Json => decode_json(path, json),
    }
}

fn decode_json(path: &str, json: &Json) -> CodecResult<Value> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if n.is_u64() {
                return Err(CodecError::Invalid {
                    field: path.to_string(),
                    expected: ValueKind::Json.to_string(),
                    reason: format!("{n} does not fit a signed 64-bit integer"),
                });
            } else {
                Value::Float(n.as_f64().unwrap_or_default())
            }
        }
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(items) => Value::List(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| decode_json(&index_path(path, i), item))
                .collect::<CodecResult<Vec<_>>>()?,
        ),
        Json::Object(entries) => {
            let mut map = BTreeMap::new();
            for (key, item) in entries {
                map.insert(key.clone(), decode_json(&key_path(path, key), item)?);
            }
            Value::Map(map)
        }
    })
}

fn json_type_name(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn index_path(path: &str, index: usize) -> String {
    format!("{path}[{index}]")
}

fn key_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}
