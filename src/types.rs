use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{Error, Result};

/// The declared column type. Mirrors the seven types in the row model;
/// `coerce` implements the conversion rules a caller's literal/bound value
/// goes through before it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Real,
    Text,
    Boolean,
    Timestamp,
    Blob,
    Decimal,
}

impl DataType {
    pub fn name(self) -> &'static str {
        match self {
            DataType::Integer => "INTEGER",
            DataType::Real => "REAL",
            DataType::Text => "TEXT",
            DataType::Boolean => "BOOLEAN",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Blob => "BLOB",
            DataType::Decimal => "DECIMAL",
        }
    }

    pub fn parse(name: &str) -> Result<DataType> {
        match name.to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" => Ok(DataType::Integer),
            "REAL" | "FLOAT" | "DOUBLE" => Ok(DataType::Real),
            "TEXT" | "VARCHAR" | "STRING" => Ok(DataType::Text),
            "BOOLEAN" | "BOOL" => Ok(DataType::Boolean),
            "TIMESTAMP" => Ok(DataType::Timestamp),
            "BLOB" => Ok(DataType::Blob),
            "DECIMAL" | "NUMERIC" => Ok(DataType::Decimal),
            other => Err(Error::Schema(format!("Unsupported type: {other}"))),
        }
    }
}

/// A single cell value. `Null` is a distinct variant rather than
/// `Option<Value>` so that expressions can carry NULL through arithmetic and
/// comparisons the way the executor's CHECK/WHERE evaluator expects.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Timestamp(String),
    Blob(Vec<u8>),
    Decimal(Decimal),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Integer(_) => Some(DataType::Integer),
            Value::Real(_) => Some(DataType::Real),
            Value::Text(_) => Some(DataType::Text),
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Blob(_) => Some(DataType::Blob),
            Value::Decimal(_) => Some(DataType::Decimal),
            Value::Null => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Boolean(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            Value::Decimal(v) => v.to_string().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) | Value::Timestamp(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Coerce a loosely-typed input value (as produced by the parser, or
    /// passed by a caller as a bound parameter) into the declared column
    /// type. Follows `coerce_value` from the original engine's schema
    /// module: NULL always passes through untouched, INTEGER/REAL/TEXT do a
    /// plain conversion, BOOLEAN accepts numbers and the strings
    /// "true"/"1"/"false"/"0". DECIMAL and BLOB are additions the original
    /// schema coercion did not have.
    pub fn coerce(self, target: DataType) -> Result<Value> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        match target {
            DataType::Integer => match self {
                Value::Integer(v) => Ok(Value::Integer(v)),
                Value::Boolean(v) => Ok(Value::Integer(v as i64)),
                Value::Real(v) => Ok(Value::Integer(v as i64)),
                Value::Text(s) => s
                    .parse::<i64>()
                    .map(Value::Integer)
                    .map_err(|_| Error::Type(format!("Cannot coerce '{s}' to INTEGER"))),
                other => Err(Error::Type(format!("Cannot coerce {other:?} to INTEGER"))),
            },
            DataType::Real => match self {
                Value::Real(v) => Ok(Value::Real(v)),
                Value::Integer(v) => Ok(Value::Real(v as f64)),
                Value::Text(s) => s
                    .parse::<f64>()
                    .map(Value::Real)
                    .map_err(|_| Error::Type(format!("Cannot coerce '{s}' to REAL"))),
                other => Err(Error::Type(format!("Cannot coerce {other:?} to REAL"))),
            },
            DataType::Text | DataType::Timestamp => match self {
                Value::Text(s) => Ok(Value::Text(s)),
                Value::Integer(v) => Ok(Value::Text(v.to_string())),
                Value::Real(v) => Ok(Value::Text(v.to_string())),
                Value::Boolean(v) => Ok(Value::Text(v.to_string())),
                other => Err(Error::Type(format!("Cannot coerce {other:?} to TEXT"))),
            },
            DataType::Boolean => match self {
                Value::Boolean(v) => Ok(Value::Boolean(v)),
                Value::Integer(v) => Ok(Value::Boolean(v != 0)),
                Value::Real(v) => Ok(Value::Boolean(v != 0.0)),
                Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Ok(Value::Boolean(true)),
                    "false" | "0" => Ok(Value::Boolean(false)),
                    _ => Err(Error::Type(format!("Cannot coerce '{s}' to BOOLEAN"))),
                },
                other => Err(Error::Type(format!("Cannot coerce {other:?} to BOOLEAN"))),
            },
            DataType::Blob => match self {
                Value::Blob(b) => Ok(Value::Blob(b)),
                other => Err(Error::Type(format!("Cannot coerce {other:?} to BLOB"))),
            },
            DataType::Decimal => match self {
                Value::Decimal(d) => Ok(Value::Decimal(d)),
                Value::Integer(v) => Ok(Value::Decimal(Decimal::from(v))),
                Value::Text(s) => s
                    .parse::<Decimal>()
                    .map(Value::Decimal)
                    .map_err(|_| Error::Type(format!("Cannot coerce '{s}' to DECIMAL"))),
                other => Err(Error::Type(format!("Cannot coerce {other:?} to DECIMAL"))),
            },
        }
    }

    /// JSON encoding used by the row codec. BLOB and DECIMAL are not native
    /// JSON types, so they round-trip through a tagged object; every other
    /// variant maps onto a plain JSON scalar.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Integer(v) => Json::from(*v),
            Value::Real(v) => serde_json::Number::from_f64(*v)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Text(v) | Value::Timestamp(v) => Json::from(v.clone()),
            Value::Boolean(v) => Json::from(*v),
            Value::Blob(bytes) => serde_json::json!({
                "__type__": "bytes",
                "value": base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes),
            }),
            Value::Decimal(d) => serde_json::json!({
                "__type__": "decimal",
                "value": d.to_string(),
            }),
            Value::Null => Json::Null,
        }
    }

    pub fn from_json(json: &Json, target: DataType) -> Result<Value> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        if let Some(obj) = json.as_object() {
            if let Some(tag) = obj.get("__type__").and_then(|v| v.as_str()) {
                let raw = obj
                    .get("value")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::Corruption("tagged value missing 'value'".into()))?;
                return match tag {
                    "bytes" => {
                        let bytes = base64::Engine::decode(
                            &base64::engine::general_purpose::STANDARD,
                            raw,
                        )
                        .map_err(|e| Error::Corruption(format!("invalid base64 blob: {e}")))?;
                        Ok(Value::Blob(bytes))
                    }
                    "decimal" => raw
                        .parse::<Decimal>()
                        .map(Value::Decimal)
                        .map_err(|e| Error::Corruption(format!("invalid decimal: {e}"))),
                    other => Err(Error::Corruption(format!("unknown tagged type {other}"))),
                };
            }
        }
        match target {
            DataType::Integer => Ok(Value::Integer(json.as_i64().ok_or_else(|| {
                Error::Corruption("expected integer in row payload".into())
            })?)),
            DataType::Real => Ok(Value::Real(json.as_f64().ok_or_else(|| {
                Error::Corruption("expected real in row payload".into())
            })?)),
            DataType::Text => Ok(Value::Text(
                json.as_str()
                    .ok_or_else(|| Error::Corruption("expected text in row payload".into()))?
                    .to_string(),
            )),
            DataType::Timestamp => Ok(Value::Timestamp(
                json.as_str()
                    .ok_or_else(|| Error::Corruption("expected timestamp in row payload".into()))?
                    .to_string(),
            )),
            DataType::Boolean => Ok(Value::Boolean(json.as_bool().ok_or_else(|| {
                Error::Corruption("expected boolean in row payload".into())
            })?)),
            DataType::Blob | DataType::Decimal => {
                Err(Error::Corruption("tagged value expected".into()))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Text(v) | Value::Timestamp(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Null => write!(f, "NULL"),
        }
    }
}
