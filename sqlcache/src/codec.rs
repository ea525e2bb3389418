//! Result payload encoding
//!
//! A record is encoded as a sparse field map: only fields whose value differs
//! from the type's default are written. Single results become a map,
//! collections an ordered array of maps. The byte format is pluggable through
//! [`Codec`]; JSON is the reference format.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::model::Record;
use crate::query::ResultSet;

/// Encoding unit for one record
pub type FieldMap = Map<String, Value>;

/// Codec failures
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("msgpack encode: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    #[error("msgpack decode: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("expected {expected} payload, found {found}")]
    Shape {
        expected: &'static str,
        found: &'static str,
    },

    #[error("field `{field}`: {source}")]
    Field {
        field: &'static str,
        source: serde_json::Error,
    },
}

/// Byte-level marshaling of encoded results
pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;

    fn marshal(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    fn unmarshal(&self, data: &[u8]) -> Result<Value, CodecError>;
}

/// Reference JSON codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn marshal(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn unmarshal(&self, data: &[u8]) -> Result<Value, CodecError> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// MessagePack codec, base64-armoured so payloads stay UTF-8 text
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn marshal(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        let packed = rmp_serde::to_vec(value)?;
        Ok(STANDARD.encode(packed).into_bytes())
    }

    fn unmarshal(&self, data: &[u8]) -> Result<Value, CodecError> {
        let packed = STANDARD.decode(data)?;
        Ok(rmp_serde::from_slice(&packed)?)
    }
}

/// Codec selection in configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Json,
    MsgPack,
}

impl CodecKind {
    pub fn build(self) -> Arc<dyn Codec> {
        match self {
            Self::Json => Arc::new(JsonCodec),
            Self::MsgPack => Arc::new(MsgPackCodec),
        }
    }
}

/// Build the sparse field map of one record
pub fn field_map<R: Record>(record: &R) -> Result<FieldMap, CodecError> {
    let mut map = FieldMap::new();
    for field in R::fields() {
        if (field.is_default)(record) {
            continue;
        }
        let value = (field.get)(record).map_err(|source| CodecError::Field {
            field: field.name,
            source,
        })?;
        map.insert(field.name.to_string(), value);
    }
    Ok(map)
}

/// Write every known field of `map` into `record`, leaving absent fields untouched
pub fn apply_field_map<R: Record>(record: &mut R, map: FieldMap) -> Result<(), CodecError> {
    for (name, value) in map {
        let Some(field) = R::field(&name) else {
            continue;
        };
        (field.set)(record, value).map_err(|source| CodecError::Field {
            field: field.name,
            source,
        })?;
    }
    Ok(())
}

/// Encode a populated result.
///
/// Returns `Ok(None)` for destinations that are not a single record or a
/// collection: the caller should skip caching rather than fail.
pub fn encode<R: Record>(
    codec: &dyn Codec,
    result: &ResultSet<R>,
) -> Result<Option<String>, CodecError> {
    let value = match result {
        ResultSet::Single(record) => Value::Object(field_map(record)?),
        ResultSet::Collection(records) => Value::Array(
            records
                .iter()
                .map(|record| field_map(record).map(Value::Object))
                .collect::<Result<_, _>>()?,
        ),
        ResultSet::Rows(_) => return Ok(None),
    };

    let bytes = codec.marshal(&value)?;
    Ok(Some(String::from_utf8(bytes)?))
}

/// Decode a payload into the destination, returning the number of records materialized.
///
/// The destination's shape wins over the payload's: a single-record
/// destination takes the first element of an array payload (none for an
/// empty array), and a collection destination wraps an object payload as its
/// only element.
pub fn decode<R: Record>(
    codec: &dyn Codec,
    payload: &str,
    dest: &mut ResultSet<R>,
) -> Result<u64, CodecError> {
    let value = codec.unmarshal(payload.as_bytes())?;

    match dest {
        ResultSet::Single(record) => {
            let item = match value {
                Value::Array(items) => match items.into_iter().next() {
                    Some(first) => first,
                    None => return Ok(0),
                },
                other => other,
            };
            match item {
                Value::Object(map) => apply_field_map(record, map)?,
                Value::Null => {}
                other => {
                    return Err(CodecError::Shape {
                        expected: "object",
                        found: kind(&other),
                    });
                }
            }
            Ok(1)
        }
        ResultSet::Collection(records) => {
            let items = match value {
                Value::Array(items) => items,
                Value::Object(map) => vec![Value::Object(map)],
                other => {
                    return Err(CodecError::Shape {
                        expected: "array",
                        found: kind(&other),
                    });
                }
            };
            let mut decoded = Vec::with_capacity(items.len());
            for item in items {
                let mut record = R::default();
                match item {
                    Value::Object(map) => apply_field_map(&mut record, map)?,
                    Value::Null => {}
                    other => {
                        return Err(CodecError::Shape {
                            expected: "object element",
                            found: kind(&other),
                        });
                    }
                }
                decoded.push(record);
            }
            *records = decoded;
            Ok(records.len() as u64)
        }
        ResultSet::Rows(_) => Err(CodecError::Shape {
            expected: "record",
            found: "rows destination",
        }),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
