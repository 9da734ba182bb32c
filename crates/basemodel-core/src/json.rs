//! Conversion of value trees into JSON.
//!
//! Null, booleans, finite numbers, strings, lists, tuples and maps are
//! emitted natively. Anything else (bytes, sets, custom payloads, nested
//! instances, non-finite floats) goes through an [`Encoder`] first.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::error::EncodeError;
use crate::instance::DumpOptions;
use crate::value::Value;

/// Fallback converter for values JSON cannot represent directly.
pub type Encoder = Arc<dyn Fn(&Value) -> Result<Value, EncodeError> + Send + Sync>;

/// Bytes become (lossy) UTF-8 strings, sets become lists, instances become
/// maps and non-finite floats become `null`. Custom values are rejected.
pub fn encode_default(value: &Value) -> Result<Value, EncodeError> {
    match value {
        Value::Bytes(bytes) => Ok(Value::Str(String::from_utf8_lossy(bytes).into_owned())),
        Value::Set(items) => Ok(Value::List(items.clone())),
        Value::Model(instance) => Ok(Value::Map(instance.to_mapping(&DumpOptions::default()))),
        Value::Float(x) if !x.is_finite() => Ok(Value::Null),
        other => Err(EncodeError::new(other.type_name())),
    }
}

pub fn default_encoder() -> Encoder {
    Arc::new(encode_default)
}

/// Consult `encoders` by value type name first, then the default.
pub fn custom_encoder(encoders: IndexMap<String, Encoder>) -> Encoder {
    Arc::new(move |value: &Value| match encoders.get(value.type_name()) {
        Some(encoder) => encoder(value),
        None => encode_default(value),
    })
}

fn is_native(value: &Value) -> bool {
    match value {
        Value::Float(x) => x.is_finite(),
        Value::Null
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Str(_)
        | Value::List(_)
        | Value::Tuple(_)
        | Value::Map(_) => true,
        Value::Bytes(_) | Value::Set(_) | Value::Model(_) | Value::Custom(_) => false,
    }
}

/// Encoder results that still need the encoder are re-encoded at most this
/// many times along one path.
const MAX_ENCODER_CHAIN: usize = 32;

/// Convert a value tree, routing non-native values through `encoder`.
pub fn to_json_value(value: &Value, encoder: &Encoder) -> Result<JsonValue, EncodeError> {
    convert(value, encoder, 0)
}

fn convert(value: &Value, encoder: &Encoder, chain: usize) -> Result<JsonValue, EncodeError> {
    Ok(match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::from(*i),
        Value::Str(s) => JsonValue::String(s.clone()),
        Value::Float(x) if x.is_finite() => JsonValue::from(*x),
        Value::List(items) | Value::Tuple(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| convert(item, encoder, 0))
                .collect::<Result<_, _>>()?,
        ),
        Value::Map(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), convert(v, encoder, 0)?)))
                .collect::<Result<_, EncodeError>>()?,
        ),
        other => {
            let encoded = encoder(other)?;
            let stuck = encoded.type_name() == other.type_name() || chain >= MAX_ENCODER_CHAIN;
            if !is_native(&encoded) && stuck {
                tracing::debug!(
                    type_name = other.type_name(),
                    chain,
                    "encoder did not produce a JSON-native value"
                );
                return Err(EncodeError::new(other.type_name()));
            }
            convert(&encoded, encoder, chain + 1)?
        }
    })
}
