use std::str::FromStr;

use serde_json::Value;

use crate::bind::BoundValue;
use crate::envelope::HeaderValue;
use crate::error::ConversionError;
use crate::signature::TargetType;

/// Conversion service between untyped wire values and declared types.
///
/// Binders never coerce types themselves; they delegate to this trait,
/// injected explicitly when the registry is built. Implementations must
/// be stateless and reentrant.
pub trait ConvertValue: Send + Sync {
    /// Convert a header/property wire value to the declared type.
    fn convert(&self, raw: &HeaderValue, ty: &TargetType)
        -> Result<BoundValue, ConversionError>;

    /// Decode body bytes to the declared type, honoring the envelope's
    /// content type for structured encodings.
    fn decode_body(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        ty: &TargetType,
    ) -> Result<BoundValue, ConversionError>;

    /// Encode an argument value to body bytes, the inverse of
    /// [`decode_body`](ConvertValue::decode_body). Raw bytes copy
    /// through unchanged.
    fn encode_body(
        &self,
        value: &BoundValue,
        content_type: Option<&str>,
    ) -> Result<Vec<u8>, ConversionError>;
}

/// Default conversion service.
///
/// Passthrough when the wire representation already matches the declared
/// type, otherwise conversion goes through the value's string
/// representation (`"42"` binds to integer 42). Bodies decode as JSON
/// when the content type says so or the declared type is structured,
/// as UTF-8 text for the scalar types, and as an opaque passthrough
/// when the declared type is exactly bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardConverter;

impl ConvertValue for StandardConverter {
    fn convert(
        &self,
        raw: &HeaderValue,
        ty: &TargetType,
    ) -> Result<BoundValue, ConversionError> {
        let value = match ty {
            TargetType::Bool => match raw {
                HeaderValue::Bool(b) => Value::Bool(*b),
                other => Value::Bool(parse(other.as_text(), "boolean")?),
            },
            TargetType::Integer => match raw {
                HeaderValue::Int(i) => Value::from(*i),
                other => Value::from(parse::<i64>(other.as_text(), "integer")?),
            },
            TargetType::Float => match raw {
                HeaderValue::Float(f) => Value::from(*f),
                HeaderValue::Int(i) => Value::from(*i as f64),
                other => Value::from(parse::<f64>(other.as_text(), "float")?),
            },
            TargetType::String => Value::String(raw.as_text()),
            TargetType::Bytes => {
                let bytes = match raw {
                    HeaderValue::Bytes(b) => b.clone(),
                    HeaderValue::Str(s) => s.clone().into_bytes(),
                    other => {
                        return Err(ConversionError::TypeMismatch {
                            expected: "bytes",
                            found: other.type_name(),
                        })
                    }
                };
                return Ok(BoundValue::Bytes(bytes));
            }
            TargetType::Json => match raw {
                HeaderValue::Bool(b) => Value::Bool(*b),
                HeaderValue::Int(i) => Value::from(*i),
                HeaderValue::Float(f) => Value::from(*f),
                HeaderValue::Str(s) => serde_json::from_str(s)?,
                HeaderValue::Bytes(b) => serde_json::from_slice(b)?,
            },
            TargetType::MessageState => {
                return Err(ConversionError::TypeMismatch {
                    expected: "field value",
                    found: "message state",
                })
            }
        };
        Ok(BoundValue::Value(value))
    }

    fn decode_body(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        ty: &TargetType,
    ) -> Result<BoundValue, ConversionError> {
        if matches!(ty, TargetType::Bytes) {
            // Opaque passthrough regardless of declared content type.
            return Ok(BoundValue::Bytes(body.to_vec()));
        }
        if matches!(ty, TargetType::MessageState) {
            return Err(ConversionError::TypeMismatch {
                expected: "body value",
                found: "message state",
            });
        }

        let structured = content_type
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false);
        if structured || matches!(ty, TargetType::Json) {
            let value: Value = serde_json::from_slice(body)?;
            return coerce(value, ty);
        }

        let text = std::str::from_utf8(body)?;
        let value = match ty {
            TargetType::String => Value::String(text.to_string()),
            TargetType::Integer => Value::from(parse::<i64>(text.to_string(), "integer")?),
            TargetType::Float => Value::from(parse::<f64>(text.to_string(), "float")?),
            TargetType::Bool => Value::Bool(parse(text.to_string(), "boolean")?),
            TargetType::Bytes | TargetType::Json | TargetType::MessageState => unreachable!(),
        };
        Ok(BoundValue::Value(value))
    }

    fn encode_body(
        &self,
        value: &BoundValue,
        content_type: Option<&str>,
    ) -> Result<Vec<u8>, ConversionError> {
        match value {
            // Raw bytes copy through unchanged.
            BoundValue::Bytes(bytes) => Ok(bytes.clone()),
            BoundValue::Absent => Ok(Vec::new()),
            BoundValue::State(_) => Err(ConversionError::TypeMismatch {
                expected: "body value",
                found: "message state",
            }),
            BoundValue::Value(value) => {
                let structured = content_type
                    .map(|ct| ct.starts_with("application/json"))
                    .unwrap_or(false);
                if structured || value.is_object() || value.is_array() {
                    return Ok(serde_json::to_vec(value)?);
                }
                match value {
                    Value::String(s) => Ok(s.clone().into_bytes()),
                    other => Ok(other.to_string().into_bytes()),
                }
            }
        }
    }
}

fn coerce(value: Value, ty: &TargetType) -> Result<BoundValue, ConversionError> {
    let coerced = match ty {
        TargetType::Json => value,
        TargetType::String => match value {
            Value::String(s) => Value::String(s),
            other => {
                return Err(ConversionError::TypeMismatch {
                    expected: "string",
                    found: json_type_name(&other),
                })
            }
        },
        TargetType::Integer => value
            .as_i64()
            .map(Value::from)
            .ok_or(ConversionError::TypeMismatch {
                expected: "integer",
                found: json_type_name(&value),
            })?,
        TargetType::Float => value
            .as_f64()
            .map(Value::from)
            .ok_or(ConversionError::TypeMismatch {
                expected: "float",
                found: json_type_name(&value),
            })?,
        TargetType::Bool => value
            .as_bool()
            .map(Value::Bool)
            .ok_or(ConversionError::TypeMismatch {
                expected: "boolean",
                found: json_type_name(&value),
            })?,
        TargetType::Bytes | TargetType::MessageState => unreachable!(),
    };
    Ok(BoundValue::Value(coerced))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn parse<T: FromStr>(text: String, expected: &'static str) -> Result<T, ConversionError> {
    match text.trim().parse() {
        Ok(value) => Ok(value),
        Err(_) => Err(ConversionError::Parse {
            raw: text,
            expected,
        }),
    }
}
