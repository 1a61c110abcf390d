use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::convert::ConvertValue;
use crate::envelope::{Envelope, HeaderValue, PropertyName};
use crate::error::{BindError, ConversionError};
use crate::signature::BindingTarget;

/// Value bound to one method parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    /// Optional target whose field was absent from the envelope.
    Absent,
    /// Raw body bytes for targets declared as bytes.
    Bytes(Vec<u8>),
    /// Converted scalar or structured value.
    Value(Value),
    /// The full envelope, bound by the message-state binder.
    State(Envelope),
}

impl BoundValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, BoundValue::Absent)
    }

    /// Deserialize the bound value into a concrete type.
    ///
    /// `Absent` deserializes as JSON null, so `Option<T>` targets
    /// recover `None`.
    pub fn to<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        use serde::de::Error as _;
        match self {
            BoundValue::Absent => serde_json::from_value(Value::Null),
            BoundValue::Value(value) => serde_json::from_value(value.clone()),
            BoundValue::Bytes(bytes) => serde_json::from_value(serde_json::to_value(bytes)?),
            BoundValue::State(_) => Err(serde_json::Error::custom(
                "message state does not deserialize into a value type",
            )),
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BoundValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_state(&self) -> Option<&Envelope> {
        match self {
            BoundValue::State(envelope) => Some(envelope),
            _ => None,
        }
    }

    /// Build a structured value from anything serializable.
    pub fn json(value: impl serde::Serialize) -> Result<Self, serde_json::Error> {
        Ok(BoundValue::Value(serde_json::to_value(value)?))
    }
}

impl From<Value> for BoundValue {
    fn from(value: Value) -> Self {
        BoundValue::Value(value)
    }
}

impl From<bool> for BoundValue {
    fn from(value: bool) -> Self {
        BoundValue::Value(Value::Bool(value))
    }
}

impl From<i64> for BoundValue {
    fn from(value: i64) -> Self {
        BoundValue::Value(Value::from(value))
    }
}

impl From<f64> for BoundValue {
    fn from(value: f64) -> Self {
        BoundValue::Value(Value::from(value))
    }
}

impl From<&str> for BoundValue {
    fn from(value: &str) -> Self {
        BoundValue::Value(Value::String(value.to_string()))
    }
}

impl From<String> for BoundValue {
    fn from(value: String) -> Self {
        BoundValue::Value(Value::String(value))
    }
}

impl From<Vec<u8>> for BoundValue {
    fn from(value: Vec<u8>) -> Self {
        BoundValue::Bytes(value)
    }
}

/// Capability contract of one argument binder.
///
/// Binders are stateless beyond their injected conversion service and
/// are shared across concurrent invocations. `extract` returning
/// `Ok(None)` means "unbound" (the field was absent), which the engine
/// resolves against the target's optionality; it is not an error.
pub trait ArgumentBinder: Send + Sync {
    /// Consumer side: produce a bound value from the envelope.
    fn extract(
        &self,
        envelope: &Envelope,
        target: &BindingTarget,
    ) -> Result<Option<BoundValue>, BindError>;

    /// Producer side: contribute a value into the outgoing envelope.
    fn populate(
        &self,
        envelope: &mut Envelope,
        target: &BindingTarget,
        value: &BoundValue,
    ) -> Result<(), BindError>;
}

fn conversion_error(target: &BindingTarget, raw: String, source: ConversionError) -> BindError {
    BindError::Conversion {
        parameter: target.name.clone(),
        raw,
        source,
    }
}

/// Translate a bound value back to its wire form, without conversion.
/// `None` means the field is omitted rather than written as null.
fn wire_value(
    target: &BindingTarget,
    value: &BoundValue,
) -> Result<Option<HeaderValue>, BindError> {
    let wire = match value {
        BoundValue::Absent => return Ok(None),
        BoundValue::Bytes(bytes) => HeaderValue::Bytes(bytes.clone()),
        BoundValue::State(_) => {
            return Err(conversion_error(
                target,
                "<message state>".into(),
                ConversionError::TypeMismatch {
                    expected: "scalar field value",
                    found: "message state",
                },
            ))
        }
        BoundValue::Value(value) => match value {
            Value::Null => return Ok(None),
            Value::Bool(b) => HeaderValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => HeaderValue::Int(i),
                None => HeaderValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => HeaderValue::Str(s.clone()),
            compound @ (Value::Array(_) | Value::Object(_)) => {
                return Err(conversion_error(
                    target,
                    compound.to_string(),
                    ConversionError::TypeMismatch {
                        expected: "scalar field value",
                        found: "compound structure",
                    },
                ))
            }
        },
    };
    Ok(Some(wire))
}

/// Binds header-marked parameters from the envelope's header table.
pub struct HeaderBinder {
    converter: Arc<dyn ConvertValue>,
}

impl HeaderBinder {
    pub fn new(converter: Arc<dyn ConvertValue>) -> Self {
        Self { converter }
    }
}

impl ArgumentBinder for HeaderBinder {
    fn extract(
        &self,
        envelope: &Envelope,
        target: &BindingTarget,
    ) -> Result<Option<BoundValue>, BindError> {
        match envelope.header(target.binding_name()) {
            None => Ok(None),
            Some(raw) => self
                .converter
                .convert(raw, &target.ty)
                .map(Some)
                .map_err(|source| conversion_error(target, raw.as_text(), source)),
        }
    }

    fn populate(
        &self,
        envelope: &mut Envelope,
        target: &BindingTarget,
        value: &BoundValue,
    ) -> Result<(), BindError> {
        if let Some(wire) = wire_value(target, value)? {
            envelope.set_header(target.binding_name(), wire);
        }
        Ok(())
    }
}

/// Binds property-marked parameters against the fixed AMQP record.
pub struct PropertyBinder {
    converter: Arc<dyn ConvertValue>,
}

impl PropertyBinder {
    pub fn new(converter: Arc<dyn ConvertValue>) -> Self {
        Self { converter }
    }

    /// Names are validated when the signature is resolved; this is the
    /// safety net for binders used outside an engine.
    fn property_name(target: &BindingTarget) -> Result<PropertyName, BindError> {
        PropertyName::parse(target.binding_name()).ok_or_else(|| BindError::UnknownProperty {
            parameter: target.name.clone(),
            name: target.binding_name().to_string(),
        })
    }
}

impl ArgumentBinder for PropertyBinder {
    fn extract(
        &self,
        envelope: &Envelope,
        target: &BindingTarget,
    ) -> Result<Option<BoundValue>, BindError> {
        let name = Self::property_name(target)?;
        match envelope.property(name) {
            None => Ok(None),
            Some(raw) => self
                .converter
                .convert(&raw, &target.ty)
                .map(Some)
                .map_err(|source| conversion_error(target, raw.as_text(), source)),
        }
    }

    fn populate(
        &self,
        envelope: &mut Envelope,
        target: &BindingTarget,
        value: &BoundValue,
    ) -> Result<(), BindError> {
        let name = Self::property_name(target)?;
        if let Some(wire) = wire_value(target, value)? {
            let raw = wire.as_text();
            envelope
                .set_property(name, wire)
                .map_err(|source| conversion_error(target, raw, source))?;
        }
        Ok(())
    }
}

/// Binds body-marked parameters, decoding and encoding the envelope
/// body through the conversion service's content-type negotiation.
pub struct BodyBinder {
    converter: Arc<dyn ConvertValue>,
}

impl BodyBinder {
    pub fn new(converter: Arc<dyn ConvertValue>) -> Self {
        Self { converter }
    }
}

impl ArgumentBinder for BodyBinder {
    fn extract(
        &self,
        envelope: &Envelope,
        target: &BindingTarget,
    ) -> Result<Option<BoundValue>, BindError> {
        let content_type = envelope.properties().content_type.as_deref();
        self.converter
            .decode_body(envelope.body(), content_type, &target.ty)
            .map(Some)
            .map_err(|source| conversion_error(target, body_preview(envelope.body()), source))
    }

    fn populate(
        &self,
        envelope: &mut Envelope,
        target: &BindingTarget,
        value: &BoundValue,
    ) -> Result<(), BindError> {
        let content_type = envelope.properties().content_type.as_deref();
        let body = self
            .converter
            .encode_body(value, content_type)
            .map_err(|source| conversion_error(target, "<argument value>".into(), source))?;
        envelope.set_body(body);
        Ok(())
    }
}

fn body_preview(body: &[u8]) -> String {
    const LIMIT: usize = 64;
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.into_owned(),
    }
}

/// Binds the entire envelope for handlers that need low-level access.
/// Extract-only; there is no producer-side analog.
pub struct MessageStateBinder;

impl ArgumentBinder for MessageStateBinder {
    fn extract(
        &self,
        envelope: &Envelope,
        _target: &BindingTarget,
    ) -> Result<Option<BoundValue>, BindError> {
        Ok(Some(BoundValue::State(envelope.clone())))
    }

    fn populate(
        &self,
        _envelope: &mut Envelope,
        target: &BindingTarget,
        _value: &BoundValue,
    ) -> Result<(), BindError> {
        Err(BindError::PopulateUnsupported {
            parameter: target.name.clone(),
        })
    }
}
