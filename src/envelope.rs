use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::ConversionError;

/// Scalar value as it appears on the wire in headers and properties.
///
/// AMQP header tables carry a narrow scalar set (numbers, strings,
/// booleans, byte sequences) and never compound structures. Every
/// variant has a canonical string representation used as the fallback
/// path by the conversion service.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl HeaderValue {
    /// Name of the underlying representation, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            HeaderValue::Bool(_) => "boolean",
            HeaderValue::Int(_) => "integer",
            HeaderValue::Float(_) => "float",
            HeaderValue::Str(_) => "string",
            HeaderValue::Bytes(_) => "bytes",
        }
    }

    /// Canonical string representation of the value.
    pub fn as_text(&self) -> String {
        match self {
            HeaderValue::Bool(b) => b.to_string(),
            HeaderValue::Int(i) => i.to_string(),
            HeaderValue::Float(f) => f.to_string(),
            HeaderValue::Str(s) => s.clone(),
            HeaderValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int(value)
    }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self {
        HeaderValue::Int(value as i64)
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        HeaderValue::Float(value)
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Str(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Str(value)
    }
}

impl From<Vec<u8>> for HeaderValue {
    fn from(value: Vec<u8>) -> Self {
        HeaderValue::Bytes(value)
    }
}

/// Names of the fixed AMQP property record.
///
/// Property targets must name one of these fields; anything else is a
/// configuration error caught when the signature is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyName {
    ContentType,
    ContentEncoding,
    RoutingKey,
    CorrelationId,
    ReplyTo,
    MessageId,
    Timestamp,
    Priority,
    Expiration,
    Type,
    UserId,
    AppId,
}

impl PropertyName {
    /// Wire-level spelling of the property name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyName::ContentType => "content-type",
            PropertyName::ContentEncoding => "content-encoding",
            PropertyName::RoutingKey => "routing-key",
            PropertyName::CorrelationId => "correlation-id",
            PropertyName::ReplyTo => "reply-to",
            PropertyName::MessageId => "message-id",
            PropertyName::Timestamp => "timestamp",
            PropertyName::Priority => "priority",
            PropertyName::Expiration => "expiration",
            PropertyName::Type => "type",
            PropertyName::UserId => "user-id",
            PropertyName::AppId => "app-id",
        }
    }

    /// Parse a property name; `None` for anything outside the fixed set.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "content-type" | "content_type" => Some(PropertyName::ContentType),
            "content-encoding" | "content_encoding" => Some(PropertyName::ContentEncoding),
            "routing-key" | "routing_key" => Some(PropertyName::RoutingKey),
            "correlation-id" | "correlation_id" => Some(PropertyName::CorrelationId),
            "reply-to" | "reply_to" => Some(PropertyName::ReplyTo),
            "message-id" | "message_id" => Some(PropertyName::MessageId),
            "timestamp" => Some(PropertyName::Timestamp),
            "priority" => Some(PropertyName::Priority),
            "expiration" => Some(PropertyName::Expiration),
            "type" => Some(PropertyName::Type),
            "user-id" | "user_id" => Some(PropertyName::UserId),
            "app-id" | "app_id" => Some(PropertyName::AppId),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed AMQP property record. Every field is optional; an absent
/// field is distinct from an empty-string value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub routing_key: Option<String>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub message_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub priority: Option<u8>,
    pub expiration: Option<String>,
    /// The AMQP `type` property ("kind" to avoid the reserved word).
    pub kind: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
}

impl Properties {
    /// Read a property field as a wire value.
    pub fn get(&self, name: PropertyName) -> Option<HeaderValue> {
        match name {
            PropertyName::ContentType => self.content_type.clone().map(HeaderValue::Str),
            PropertyName::ContentEncoding => self.content_encoding.clone().map(HeaderValue::Str),
            PropertyName::RoutingKey => self.routing_key.clone().map(HeaderValue::Str),
            PropertyName::CorrelationId => self.correlation_id.clone().map(HeaderValue::Str),
            PropertyName::ReplyTo => self.reply_to.clone().map(HeaderValue::Str),
            PropertyName::MessageId => self.message_id.clone().map(HeaderValue::Str),
            PropertyName::Timestamp => self
                .timestamp
                .map(|t| HeaderValue::Str(t.to_rfc3339())),
            PropertyName::Priority => self.priority.map(|p| HeaderValue::Int(p as i64)),
            PropertyName::Expiration => self.expiration.clone().map(HeaderValue::Str),
            PropertyName::Type => self.kind.clone().map(HeaderValue::Str),
            PropertyName::UserId => self.user_id.clone().map(HeaderValue::Str),
            PropertyName::AppId => self.app_id.clone().map(HeaderValue::Str),
        }
    }

    /// Write a property field from a wire value.
    ///
    /// The record is typed, so the value must already match the field's
    /// shape: string fields take strings, priority takes an integer in
    /// `0..=255`, timestamp takes an RFC 3339 string or epoch seconds.
    pub fn set(&mut self, name: PropertyName, value: HeaderValue) -> Result<(), ConversionError> {
        match name {
            PropertyName::ContentType => self.content_type = Some(expect_string(value)?),
            PropertyName::ContentEncoding => self.content_encoding = Some(expect_string(value)?),
            PropertyName::RoutingKey => self.routing_key = Some(expect_string(value)?),
            PropertyName::CorrelationId => self.correlation_id = Some(expect_string(value)?),
            PropertyName::ReplyTo => self.reply_to = Some(expect_string(value)?),
            PropertyName::MessageId => self.message_id = Some(expect_string(value)?),
            PropertyName::Timestamp => self.timestamp = Some(expect_timestamp(value)?),
            PropertyName::Priority => self.priority = Some(expect_priority(value)?),
            PropertyName::Expiration => self.expiration = Some(expect_string(value)?),
            PropertyName::Type => self.kind = Some(expect_string(value)?),
            PropertyName::UserId => self.user_id = Some(expect_string(value)?),
            PropertyName::AppId => self.app_id = Some(expect_string(value)?),
        }
        Ok(())
    }
}

fn expect_string(value: HeaderValue) -> Result<String, ConversionError> {
    match value {
        HeaderValue::Str(s) => Ok(s),
        other => Err(ConversionError::TypeMismatch {
            expected: "string",
            found: other.type_name(),
        }),
    }
}

fn expect_priority(value: HeaderValue) -> Result<u8, ConversionError> {
    match value {
        HeaderValue::Int(i) if (0..=255).contains(&i) => Ok(i as u8),
        other => Err(ConversionError::TypeMismatch {
            expected: "integer in 0..=255",
            found: other.type_name(),
        }),
    }
}

fn expect_timestamp(value: HeaderValue) -> Result<DateTime<Utc>, ConversionError> {
    match value {
        HeaderValue::Str(s) => DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| ConversionError::Parse {
                raw: s,
                expected: "RFC 3339 timestamp",
            }),
        HeaderValue::Int(epoch) => Utc
            .timestamp_opt(epoch, 0)
            .single()
            .ok_or(ConversionError::TypeMismatch {
                expected: "epoch seconds",
                found: "integer",
            }),
        other => Err(ConversionError::TypeMismatch {
            expected: "timestamp",
            found: other.type_name(),
        }),
    }
}

/// Broker-agnostic representation of one message.
///
/// Inbound envelopes are materialized by the transport adapter, outbound
/// envelopes by the binding engine; either way the envelope lives for a
/// single invocation and is discarded afterwards. The body is always
/// present (possibly empty); headers and properties distinguish absence
/// from empty values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    body: Vec<u8>,
    headers: HashMap<String, HeaderValue>,
    properties: Properties,
}

impl Envelope {
    /// Empty envelope: zero-length body, no headers, no properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelope carrying only a body.
    pub fn with_body(body: Vec<u8>) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn headers(&self) -> &HashMap<String, HeaderValue> {
        &self.headers
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    pub fn property(&self, name: PropertyName) -> Option<HeaderValue> {
        self.properties.get(name)
    }

    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn set_property(
        &mut self,
        name: PropertyName,
        value: HeaderValue,
    ) -> Result<(), ConversionError> {
        self.properties.set(name, value)
    }
}
