//! Boundary adapter between [`Envelope`] and the lapin AMQP client.
//!
//! Everything transport-shaped lives here: mapping deliveries into
//! envelopes, envelopes into publish payloads, and the delivery loop
//! that feeds a [`Dispatcher`]. The binding core never touches lapin
//! types directly.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions, BasicPublishOptions};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::consumer::Dispatcher;
use crate::envelope::{Envelope, HeaderValue};
use crate::error::{Error, Result};
use crate::producer::PublishChannel;

/// Build an [`Envelope`] from an inbound delivery.
///
/// Header values outside the scalar set (nested tables, arrays,
/// decimals) are skipped; binding targets only ever address scalars.
pub fn envelope_from_delivery(delivery: &Delivery) -> Envelope {
    let mut envelope = Envelope::with_body(delivery.data.clone());

    if let Some(table) = delivery.properties.headers() {
        for (name, value) in table.inner() {
            if let Some(header) = header_value(value) {
                envelope.set_header(name.as_str(), header);
            }
        }
    }

    let source = &delivery.properties;
    let properties = envelope.properties_mut();
    properties.content_type = source.content_type().as_ref().map(short_str);
    properties.content_encoding = source.content_encoding().as_ref().map(short_str);
    properties.correlation_id = source.correlation_id().as_ref().map(short_str);
    properties.reply_to = source.reply_to().as_ref().map(short_str);
    properties.message_id = source.message_id().as_ref().map(short_str);
    properties.expiration = source.expiration().as_ref().map(short_str);
    properties.kind = source.kind().as_ref().map(short_str);
    properties.user_id = source.user_id().as_ref().map(short_str);
    properties.app_id = source.app_id().as_ref().map(short_str);
    properties.priority = *source.priority();
    properties.timestamp =
        (*source.timestamp()).and_then(|t| Utc.timestamp_opt(t as i64, 0).single());
    properties.routing_key = Some(delivery.routing_key.as_str().to_string());

    envelope
}

/// Split an outgoing envelope into a publish payload and properties.
pub fn publish_payload(envelope: &Envelope) -> (Vec<u8>, BasicProperties) {
    let mut table = FieldTable::default();
    for (name, value) in envelope.headers() {
        table.insert(name.as_str().into(), amqp_value(value));
    }

    let source = envelope.properties();
    let mut properties = BasicProperties::default().with_headers(table);
    if let Some(v) = &source.content_type {
        properties = properties.with_content_type(v.as_str().into());
    }
    if let Some(v) = &source.content_encoding {
        properties = properties.with_content_encoding(v.as_str().into());
    }
    if let Some(v) = &source.correlation_id {
        properties = properties.with_correlation_id(v.as_str().into());
    }
    if let Some(v) = &source.reply_to {
        properties = properties.with_reply_to(v.as_str().into());
    }
    if let Some(v) = &source.message_id {
        properties = properties.with_message_id(v.as_str().into());
    }
    if let Some(v) = &source.expiration {
        properties = properties.with_expiration(v.as_str().into());
    }
    if let Some(v) = &source.kind {
        properties = properties.with_kind(v.as_str().into());
    }
    if let Some(v) = &source.user_id {
        properties = properties.with_user_id(v.as_str().into());
    }
    if let Some(v) = &source.app_id {
        properties = properties.with_app_id(v.as_str().into());
    }
    if let Some(v) = source.priority {
        properties = properties.with_priority(v);
    }
    if let Some(v) = source.timestamp {
        properties = properties.with_timestamp(v.timestamp() as u64);
    }

    (envelope.body().to_vec(), properties)
}

fn short_str(value: &ShortString) -> String {
    value.as_str().to_string()
}

fn header_value(value: &AMQPValue) -> Option<HeaderValue> {
    match value {
        AMQPValue::Boolean(b) => Some(HeaderValue::Bool(*b)),
        AMQPValue::ShortShortInt(i) => Some(HeaderValue::Int(*i as i64)),
        AMQPValue::ShortShortUInt(i) => Some(HeaderValue::Int(*i as i64)),
        AMQPValue::ShortInt(i) => Some(HeaderValue::Int(*i as i64)),
        AMQPValue::ShortUInt(i) => Some(HeaderValue::Int(*i as i64)),
        AMQPValue::LongInt(i) => Some(HeaderValue::Int(*i as i64)),
        AMQPValue::LongUInt(i) => Some(HeaderValue::Int(*i as i64)),
        AMQPValue::LongLongInt(i) => Some(HeaderValue::Int(*i)),
        AMQPValue::Timestamp(t) => Some(HeaderValue::Int(*t as i64)),
        AMQPValue::Float(f) => Some(HeaderValue::Float(*f as f64)),
        AMQPValue::Double(d) => Some(HeaderValue::Float(*d)),
        AMQPValue::ShortString(s) => Some(HeaderValue::Str(s.as_str().to_string())),
        AMQPValue::LongString(s) => Some(HeaderValue::Str(
            String::from_utf8_lossy(s.as_bytes()).into_owned(),
        )),
        AMQPValue::ByteArray(a) => Some(HeaderValue::Bytes(a.as_slice().to_vec())),
        _ => None,
    }
}

fn amqp_value(value: &HeaderValue) -> AMQPValue {
    match value {
        HeaderValue::Bool(b) => AMQPValue::Boolean(*b),
        HeaderValue::Int(i) => AMQPValue::LongLongInt(*i),
        HeaderValue::Float(f) => AMQPValue::Double(*f),
        HeaderValue::Str(s) => AMQPValue::LongString(LongString::from(s.as_str())),
        HeaderValue::Bytes(b) => AMQPValue::ByteArray(b.clone().into()),
    }
}

/// [`PublishChannel`] over a lapin channel with publisher confirms.
///
/// The channel sits behind a mutex because `lapin::Channel` is not
/// `Sync` and producers publish concurrently.
pub struct LapinChannel {
    channel: Arc<Mutex<Channel>>,
}

impl LapinChannel {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel: Arc::new(Mutex::new(channel)),
        }
    }
}

#[async_trait]
impl PublishChannel for LapinChannel {
    async fn publish(&self, exchange: &str, routing_key: &str, envelope: Envelope) -> Result<()> {
        let (payload, properties) = publish_payload(&envelope);
        let channel = self.channel.lock().await;
        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await?
            .await?;
        Ok(())
    }
}

/// Drive a lapin consumer stream into the dispatcher.
///
/// Acknowledgement policy at this boundary: handler errors nack with
/// requeue; undeliverable messages (binding failures, names with no
/// registered consumer) ack-and-drop, since redelivery cannot change
/// the outcome. The binding core itself never decides requeue policy;
/// it only classifies the failure.
pub async fn run_consumer(
    mut consumer: lapin::Consumer,
    name: &str,
    dispatcher: Arc<Dispatcher>,
) -> Result<()> {
    info!(consumer = %name, "consumer loop started");

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(consumer = %name, error = %e, "error receiving delivery");
                continue;
            }
        };

        let envelope = envelope_from_delivery(&delivery);
        match dispatcher.dispatch(name, &envelope).await {
            Ok(()) => {
                delivery.ack(BasicAckOptions::default()).await?;
            }
            Err(e) if should_requeue(&e) => {
                error!(consumer = %name, error = %e, "handler failed, requeueing");
                delivery
                    .nack(BasicNackOptions {
                        multiple: false,
                        requeue: true,
                    })
                    .await?;
            }
            Err(e) => {
                warn!(consumer = %name, error = %e, "dropping undeliverable message");
                delivery.ack(BasicAckOptions::default()).await?;
            }
        }
    }

    warn!(consumer = %name, "consumer loop stopped");
    Ok(())
}

/// Whether a failed dispatch is worth redelivering. Binding failures
/// and unregistered consumer names cannot succeed on redelivery.
fn should_requeue(error: &Error) -> bool {
    !matches!(error, Error::Bind(_) | Error::UnknownConsumer { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::PropertyName;
    use crate::error::BindError;

    #[test]
    fn header_values_round_trip_through_amqp_values() {
        let cases = vec![
            HeaderValue::Bool(true),
            HeaderValue::Int(-7),
            HeaderValue::Float(2.5),
            HeaderValue::Str("hello".into()),
            HeaderValue::Bytes(vec![0x00, 0xff]),
        ];

        for original in cases {
            let mapped = header_value(&amqp_value(&original)).unwrap();
            assert_eq!(mapped, original);
        }
    }

    #[test]
    fn narrow_integer_widths_map_to_int() {
        assert_eq!(
            header_value(&AMQPValue::ShortShortUInt(200)),
            Some(HeaderValue::Int(200))
        );
        assert_eq!(
            header_value(&AMQPValue::LongUInt(70_000)),
            Some(HeaderValue::Int(70_000))
        );
    }

    #[test]
    fn compound_amqp_values_are_skipped() {
        assert_eq!(header_value(&AMQPValue::FieldTable(FieldTable::default())), None);
        assert_eq!(header_value(&AMQPValue::Void), None);
    }

    #[test]
    fn undeliverable_dispatch_failures_are_not_requeued() {
        assert!(!should_requeue(&Error::Bind(
            BindError::MissingRequiredValue {
                parameter: "count".into(),
            }
        )));
        assert!(!should_requeue(&Error::UnknownConsumer {
            name: "missing".into(),
        }));
        assert!(should_requeue(&Error::Handler(anyhow::anyhow!(
            "downstream unavailable"
        ))));
    }

    #[test]
    fn publish_payload_carries_properties_and_headers() {
        let mut envelope = Envelope::with_body(b"payload".to_vec());
        envelope.set_header("X-Count", 3i64);
        envelope
            .set_property(PropertyName::ContentType, "application/json".into())
            .unwrap();
        envelope
            .set_property(PropertyName::CorrelationId, "abc".into())
            .unwrap();
        envelope.properties_mut().priority = Some(5);

        let (payload, properties) = publish_payload(&envelope);
        assert_eq!(payload, b"payload");
        assert_eq!(
            properties.content_type().as_ref().map(|s| s.as_str()),
            Some("application/json")
        );
        assert_eq!(
            properties.correlation_id().as_ref().map(|s| s.as_str()),
            Some("abc")
        );
        assert_eq!(*properties.priority(), Some(5));

        let headers = properties.headers().as_ref().unwrap();
        assert_eq!(
            headers.inner().get(&ShortString::from("X-Count")),
            Some(&AMQPValue::LongLongInt(3))
        );
    }
}
