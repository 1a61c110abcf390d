use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::bind::BoundValue;
use crate::engine::{BindingEngine, ResolvedSignature};
use crate::envelope::Envelope;
use crate::error::Result;
use crate::signature::{MethodSignature, RoutingDescriptor};

/// Opaque channel capability for publishing an envelope.
///
/// The transport owns connection and channel lifecycle, confirms and
/// retries; this trait is the only surface the producer sees.
#[async_trait]
pub trait PublishChannel: Send + Sync {
    async fn publish(&self, exchange: &str, routing_key: &str, envelope: Envelope) -> Result<()>;
}

/// Call-site wrapper for one producer method.
///
/// The explicit replacement for generated proxies: construction
/// resolves the signature (failing fast on configuration errors), and
/// [`send`](Producer::send) binds the actual arguments into an envelope
/// and hands it to the channel. A binding failure aborts before
/// anything reaches the transport.
pub struct Producer<C> {
    engine: Arc<BindingEngine>,
    signature: Arc<ResolvedSignature>,
    routing: RoutingDescriptor,
    channel: C,
}

impl<C: PublishChannel> Producer<C> {
    pub fn new(
        engine: Arc<BindingEngine>,
        signature: &MethodSignature,
        routing: RoutingDescriptor,
        channel: C,
    ) -> Result<Self> {
        let signature = engine.resolve(signature)?;
        Ok(Self {
            engine,
            signature,
            routing,
            channel,
        })
    }

    pub fn signature(&self) -> &ResolvedSignature {
        &self.signature
    }

    pub fn routing(&self) -> &RoutingDescriptor {
        &self.routing
    }

    /// Bind `args` into an envelope and publish it.
    ///
    /// The routing key comes from the call-site descriptor unless a
    /// property target already populated one. A message id and
    /// timestamp are stamped when the arguments did not set them.
    pub async fn send(&self, args: Vec<BoundValue>) -> Result<()> {
        let mut envelope = self.engine.bind_outbound(&self.signature, &args)?;

        let properties = envelope.properties_mut();
        if properties.routing_key.is_none() {
            properties.routing_key = Some(self.routing.routing_key.clone());
        }
        if properties.message_id.is_none() {
            properties.message_id = Some(Uuid::new_v4().to_string());
        }
        if properties.timestamp.is_none() {
            properties.timestamp = Some(Utc::now());
        }
        let routing_key = properties
            .routing_key
            .clone()
            .unwrap_or_default();

        debug!(
            signature = %self.signature.name(),
            exchange = %self.routing.exchange,
            routing_key = %routing_key,
            "publishing bound envelope"
        );
        self.channel
            .publish(&self.routing.exchange, &routing_key, envelope)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::StandardConverter;
    use crate::registry::BinderRegistry;
    use crate::signature::{BindingTarget, TargetType};
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingChannel {
        published: Arc<Mutex<Vec<(String, String, Envelope)>>>,
    }

    #[async_trait]
    impl PublishChannel for RecordingChannel {
        async fn publish(
            &self,
            exchange: &str,
            routing_key: &str,
            envelope: Envelope,
        ) -> Result<()> {
            self.published
                .lock()
                .await
                .push((exchange.to_string(), routing_key.to_string(), envelope));
            Ok(())
        }
    }

    fn engine() -> Arc<BindingEngine> {
        let registry = BinderRegistry::standard(Arc::new(StandardConverter));
        Arc::new(BindingEngine::new(Arc::new(registry)))
    }

    #[tokio::test]
    async fn send_publishes_bound_envelope_with_routing_metadata() {
        let channel = RecordingChannel::default();
        let signature = MethodSignature::new(
            "send_order",
            vec![
                BindingTarget::header("count", TargetType::Integer).named("X-Count"),
                BindingTarget::body("order", TargetType::Bytes),
            ],
        );
        let producer = Producer::new(
            engine(),
            &signature,
            RoutingDescriptor::new("orders", "orders.created"),
            channel.clone(),
        )
        .unwrap();

        producer
            .send(vec![
                BoundValue::from(3i64),
                BoundValue::Bytes(vec![0x01, 0x02]),
            ])
            .await
            .unwrap();

        let published = channel.published.lock().await;
        let (exchange, routing_key, envelope) = &published[0];
        assert_eq!(exchange, "orders");
        assert_eq!(routing_key, "orders.created");
        assert_eq!(envelope.body(), &[0x01, 0x02]);
        assert_eq!(
            envelope.header("X-Count"),
            Some(&crate::envelope::HeaderValue::Int(3))
        );
        assert_eq!(
            envelope.properties().routing_key.as_deref(),
            Some("orders.created")
        );
        assert!(envelope.properties().message_id.is_some());
        assert!(envelope.properties().timestamp.is_some());
    }

    #[tokio::test]
    async fn argument_supplied_routing_key_wins_over_descriptor() {
        let channel = RecordingChannel::default();
        let signature = MethodSignature::new(
            "send_routed",
            vec![
                BindingTarget::property("routing_key", TargetType::String),
                BindingTarget::body("payload", TargetType::Bytes),
            ],
        );
        let producer = Producer::new(
            engine(),
            &signature,
            RoutingDescriptor::new("orders", "orders.default"),
            channel.clone(),
        )
        .unwrap();

        producer
            .send(vec![
                BoundValue::from("orders.priority"),
                BoundValue::Bytes(vec![1]),
            ])
            .await
            .unwrap();

        let published = channel.published.lock().await;
        assert_eq!(published[0].1, "orders.priority");
    }

    #[tokio::test]
    async fn binding_failure_publishes_nothing() {
        let channel = RecordingChannel::default();
        let signature = MethodSignature::new(
            "send_order",
            vec![
                BindingTarget::header("count", TargetType::Integer),
                BindingTarget::body("order", TargetType::Bytes),
            ],
        );
        let producer = Producer::new(
            engine(),
            &signature,
            RoutingDescriptor::new("orders", "orders.created"),
            channel.clone(),
        )
        .unwrap();

        // Compound value cannot be written as a header.
        let err = producer
            .send(vec![
                BoundValue::Value(serde_json::json!([1, 2])),
                BoundValue::Bytes(vec![1]),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Bind(_)));
        assert!(channel.published.lock().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_signature_fails_at_construction() {
        let signature = MethodSignature::new(
            "bad",
            vec![
                BindingTarget::body("a", TargetType::Bytes),
                BindingTarget::body("b", TargetType::Bytes),
            ],
        );
        let result = Producer::new(
            engine(),
            &signature,
            RoutingDescriptor::new("x", "y"),
            RecordingChannel::default(),
        );
        assert!(result.is_err());
    }
}
