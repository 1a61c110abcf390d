//! # RabbitBind - Argument Binding for RabbitMQ Handlers
//!
//! RabbitBind sits between typed application code and broker message
//! envelopes. Producer and consumer methods are described by static
//! signatures (marker kind, field name, declared type, optionality);
//! a registry of pluggable binders plus a conversion service turns
//! call arguments into envelope fields and inbound envelopes back into
//! typed argument values.
//!
//! Binders and the registry are built once at startup and shared
//! read-only across invocations; per-message work is pure in-memory
//! extraction, population and conversion.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use rabbitbind::{
//!     BinderRegistry, BindingEngine, BindingTarget, Envelope, MethodSignature,
//!     StandardConverter, TargetType,
//! };
//!
//! # fn main() -> rabbitbind::Result<()> {
//! let registry = BinderRegistry::standard(Arc::new(StandardConverter));
//! let engine = BindingEngine::new(Arc::new(registry));
//!
//! let signature = MethodSignature::new(
//!     "on_order",
//!     vec![
//!         BindingTarget::header("count", TargetType::Integer).named("X-Count"),
//!         BindingTarget::body("order", TargetType::Json),
//!     ],
//! );
//! let resolved = engine.resolve(&signature)?;
//!
//! let mut envelope = Envelope::with_body(br#"{"id":7}"#.to_vec());
//! envelope.properties_mut().content_type = Some("application/json".into());
//! envelope.set_header("X-Count", "42");
//!
//! let args = engine.bind_inbound(&resolved, &envelope)?;
//! assert_eq!(args[0].to::<i64>().unwrap(), 42);
//! # Ok(())
//! # }
//! ```

pub mod amqp;
pub mod bind;
pub mod consumer;
pub mod convert;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod producer;
pub mod registry;
pub mod signature;

pub use amqp::{envelope_from_delivery, publish_payload, LapinChannel};
pub use bind::{
    ArgumentBinder, BodyBinder, BoundValue, HeaderBinder, MessageStateBinder, PropertyBinder,
};
pub use consumer::{Dispatcher, FunctionHandler, Handler};
pub use convert::{ConvertValue, StandardConverter};
pub use engine::{BindingEngine, ResolvedSignature};
pub use envelope::{Envelope, HeaderValue, Properties, PropertyName};
pub use error::{BindError, ConversionError, Error, ResolutionError, Result};
pub use producer::{Producer, PublishChannel};
pub use registry::BinderRegistry;
pub use signature::{BindingTarget, MarkerKind, MethodSignature, RoutingDescriptor, TargetType};
