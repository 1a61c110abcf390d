use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::bind::{ArgumentBinder, BoundValue};
use crate::envelope::{Envelope, PropertyName};
use crate::error::{BindError, ResolutionError};
use crate::registry::BinderRegistry;
use crate::signature::{BindingTarget, MarkerKind, MethodSignature};

struct ResolvedTarget {
    target: BindingTarget,
    binder: Arc<dyn ArgumentBinder>,
}

/// Method signature with a binder matched to every target.
///
/// Produced once per signature at registration or first use; after
/// that, per-message work is extract/populate and conversion only.
pub struct ResolvedSignature {
    name: String,
    steps: Vec<ResolvedTarget>,
}

impl ResolvedSignature {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn targets(&self) -> impl Iterator<Item = &BindingTarget> {
        self.steps.iter().map(|step| &step.target)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether `signature` has the same shape as this resolution.
    fn matches(&self, signature: &MethodSignature) -> bool {
        self.steps.len() == signature.targets.len()
            && self
                .steps
                .iter()
                .zip(&signature.targets)
                .all(|(step, target)| {
                    step.target.marker == target.marker
                        && step.target.binding_name() == target.binding_name()
                        && step.target.ty == target.ty
                        && step.target.required == target.required
                })
    }
}

impl fmt::Debug for ResolvedSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSignature")
            .field("name", &self.name)
            .field("targets", &self.steps.len())
            .finish()
    }
}

/// Orchestrates binder selection, conversion and envelope assembly
/// for one invocation at a time.
///
/// The engine performs no I/O; extract, populate and conversion are
/// synchronous in-memory transforms over an already materialized
/// envelope, safe to call from concurrent invocations.
pub struct BindingEngine {
    registry: Arc<BinderRegistry>,
    resolved: RwLock<HashMap<String, Arc<ResolvedSignature>>>,
}

impl BindingEngine {
    pub fn new(registry: Arc<BinderRegistry>) -> Self {
        Self {
            registry,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &BinderRegistry {
        &self.registry
    }

    /// Match every target of `signature` to a binder, validating the
    /// configuration. Fails fast: a signature that does not resolve is
    /// never used to process a message.
    ///
    /// Resolution is cached by signature name, so the analysis cost is
    /// paid once, not per message.
    pub fn resolve(
        &self,
        signature: &MethodSignature,
    ) -> Result<Arc<ResolvedSignature>, ResolutionError> {
        if let Some(hit) = self
            .resolved
            .read()
            .expect("resolution cache poisoned")
            .get(&signature.name)
        {
            // Signature names are the cache key; a reused name with a
            // different shape must not inherit the first resolution.
            if !hit.matches(signature) {
                return Err(ResolutionError::ConflictingSignature {
                    signature: signature.name.clone(),
                });
            }
            return Ok(hit.clone());
        }

        let mut body_target: Option<&str> = None;
        let mut steps = Vec::with_capacity(signature.targets.len());
        for target in &signature.targets {
            match target.marker {
                MarkerKind::Body => {
                    if body_target.replace(target.name.as_str()).is_some() {
                        return Err(ResolutionError::DuplicateBodyTarget {
                            signature: signature.name.clone(),
                            parameter: target.name.clone(),
                        });
                    }
                }
                MarkerKind::Property => {
                    if PropertyName::parse(target.binding_name()).is_none() {
                        return Err(ResolutionError::UnknownPropertyName {
                            signature: signature.name.clone(),
                            name: target.binding_name().to_string(),
                        });
                    }
                }
                MarkerKind::Header | MarkerKind::MessageState => {}
            }

            let binder = self.registry.lookup(target.marker).ok_or_else(|| {
                ResolutionError::UnresolvedBinder {
                    signature: signature.name.clone(),
                    kind: target.marker,
                }
            })?;
            steps.push(ResolvedTarget {
                target: target.clone(),
                binder,
            });
        }

        let resolved = Arc::new(ResolvedSignature {
            name: signature.name.clone(),
            steps,
        });
        self.resolved
            .write()
            .expect("resolution cache poisoned")
            .insert(signature.name.clone(), resolved.clone());
        debug!(
            signature = %signature.name,
            targets = resolved.len(),
            "resolved method signature"
        );
        Ok(resolved)
    }

    /// Consumer side: extract one bound value per target, in parameter
    /// order. The first binder error aborts the invocation; an unbound
    /// optional target binds to `Absent`, an unbound required target is
    /// a `MissingRequiredValue` error.
    pub fn bind_inbound(
        &self,
        resolved: &ResolvedSignature,
        envelope: &Envelope,
    ) -> Result<Vec<BoundValue>, BindError> {
        let mut values = Vec::with_capacity(resolved.steps.len());
        for step in &resolved.steps {
            match step.binder.extract(envelope, &step.target)? {
                Some(value) => values.push(value),
                None if step.target.required => {
                    return Err(BindError::MissingRequiredValue {
                        parameter: step.target.name.clone(),
                    })
                }
                None => values.push(BoundValue::Absent),
            }
        }
        Ok(values)
    }

    /// Producer side: populate a fresh envelope from the argument
    /// values, one per target, in parameter order. The first binder
    /// error aborts the call and the partial envelope is dropped, so
    /// nothing half-populated ever reaches the transport.
    pub fn bind_outbound(
        &self,
        resolved: &ResolvedSignature,
        args: &[BoundValue],
    ) -> Result<Envelope, BindError> {
        if args.len() != resolved.steps.len() {
            return Err(BindError::ArityMismatch {
                signature: resolved.name.clone(),
                expected: resolved.steps.len(),
                actual: args.len(),
            });
        }

        // Body encoding honors the envelope's content type, so field
        // targets populate first and the body target last, whatever
        // the parameter order. At most one body target exists per
        // signature, validated at resolution.
        let mut envelope = Envelope::new();
        let mut body: Option<(&ResolvedTarget, &BoundValue)> = None;
        for (step, value) in resolved.steps.iter().zip(args) {
            if step.target.marker == MarkerKind::Body {
                body = Some((step, value));
                continue;
            }
            step.binder.populate(&mut envelope, &step.target, value)?;
        }
        if let Some((step, value)) = body {
            step.binder.populate(&mut envelope, &step.target, value)?;
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::convert::StandardConverter;
    use crate::envelope::{HeaderValue, Properties};
    use crate::signature::TargetType;

    fn engine() -> BindingEngine {
        let registry = BinderRegistry::standard(Arc::new(StandardConverter));
        BindingEngine::new(Arc::new(registry))
    }

    #[test]
    fn duplicate_body_target_fails_at_resolution() {
        let engine = engine();
        let signature = MethodSignature::new(
            "send",
            vec![
                BindingTarget::body("first", TargetType::Json),
                BindingTarget::body("second", TargetType::Bytes),
            ],
        );

        let err = engine.resolve(&signature).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::DuplicateBodyTarget {
                signature: "send".into(),
                parameter: "second".into(),
            }
        );
    }

    #[test]
    fn unknown_property_name_fails_at_resolution() {
        let engine = engine();
        let signature = MethodSignature::new(
            "on_message",
            vec![BindingTarget::property("delivery_tag", TargetType::Integer)],
        );

        let err = engine.resolve(&signature).unwrap_err();
        assert!(matches!(err, ResolutionError::UnknownPropertyName { .. }));
    }

    #[test]
    fn empty_registry_cannot_resolve_any_target() {
        let engine = BindingEngine::new(Arc::new(BinderRegistry::new()));
        let signature = MethodSignature::new(
            "send",
            vec![BindingTarget::body("payload", TargetType::Bytes)],
        );

        let err = engine.resolve(&signature).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::UnresolvedBinder {
                signature: "send".into(),
                kind: MarkerKind::Body,
            }
        );
    }

    #[test]
    fn resolution_is_cached_by_signature_name() {
        let engine = engine();
        let signature = MethodSignature::new(
            "on_message",
            vec![BindingTarget::body("payload", TargetType::Bytes)],
        );

        let first = engine.resolve(&signature).unwrap();
        let second = engine.resolve(&signature).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn resolved_signature_debug_names_the_signature() {
        let engine = engine();
        let signature = MethodSignature::new(
            "on_message",
            vec![BindingTarget::body("payload", TargetType::Bytes)],
        );

        let resolved = engine.resolve(&signature).unwrap();
        let rendered = format!("{resolved:?}");
        assert!(rendered.contains("on_message"));
        assert!(rendered.contains("targets: 1"));
    }

    #[test]
    fn reused_signature_name_with_different_shape_is_rejected() {
        let engine = engine();
        let first = MethodSignature::new(
            "on_message",
            vec![BindingTarget::body("payload", TargetType::Bytes)],
        );
        engine.resolve(&first).unwrap();

        let second = MethodSignature::new(
            "on_message",
            vec![
                BindingTarget::header("count", TargetType::Integer),
                BindingTarget::body("payload", TargetType::Bytes),
            ],
        );
        let err = engine.resolve(&second).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::ConflictingSignature {
                signature: "on_message".into(),
            }
        );

        // A cached name must not hide validation errors either: a
        // malformed reuse is rejected, not served from the cache.
        let malformed = MethodSignature::new(
            "on_message",
            vec![
                BindingTarget::body("first", TargetType::Bytes),
                BindingTarget::body("second", TargetType::Bytes),
            ],
        );
        assert!(engine.resolve(&malformed).is_err());
    }

    #[test]
    fn wire_string_header_binds_to_integer() {
        let engine = engine();
        let signature = MethodSignature::new(
            "on_count",
            vec![BindingTarget::header("count", TargetType::Integer).named("X-Count")],
        );
        let resolved = engine.resolve(&signature).unwrap();

        let mut envelope = Envelope::new();
        envelope.set_header("X-Count", "42");

        let args = engine.bind_inbound(&resolved, &envelope).unwrap();
        assert_eq!(args, vec![BoundValue::Value(serde_json::json!(42))]);
    }

    #[test]
    fn missing_optional_header_binds_to_absent() {
        let engine = engine();
        let signature = MethodSignature::new(
            "on_count",
            vec![BindingTarget::header("X-Count", TargetType::Integer).optional()],
        );
        let resolved = engine.resolve(&signature).unwrap();

        let args = engine.bind_inbound(&resolved, &Envelope::new()).unwrap();
        assert_eq!(args, vec![BoundValue::Absent]);
        assert_eq!(args[0].to::<Option<i64>>().unwrap(), None);
    }

    #[test]
    fn missing_required_header_aborts_the_invocation() {
        let engine = engine();
        let signature = MethodSignature::new(
            "on_count",
            vec![BindingTarget::header("count", TargetType::Integer)],
        );
        let resolved = engine.resolve(&signature).unwrap();

        let err = engine.bind_inbound(&resolved, &Envelope::new()).unwrap_err();
        match err {
            BindError::MissingRequiredValue { parameter } => assert_eq!(parameter, "count"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn body_only_signature_produces_exact_envelope() {
        let engine = engine();
        let signature = MethodSignature::new(
            "send",
            vec![BindingTarget::body("body", TargetType::Bytes)],
        );
        let resolved = engine.resolve(&signature).unwrap();

        let envelope = engine
            .bind_outbound(&resolved, &[BoundValue::Bytes(vec![0x01, 0x02])])
            .unwrap();

        assert_eq!(envelope.body(), &[0x01, 0x02]);
        assert!(envelope.headers().is_empty());
        assert_eq!(envelope.properties(), &Properties::default());
    }

    #[test]
    fn outbound_arity_mismatch_is_rejected() {
        let engine = engine();
        let signature = MethodSignature::new(
            "send",
            vec![BindingTarget::body("body", TargetType::Bytes)],
        );
        let resolved = engine.resolve(&signature).unwrap();

        let err = engine.bind_outbound(&resolved, &[]).unwrap_err();
        assert!(matches!(err, BindError::ArityMismatch { .. }));
    }

    #[test]
    fn populate_then_extract_round_trips_every_scalar() {
        let engine = engine();
        let cases = vec![
            (TargetType::Bool, BoundValue::from(true)),
            (TargetType::Integer, BoundValue::from(42i64)),
            (TargetType::Float, BoundValue::from(2.5f64)),
            (TargetType::String, BoundValue::from("hello")),
        ];

        for (ty, value) in cases {
            let signature = MethodSignature::new(
                format!("round_trip_{}", ty.name()),
                vec![BindingTarget::header("field", ty)],
            );
            let resolved = engine.resolve(&signature).unwrap();

            let envelope = engine
                .bind_outbound(&resolved, std::slice::from_ref(&value))
                .unwrap();
            let args = engine.bind_inbound(&resolved, &envelope).unwrap();
            assert_eq!(args, vec![value], "round trip failed for {}", ty.name());
        }
    }

    #[test]
    fn structured_body_round_trips() {
        let engine = engine();
        let signature = MethodSignature::new(
            "send_order",
            vec![
                BindingTarget::property("content_type", TargetType::String),
                BindingTarget::body("order", TargetType::Json),
            ],
        );
        let resolved = engine.resolve(&signature).unwrap();

        let order = BoundValue::json(serde_json::json!({ "id": 9, "lines": [1, 2] })).unwrap();
        let envelope = engine
            .bind_outbound(
                &resolved,
                &[BoundValue::from("application/json"), order.clone()],
            )
            .unwrap();

        let args = engine.bind_inbound(&resolved, &envelope).unwrap();
        assert_eq!(args[1], order);
    }

    #[test]
    fn body_declared_before_content_type_round_trips() {
        let engine = engine();
        let signature = MethodSignature::new(
            "send_note",
            vec![
                BindingTarget::body("msg", TargetType::String),
                BindingTarget::property("content_type", TargetType::String),
            ],
        );
        let resolved = engine.resolve(&signature).unwrap();

        let envelope = engine
            .bind_outbound(
                &resolved,
                &[
                    BoundValue::from("hello"),
                    BoundValue::from("application/json"),
                ],
            )
            .unwrap();
        assert_eq!(
            envelope.properties().content_type.as_deref(),
            Some("application/json")
        );

        let args = engine.bind_inbound(&resolved, &envelope).unwrap();
        assert_eq!(args[0], BoundValue::from("hello"));
    }

    #[test]
    fn conversion_failure_short_circuits_later_binders() {
        struct CountingBinder(Arc<AtomicUsize>);

        impl ArgumentBinder for CountingBinder {
            fn extract(
                &self,
                _envelope: &Envelope,
                _target: &BindingTarget,
            ) -> Result<Option<BoundValue>, BindError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(Some(BoundValue::Absent))
            }

            fn populate(
                &self,
                _envelope: &mut Envelope,
                _target: &BindingTarget,
                _value: &BoundValue,
            ) -> Result<(), BindError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = BinderRegistry::standard(Arc::new(StandardConverter));
        registry.register(MarkerKind::Body, Arc::new(CountingBinder(calls.clone())));
        let engine = BindingEngine::new(Arc::new(registry));

        let signature = MethodSignature::new(
            "on_message",
            vec![
                BindingTarget::header("count", TargetType::Integer),
                BindingTarget::body("payload", TargetType::Json),
            ],
        );
        let resolved = engine.resolve(&signature).unwrap();

        // Inbound: parameter 1 fails conversion, the body binder for
        // parameter 2 must never run.
        let mut envelope = Envelope::new();
        envelope.set_header("count", "not-a-number");
        assert!(engine.bind_inbound(&resolved, &envelope).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Outbound: a compound value cannot become a header, so the
        // body binder must not populate either.
        let bad_header = BoundValue::Value(serde_json::json!({ "nested": true }));
        assert!(engine
            .bind_outbound(&resolved, &[bad_header, BoundValue::from("x")])
            .is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn message_state_target_binds_the_whole_envelope() {
        let engine = engine();
        let signature = MethodSignature::new(
            "on_raw",
            vec![
                BindingTarget::message_state("state"),
                BindingTarget::header("count", TargetType::Integer).optional(),
            ],
        );
        let resolved = engine.resolve(&signature).unwrap();

        let mut envelope = Envelope::with_body(b"payload".to_vec());
        envelope.set_header("extra", HeaderValue::Bool(true));

        let args = engine.bind_inbound(&resolved, &envelope).unwrap();
        assert_eq!(args[0].as_state(), Some(&envelope));
        assert!(args[1].is_absent());
    }
}
