use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::bind::{ArgumentBinder, BodyBinder, HeaderBinder, MessageStateBinder, PropertyBinder};
use crate::convert::ConvertValue;
use crate::signature::MarkerKind;

/// Registry mapping marker kinds to binder implementations.
///
/// Built once at startup with the conversion service as an explicit
/// dependency, then shared read-only across invocations. Registration
/// is append-only; re-registering a kind overwrites the previous binder
/// deterministically (last registration wins), since startup order may
/// vary between deployments.
pub struct BinderRegistry {
    binders: HashMap<MarkerKind, Arc<dyn ArgumentBinder>>,
    order: Vec<MarkerKind>,
}

impl BinderRegistry {
    /// Empty registry, for callers assembling a custom binder set.
    pub fn new() -> Self {
        Self {
            binders: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registry with the four built-in binders wired to `converter`.
    pub fn standard(converter: Arc<dyn ConvertValue>) -> Self {
        let mut registry = Self::new();
        registry.register(MarkerKind::Body, Arc::new(BodyBinder::new(converter.clone())));
        registry.register(
            MarkerKind::Header,
            Arc::new(HeaderBinder::new(converter.clone())),
        );
        registry.register(
            MarkerKind::Property,
            Arc::new(PropertyBinder::new(converter)),
        );
        registry.register(MarkerKind::MessageState, Arc::new(MessageStateBinder));
        registry
    }

    /// Register a binder for a marker kind. Last registration wins.
    pub fn register(&mut self, kind: MarkerKind, binder: Arc<dyn ArgumentBinder>) {
        if self.binders.insert(kind, binder).is_none() {
            self.order.push(kind);
        }
        debug!(%kind, "registered argument binder");
    }

    /// O(1) lookup by marker kind.
    pub fn lookup(&self, kind: MarkerKind) -> Option<Arc<dyn ArgumentBinder>> {
        self.binders.get(&kind).cloned()
    }

    /// All registered binders, in first-registration order, for the
    /// default/fallback resolution pass.
    pub fn all(&self) -> impl Iterator<Item = (MarkerKind, Arc<dyn ArgumentBinder>)> + '_ {
        self.order
            .iter()
            .filter_map(|kind| self.binders.get(kind).map(|b| (*kind, b.clone())))
    }

    pub fn len(&self) -> usize {
        self.binders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binders.is_empty()
    }
}

impl Default for BinderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::BoundValue;
    use crate::convert::StandardConverter;
    use crate::envelope::Envelope;
    use crate::error::BindError;
    use crate::signature::BindingTarget;

    struct NullBinder;

    impl ArgumentBinder for NullBinder {
        fn extract(
            &self,
            _envelope: &Envelope,
            _target: &BindingTarget,
        ) -> Result<Option<BoundValue>, BindError> {
            Ok(None)
        }

        fn populate(
            &self,
            _envelope: &mut Envelope,
            _target: &BindingTarget,
            _value: &BoundValue,
        ) -> Result<(), BindError> {
            Ok(())
        }
    }

    #[test]
    fn standard_registry_covers_all_marker_kinds() {
        let registry = BinderRegistry::standard(Arc::new(StandardConverter));
        assert_eq!(registry.len(), 4);
        for kind in [
            MarkerKind::Body,
            MarkerKind::Header,
            MarkerKind::Property,
            MarkerKind::MessageState,
        ] {
            assert!(registry.lookup(kind).is_some(), "missing binder for {kind}");
        }
    }

    #[test]
    fn re_registration_overwrites_silently() {
        let mut registry = BinderRegistry::standard(Arc::new(StandardConverter));
        let replacement: Arc<dyn ArgumentBinder> = Arc::new(NullBinder);
        registry.register(MarkerKind::Header, replacement.clone());

        assert_eq!(registry.len(), 4);
        let resolved = registry.lookup(MarkerKind::Header).unwrap();
        assert!(Arc::ptr_eq(&resolved, &replacement));
    }

    #[test]
    fn all_iterates_in_registration_order() {
        let mut registry = BinderRegistry::new();
        registry.register(MarkerKind::Header, Arc::new(NullBinder));
        registry.register(MarkerKind::Body, Arc::new(NullBinder));
        // Overwriting does not change the original position.
        registry.register(MarkerKind::Header, Arc::new(NullBinder));

        let kinds: Vec<_> = registry.all().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, vec![MarkerKind::Header, MarkerKind::Body]);
    }
}
