use std::fmt;

/// Category a parameter declares itself as.
///
/// A parameter that carries no explicit marker is a body target, so the
/// constructors on [`BindingTarget`] treat body as the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Body,
    Header,
    Property,
    MessageState,
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarkerKind::Body => "body",
            MarkerKind::Header => "header",
            MarkerKind::Property => "property",
            MarkerKind::MessageState => "message-state",
        };
        f.write_str(name)
    }
}

/// Static descriptor of a parameter's declared type.
///
/// This is the declared-type table the binding engine consumes instead
/// of runtime reflection. `Json` covers any structured type that the
/// conversion service can decode; handlers recover the concrete type
/// through [`BoundValue::to`](crate::bind::BoundValue::to).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Bool,
    Integer,
    Float,
    String,
    Bytes,
    Json,
    MessageState,
}

impl TargetType {
    pub fn name(&self) -> &'static str {
        match self {
            TargetType::Bool => "boolean",
            TargetType::Integer => "integer",
            TargetType::Float => "float",
            TargetType::String => "string",
            TargetType::Bytes => "bytes",
            TargetType::Json => "json",
            TargetType::MessageState => "message state",
        }
    }
}

/// Binding requirement of one method parameter.
#[derive(Debug, Clone)]
pub struct BindingTarget {
    /// The parameter's own name, used in error reports and as the
    /// fallback field name when no explicit name is given.
    pub name: String,
    pub marker: MarkerKind,
    /// Explicit field name from the marker (e.g. `named("X-Count")`).
    pub override_name: Option<String>,
    pub ty: TargetType,
    /// Required targets fail the invocation when unbound; optional
    /// targets bind to [`BoundValue::Absent`](crate::bind::BoundValue).
    pub required: bool,
}

impl BindingTarget {
    fn new(name: impl Into<String>, marker: MarkerKind, ty: TargetType) -> Self {
        Self {
            name: name.into(),
            marker,
            override_name: None,
            ty,
            required: true,
        }
    }

    /// Body-marked parameter; also the default for unmarked parameters.
    pub fn body(name: impl Into<String>, ty: TargetType) -> Self {
        Self::new(name, MarkerKind::Body, ty)
    }

    pub fn header(name: impl Into<String>, ty: TargetType) -> Self {
        Self::new(name, MarkerKind::Header, ty)
    }

    pub fn property(name: impl Into<String>, ty: TargetType) -> Self {
        Self::new(name, MarkerKind::Property, ty)
    }

    /// Full message-state parameter; consumer side only.
    pub fn message_state(name: impl Into<String>) -> Self {
        Self::new(name, MarkerKind::MessageState, TargetType::MessageState)
    }

    /// Override the bound field name (the marker argument).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.override_name = Some(name.into());
        self
    }

    /// Mark the parameter as optional: absence binds to "no value".
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Field name this target binds against: the explicit marker name
    /// when given, otherwise the parameter's own name.
    pub fn binding_name(&self) -> &str {
        self.override_name.as_deref().unwrap_or(&self.name)
    }
}

/// Ordered list of binding targets derived from one method signature.
///
/// Signature names are the unit of resolution caching and dispatch
/// routing, so they must be unique within one engine.
#[derive(Debug, Clone)]
pub struct MethodSignature {
    pub name: String,
    pub targets: Vec<BindingTarget>,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, targets: Vec<BindingTarget>) -> Self {
        Self {
            name: name.into(),
            targets,
        }
    }
}

/// Call-site routing metadata for outbound publishing.
#[derive(Debug, Clone)]
pub struct RoutingDescriptor {
    pub exchange: String,
    pub routing_key: String,
}

impl RoutingDescriptor {
    pub fn new(exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }
}
