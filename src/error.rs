use thiserror::Error;

use crate::signature::MarkerKind;

/// Result type alias for binding operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for the binding runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Signature could not be resolved against the binder registry
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// A binder failed while processing one message
    #[error(transparent)]
    Bind(#[from] BindError),

    /// AMQP transport errors
    #[error("transport error: {0}")]
    Transport(#[from] lapin::Error),

    /// No consumer registered under the dispatched name
    #[error("no consumer registered for '{name}'")]
    UnknownConsumer { name: String },

    /// Serialization errors outside of argument conversion
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors raised by application handlers
    #[error("handler error: {0}")]
    Handler(#[from] anyhow::Error),
}

/// Configuration errors detected when a method signature is resolved.
///
/// These are raised once, at registration time, and prevent the
/// consumer or producer from being registered at all. No message is
/// ever processed against a malformed signature.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    /// No binder registered for a target's marker kind
    #[error("no binder registered for {kind} targets (signature '{signature}')")]
    UnresolvedBinder {
        signature: String,
        kind: MarkerKind,
    },

    /// More than one body-marked parameter in one signature
    #[error("duplicate body target '{parameter}' in signature '{signature}'")]
    DuplicateBodyTarget {
        signature: String,
        parameter: String,
    },

    /// A property target names a field outside the fixed AMQP record
    #[error("unknown property name '{name}' in signature '{signature}'")]
    UnknownPropertyName { signature: String, name: String },

    /// A signature name was reused with a different target shape
    #[error("signature name '{signature}' reused with a different shape")]
    ConflictingSignature { signature: String },
}

/// Per-invocation binding errors.
///
/// The first binder error aborts the whole invocation; no partially
/// bound argument list or partially populated envelope is ever exposed.
#[derive(Error, Debug)]
pub enum BindError {
    /// Raw wire value could not be converted to the declared type
    #[error("cannot bind parameter '{parameter}' from '{raw}': {source}")]
    Conversion {
        parameter: String,
        raw: String,
        source: ConversionError,
    },

    /// A required header or property was absent from the envelope
    #[error("required value for parameter '{parameter}' is missing")]
    MissingRequiredValue { parameter: String },

    /// The binder has no producer side (message state is extract-only)
    #[error("parameter '{parameter}' cannot be populated into an outgoing envelope")]
    PopulateUnsupported { parameter: String },

    /// Safety net for property names that bypassed resolution
    #[error("'{name}' is not a broker property (parameter '{parameter}')")]
    UnknownProperty { parameter: String, name: String },

    /// Outbound argument count does not match the signature
    #[error("signature '{signature}' expects {expected} arguments, got {actual}")]
    ArityMismatch {
        signature: String,
        expected: usize,
        actual: usize,
    },
}

/// Errors raised by the conversion service
#[derive(Error, Debug)]
pub enum ConversionError {
    /// Value representation does not match the declared type
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// String representation could not be parsed as the declared type
    #[error("cannot parse '{raw}' as {expected}")]
    Parse { raw: String, expected: &'static str },

    /// Structured body could not be decoded or encoded
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Textual body is not valid UTF-8
    #[error("body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}
