//! Canonical error and result types for the crate.
//!
//! Configuration problems surface synchronously as [`ConfigError`] when a
//! connection is assembled. Everything that can go wrong while an operation
//! runs is folded into [`ConnectError`], which is `Clone` so a single settled
//! result can be handed to every caller waiting on a deduplicated request.

use std::{io, sync::Arc};

use serde_json::Value;
use thiserror::Error;

use crate::connection::{Capability, Operation};

/// Errors raised while validating configuration or composing behaviors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required configuration field was not supplied.
    #[error("missing required configuration field `{0}`")]
    MissingField(&'static str),
    /// The composer was handed an empty behavior list.
    #[error("at least one behavior is required")]
    NoBehaviors,
    /// The list type does not hold items of the model type.
    #[error("list items are `{list_item}` but the model is `{model}`")]
    ListItemMismatch {
        /// Name of the model schema.
        model: String,
        /// Name of the list's item schema.
        list_item: String,
    },
    /// Neither the query logic nor the model declares an identity field.
    #[error("model `{0}` declares no identity field")]
    MissingIdentity(String),
    /// An identity field is not declared by the model schema.
    #[error("identity field `{0}` is not declared by the model")]
    UnknownIdentityField(String),
    /// A URL placeholder names a field the model does not declare.
    #[error("url placeholder `{{{0}}}` is not declared by the model")]
    UnknownPlaceholder(String),
    /// A URL template or route could not be parsed.
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl {
        /// The offending template or route.
        url: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// A behavior was applied before a capability it builds on.
    #[error("behavior `{behavior}` requires {missing:?} to be installed before it")]
    BehaviorOrder {
        /// Name of the behavior being applied.
        behavior: &'static str,
        /// The capability that was not yet provided.
        missing: Capability,
    },
    /// The finished composition lacks a capability some behavior calls into.
    #[error("behavior `{behavior}` expects {missing:?} but no behavior provides it")]
    MissingCapability {
        /// Name of the behavior with the unmet expectation.
        behavior: &'static str,
        /// The capability nobody provided.
        missing: Capability,
    },
}

/// A field value could not be coerced to its declared type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("field `{field}`: {reason}")]
pub struct SchemaError {
    /// Name of the field that failed.
    pub field: String,
    /// Human-readable reason.
    pub reason: String,
}

impl SchemaError {
    pub(crate) fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failures at the transport boundary.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("{method} {path} answered {status}")]
    Status {
        /// HTTP method of the failed request.
        method: &'static str,
        /// Request path.
        path: String,
        /// Status code received.
        status: u16,
        /// Response body, if any.
        body: Value,
    },
    /// The request could not be delivered.
    #[error("transport I/O error: {0}")]
    Io(Arc<io::Error>),
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self { Self::Io(Arc::new(error)) }
}

/// A response body did not have the expected shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// A list response was neither an array nor an envelope holding one.
    #[error("expected a list or an object with a `{prop}` list, found {found}")]
    NotAList {
        /// The envelope property that was searched.
        prop: String,
        /// JSON kind of the body.
        found: &'static str,
    },
    /// An instance response was not an object.
    #[error("expected an object, found {0}")]
    NotAnObject(&'static str),
}

/// Errors produced by connection operations.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ConnectError {
    /// The transport failed or the server rejected the request.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The response body could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A record failed schema coercion.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// No behavior in the composition implements this operation.
    #[error("operation `{}` is not supported by this connection", .0.as_str())]
    Unsupported(Operation),
    /// The record carries no value for the identity fields.
    #[error("record has no identity for `{0}`")]
    MissingIdentity(String),
    /// The server returned no record for the requested identity.
    #[error("no record found for `{0}`")]
    NotFound(String),
}

impl ConnectError {
    /// Returns true when the server answered with `status`.
    #[must_use]
    pub fn is_status(&self, status: u16) -> bool {
        matches!(self, Self::Transport(TransportError::Status { status: s, .. }) if *s == status)
    }
}

/// Canonical result alias for connection operations.
pub type Result<T> = std::result::Result<T, ConnectError>;

/// Short name for the JSON kind of `value`, used in parse errors.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
