//! Transport boundary between the URL layer and a server.
//!
//! The crate does not ship an HTTP client. Applications implement
//! [`Transport`] over their client of choice; tests use
//! [`crate::fixture::FixtureStore`].

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::{error::TransportError, url::Method};

/// One request as produced by the URL layer.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: Method,
    /// Path with placeholders already expanded and percent-encoded.
    pub path: String,
    /// Query-string pairs, not yet encoded.
    pub query: Vec<(String, String)>,
    /// JSON body for writes.
    pub body: Option<Value>,
}

impl TransportRequest {
    /// A request without query or body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Attach query-string pairs.
    #[must_use]
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Path plus the percent-encoded query string.
    #[must_use]
    pub fn url(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query: Vec<String> = self
            .query
            .iter()
            .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
            .collect();
        format!("{}?{}", self.path, query.join("&"))
    }
}

impl fmt::Display for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {}", self.method, self.url()) }
}

/// A server's answer.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// JSON body; `null` when the server sent none.
    pub body: Value,
}

impl TransportResponse {
    /// A `200 OK` response carrying `body`.
    #[must_use]
    pub fn ok(body: Value) -> Self { Self { status: 200, body } }

    /// A response with an explicit status.
    #[must_use]
    pub fn with_status(status: u16, body: Value) -> Self { Self { status, body } }

    /// Whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }
}

/// Sends requests to a server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `request` and return the server's response.
    ///
    /// Non-success statuses are returned as responses, not errors; the URL
    /// layer decides how to treat them.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] when the request could not be
    /// delivered.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}
