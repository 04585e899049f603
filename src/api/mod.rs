//! Authenticated request pipeline for the management API.
//!
//! [`ApiClient`] is the single entry point for outbound calls. It asks the
//! [`SessionManager`](crate::session::SessionManager) for a token, sends the
//! request through [`HttpTransport`], inspects the response with
//! [`AuthSignals`], and retries exactly once after forcing a fresh session
//! when the backend rejects the token.

mod client;
mod error;
mod signals;
mod transport;

use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

pub use client::ApiClient;
pub use error::ApiError;
pub use signals::{AuthSignal, AuthSignals};
pub use transport::{HttpTransport, RawResponse};

/// Future returned by API-backed trait methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// HTTP verbs used by the management API.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    /// Parameters travel in the query string.
    Get,
    /// Parameters travel in a JSON body.
    Post,
    /// Parameters travel in a JSON body.
    Put,
    /// Parameters travel in a JSON body.
    Delete,
}

impl Method {
    const fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A single call against the management API.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    /// Path below the base URL, for example `/api/servers/getServices`.
    pub endpoint: String,
    /// HTTP verb.
    pub method: Method,
    /// Call parameters, encoded according to [`Method`].
    pub params: Map<String, Value>,
}

impl ApiRequest {
    /// Creates a request with no parameters.
    #[must_use]
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            params: Map::new(),
        }
    }

    /// Creates a `GET` request.
    #[must_use]
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Get, endpoint)
    }

    /// Creates a `POST` request.
    #[must_use]
    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Post, endpoint)
    }

    /// Creates a `PUT` request.
    #[must_use]
    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Put, endpoint)
    }

    /// Creates a `DELETE` request.
    #[must_use]
    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Delete, endpoint)
    }

    /// Adds a parameter, replacing any previous value under `key`.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Merges every entry of `params` into the request.
    #[must_use]
    pub fn params(mut self, params: Map<String, Value>) -> Self {
        self.params.extend(params);
        self
    }
}

/// Returns the `message` field of a response body, if it is a string.
#[must_use]
pub fn response_message(body: &Value) -> Option<&str> {
    body.get("message").and_then(Value::as_str)
}

/// Returns the `status` field of a response body, if it is a string.
#[must_use]
pub fn response_status(body: &Value) -> Option<&str> {
    body.get("status").and_then(Value::as_str)
}

#[cfg(test)]
mod tests;
