//! Error type for the request pipeline.

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the session manager and the request executor.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Raised when no usable credential is configured. Not retryable.
    #[error("not configured: {0}")]
    Configuration(String),
    /// Raised when the authentication endpoint rejects the credential or
    /// cannot be reached.
    #[error("authentication failed: {message}")]
    Authentication {
        /// Server-supplied message, or a transport description.
        message: String,
    },
    /// Raised when a call is rejected for authentication reasons again right
    /// after the session was refreshed.
    #[error("{endpoint} rejected a freshly issued session: {message}")]
    AuthRetryExhausted {
        /// Endpoint that rejected the call.
        endpoint: String,
        /// Server-supplied message from the second rejection.
        message: String,
    },
    /// Raised when the HTTP exchange itself fails.
    #[error("request to {endpoint} failed: {message}")]
    Transport {
        /// Endpoint being called.
        endpoint: String,
        /// Underlying client error.
        message: String,
    },
    /// Raised when the response body is not the JSON the call expects.
    #[error("unexpected response from {endpoint}: {message}")]
    Decode {
        /// Endpoint being called.
        endpoint: String,
        /// Parser error or description of the mismatch.
        message: String,
    },
    /// Raised by wrapper operations when the API reports a domain failure
    /// (for example `status: "KO"`).
    #[error("{message}")]
    Remote {
        /// Server-supplied message.
        message: String,
    },
    /// Raised when credentials or the session cannot be persisted.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    /// Builds the error used when no credential has been configured.
    #[must_use]
    pub fn not_configured() -> Self {
        Self::Configuration(String::from(
            "no credential found; run `elestio login --email <email> --token <token>`",
        ))
    }

    /// Builds a [`ApiError::Remote`] from an optional server message.
    #[must_use]
    pub fn remote(message: Option<&str>, fallback: &str) -> Self {
        Self::Remote {
            message: message.unwrap_or(fallback).to_owned(),
        }
    }
}
