//! Authentication-failure detection.
//!
//! The backend does not signal token problems consistently: some endpoints
//! answer HTTP 401, others answer 200 with an error body. Each heuristic is a
//! separate [`AuthSignal`] so new ones can be added without touching the
//! retry logic in the executor.

use serde_json::Value;

use super::{RawResponse, response_message, response_status};

/// One rule that classifies a response as an authentication failure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuthSignal {
    /// The transport status equals this HTTP code.
    HttpStatus(u16),
    /// The body's `code` field equals this value.
    ErrorCode(String),
    /// The body has `status: "error"` and its message contains this text
    /// (case-insensitive).
    ErrorStatusMessageContains(String),
    /// The body's message contains this text (case-insensitive), whatever
    /// the status.
    MessageContains(String),
}

impl AuthSignal {
    /// Returns `true` when `response` exhibits this signal.
    #[must_use]
    pub fn matches(&self, response: &RawResponse) -> bool {
        match self {
            Self::HttpStatus(code) => response.status == *code,
            Self::ErrorCode(code) => {
                response.body.get("code").and_then(Value::as_str) == Some(code.as_str())
            }
            Self::ErrorStatusMessageContains(needle) => {
                response_status(&response.body) == Some("error")
                    && message_contains(&response.body, needle)
            }
            Self::MessageContains(needle) => message_contains(&response.body, needle),
        }
    }
}

fn message_contains(body: &Value, needle: &str) -> bool {
    response_message(body).is_some_and(|message| {
        message
            .to_lowercase()
            .contains(needle.to_lowercase().as_str())
    })
}

/// Ordered set of [`AuthSignal`] rules.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthSignals {
    signals: Vec<AuthSignal>,
}

impl AuthSignals {
    /// Builds a set from explicit rules.
    #[must_use]
    pub const fn new(signals: Vec<AuthSignal>) -> Self {
        Self { signals }
    }

    /// Appends a rule to the set.
    #[must_use]
    pub fn with(mut self, signal: AuthSignal) -> Self {
        self.signals.push(signal);
        self
    }

    /// Returns the first rule matching `response`, if any.
    #[must_use]
    pub fn detect(&self, response: &RawResponse) -> Option<&AuthSignal> {
        self.signals.iter().find(|signal| signal.matches(response))
    }

    /// Returns the configured rules.
    #[must_use]
    pub fn signals(&self) -> &[AuthSignal] {
        &self.signals
    }
}

impl Default for AuthSignals {
    fn default() -> Self {
        Self::new(vec![
            AuthSignal::HttpStatus(401),
            AuthSignal::ErrorCode(String::from("InvalidToken")),
            AuthSignal::ErrorStatusMessageContains(String::from("auth")),
            AuthSignal::MessageContains(String::from("invalid token")),
        ])
    }
}
