//! HTTP transport for the management API.

use std::time::Duration;

use serde_json::{Map, Value, json};
use tracing::debug;

use super::{ApiError, ApiRequest, Method, response_message, response_status};
use crate::store::Credential;

const AUTH_ENDPOINT: &str = "/api/auth/checkAPIToken";
const TOKEN_PARAM: &str = "jwt";

/// Status code and decoded body of one HTTP exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded JSON body; `Null` when the body was empty.
    pub body: Value,
}

impl RawResponse {
    /// Returns the server message, falling back to the HTTP status.
    #[must_use]
    pub fn describe(&self) -> String {
        response_message(&self.body).map_or_else(
            || format!("HTTP {}", self.status),
            ToOwned::to_owned,
        )
    }
}

/// Thin wrapper around a shared `reqwest` client bound to one base URL.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Builds a transport for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] when the HTTP client cannot be built
    /// (for example when no TLS backend is available).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let base = base_url.into();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ApiError::Transport {
                endpoint: base.clone(),
                message: err.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base.trim_end_matches('/').to_owned(),
        })
    }

    /// Returns the base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    /// Sends `request`, attaching `token` when present.
    ///
    /// `GET` requests carry the token and every parameter in the query
    /// string. Other verbs carry them in a JSON object body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] when the exchange fails and
    /// [`ApiError::Decode`] when a non-401 body is not JSON.
    pub async fn send(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<RawResponse, ApiError> {
        let url = self.url(&request.endpoint);
        let builder = match request.method {
            Method::Get => {
                let mut query: Vec<(String, String)> = Vec::with_capacity(request.params.len() + 1);
                if let Some(jwt) = token {
                    query.push((TOKEN_PARAM.to_owned(), jwt.to_owned()));
                }
                query.extend(
                    request
                        .params
                        .iter()
                        .map(|(key, value)| (key.clone(), query_value(value))),
                );
                self.http.get(&url).query(&query)
            }
            method => {
                let mut body = Map::new();
                if let Some(jwt) = token {
                    body.insert(TOKEN_PARAM.to_owned(), Value::String(jwt.to_owned()));
                }
                body.extend(request.params.clone());
                let builder = self.http.request(method.as_reqwest(), &url);
                if body.is_empty() {
                    builder
                } else {
                    builder.json(&Value::Object(body))
                }
            }
        };

        debug!(endpoint = %request.endpoint, method = ?request.method, "sending request");
        let response = builder.send().await.map_err(|err| ApiError::Transport {
            endpoint: request.endpoint.clone(),
            message: err.to_string(),
        })?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|err| ApiError::Transport {
            endpoint: request.endpoint.clone(),
            message: err.to_string(),
        })?;
        debug!(endpoint = %request.endpoint, status, "received response");

        let body = match parse_body(&text) {
            Ok(body) => body,
            Err(_) if status == 401 => Value::Null,
            Err(err) => {
                return Err(ApiError::Decode {
                    endpoint: request.endpoint.clone(),
                    message: err.to_string(),
                });
            }
        };
        Ok(RawResponse { status, body })
    }

    /// Exchanges a credential for a session token.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Authentication`] when the server rejects the
    /// credential, answers without a token, or cannot be reached.
    pub async fn authenticate(&self, credential: &Credential) -> Result<String, ApiError> {
        let response = self
            .http
            .post(self.url(AUTH_ENDPOINT))
            .json(&json!({
                "email": credential.identity,
                "token": credential.secret,
            }))
            .send()
            .await
            .map_err(|err| ApiError::Authentication {
                message: err.to_string(),
            })?;
        let text = response
            .text()
            .await
            .map_err(|err| ApiError::Authentication {
                message: err.to_string(),
            })?;
        let body = parse_body(&text).map_err(|err| ApiError::Authentication {
            message: format!("invalid response: {err}"),
        })?;

        let token = body
            .get(TOKEN_PARAM)
            .and_then(Value::as_str)
            .filter(|jwt| !jwt.is_empty());
        match (response_status(&body), token) {
            (Some("OK"), Some(jwt)) => Ok(jwt.to_owned()),
            _ => Err(ApiError::Authentication {
                message: response_message(&body)
                    .unwrap_or("Authentication failed")
                    .to_owned(),
            }),
        }
    }
}

fn parse_body(text: &str) -> Result<Value, serde_json::Error> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text)
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
