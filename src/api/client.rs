//! Authenticated request executor.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{ApiError, ApiFuture, ApiRequest, AuthSignals, HttpTransport, RawResponse};
use crate::catalog::{
    CatalogCache, SIZES_ENDPOINT, SizeCatalog, SizeEntry, TEMPLATES_ENDPOINT, Template,
    TemplateCatalog, decode_instances,
};
use crate::clock::{Clock, SystemClock};
use crate::session::SessionManager;
use crate::store::{CredentialStore, SessionStore};

/// Executes API calls on behalf of the configured account.
///
/// Every authenticated call goes through [`ApiClient::execute`], which
/// retries at most once after an authentication failure.
#[derive(Debug)]
pub struct ApiClient<St, K = SystemClock> {
    transport: HttpTransport,
    session: SessionManager<St, K>,
    signals: AuthSignals,
    sizes: CatalogCache<SizeEntry>,
    templates: CatalogCache<Template>,
}

impl<St, K> ApiClient<St, K>
where
    St: CredentialStore + SessionStore,
    K: Clock,
{
    /// Builds a client that shares `transport` with `session`.
    #[must_use]
    pub fn new(transport: HttpTransport, session: SessionManager<St, K>) -> Self {
        Self {
            transport,
            session,
            signals: AuthSignals::default(),
            sizes: CatalogCache::default(),
            templates: CatalogCache::default(),
        }
    }

    /// Replaces the authentication-failure rules.
    #[must_use]
    pub fn with_signals(mut self, signals: AuthSignals) -> Self {
        self.signals = signals;
        self
    }

    /// Returns the session manager.
    #[must_use]
    pub const fn session(&self) -> &SessionManager<St, K> {
        &self.session
    }

    /// Returns the time source shared with the session manager.
    #[must_use]
    pub const fn clock(&self) -> &K {
        self.session.clock()
    }

    /// Sends an authenticated request and returns the parsed body.
    ///
    /// When the response looks like an authentication failure the session is
    /// invalidated and the request is sent once more with a fresh token.
    /// Non-authentication failures in the body are returned untouched for
    /// the caller to interpret.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::AuthRetryExhausted`] when the retry is rejected
    /// too, and propagates session, transport, and decode errors unchanged.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let token = self.session.valid_token().await?;
        let first = self.transport.send(request, Some(&token)).await?;
        let Some(signal) = self.signals.detect(&first) else {
            return Ok(first.body);
        };

        warn!(
            endpoint = %request.endpoint,
            ?signal,
            "session rejected; re-authenticating and retrying once"
        );
        self.session.invalidate().await?;
        let fresh_token = self.session.valid_token().await?;
        let second = self.transport.send(request, Some(&fresh_token)).await?;
        if self.signals.detect(&second).is_some() {
            return Err(exhausted(request, &second));
        }
        Ok(second.body)
    }

    /// Sends a request without a token and without retrying.
    ///
    /// # Errors
    ///
    /// Propagates transport and decode errors.
    pub async fn execute_unauthenticated(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let response = self.transport.send(request, None).await?;
        Ok(response.body)
    }

    /// Fetches the size catalog again and replaces the cached copy.
    ///
    /// # Errors
    ///
    /// Propagates transport and decode errors; the previous copy is kept.
    pub async fn refresh_sizes(&self) -> Result<Arc<Vec<SizeEntry>>, ApiError> {
        let fresh = self.fetch_catalog(SIZES_ENDPOINT).await?;
        Ok(self.sizes.replace(fresh).await)
    }

    async fn fetch_catalog<T>(&self, endpoint: &str) -> Result<Vec<T>, ApiError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        debug!(endpoint, "fetching catalog");
        let body = self
            .execute_unauthenticated(&ApiRequest::get(endpoint))
            .await?;
        decode_instances(endpoint, &body)
    }
}

fn exhausted(request: &ApiRequest, response: &RawResponse) -> ApiError {
    ApiError::AuthRetryExhausted {
        endpoint: request.endpoint.clone(),
        message: response.describe(),
    }
}

impl<St, K> SizeCatalog for ApiClient<St, K>
where
    St: CredentialStore + SessionStore,
    K: Clock,
{
    fn sizes(&self) -> ApiFuture<'_, Arc<Vec<SizeEntry>>> {
        Box::pin(async move {
            self.sizes
                .get_or_fetch(|| self.fetch_catalog(SIZES_ENDPOINT))
                .await
        })
    }
}

impl<St, K> TemplateCatalog for ApiClient<St, K>
where
    St: CredentialStore + SessionStore,
    K: Clock,
{
    fn templates(&self) -> ApiFuture<'_, Arc<Vec<Template>>> {
        Box::pin(async move {
            self.templates
                .get_or_fetch(|| self.fetch_catalog(TEMPLATES_ENDPOINT))
                .await
        })
    }
}
