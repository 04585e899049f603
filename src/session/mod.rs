//! Session lifecycle: obtain, cache, persist, and invalidate the bearer
//! token used by every authenticated call.
//!
//! Tokens are issued by the authentication endpoint in exchange for the
//! stored credential. The server does not report an expiry, so the manager
//! assigns one locally ([`SESSION_LIFETIME`]) and treats a token as stale
//! [`EXPIRY_MARGIN`] before that instant.

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::api::{ApiError, HttpTransport};
use crate::clock::{Clock, SystemClock};
use crate::store::{Credential, CredentialStore, Session, SessionStore};

/// Lifetime assigned to a freshly issued token.
pub const SESSION_LIFETIME: TimeDelta = TimeDelta::hours(23);

/// Safety margin subtracted from the expiry before a token is reused.
pub const EXPIRY_MARGIN: TimeDelta = TimeDelta::minutes(5);

/// Returns `true` when `session` cannot be used at `now`.
///
/// A session is usable only while it carries both a token and an expiry and
/// `now` has not passed `expiry - EXPIRY_MARGIN`.
#[must_use]
pub fn needs_reauthentication(session: &Session, now: DateTime<Utc>) -> bool {
    match (&session.token, session.expiry) {
        (Some(token), Some(expiry)) if !token.is_empty() => now > expiry - EXPIRY_MARGIN,
        _ => true,
    }
}

/// Snapshot of the local authentication state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionStatus {
    /// Configured account identity, if any.
    pub identity: Option<String>,
    /// Whether a session token is cached.
    pub token_present: bool,
    /// Client-side expiry of the cached token.
    pub expiry: Option<DateTime<Utc>>,
    /// Whether the cached token would be reused right now.
    pub valid: bool,
}

/// Owns the cached session and serialises re-authentication.
///
/// Concurrent callers that observe an expired session wait on the same lock,
/// so at most one authentication request is in flight and the rest reuse its
/// token.
#[derive(Debug)]
pub struct SessionManager<St, K = SystemClock> {
    store: St,
    clock: K,
    transport: HttpTransport,
    cached: Mutex<Option<Session>>,
}

impl<St> SessionManager<St, SystemClock>
where
    St: CredentialStore + SessionStore,
{
    /// Creates a manager backed by the system clock.
    #[must_use]
    pub fn new(store: St, transport: HttpTransport) -> Self {
        Self::with_clock(store, transport, SystemClock)
    }
}

impl<St, K> SessionManager<St, K>
where
    St: CredentialStore + SessionStore,
    K: Clock,
{
    /// Creates a manager using an explicit time source.
    #[must_use]
    pub const fn with_clock(store: St, transport: HttpTransport, clock: K) -> Self {
        Self {
            store,
            clock,
            transport,
            cached: Mutex::const_new(None),
        }
    }

    /// Returns the manager's time source.
    #[must_use]
    pub const fn clock(&self) -> &K {
        &self.clock
    }

    /// Returns the backing store.
    #[must_use]
    pub const fn store(&self) -> &St {
        &self.store
    }

    /// Returns a token that is valid now, authenticating when needed.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Configuration`] when no credential is stored,
    /// [`ApiError::Authentication`] when the server rejects it, and
    /// [`ApiError::Store`] when state cannot be read or persisted.
    pub async fn valid_token(&self) -> Result<String, ApiError> {
        let credential = self
            .store
            .load_credential()?
            .ok_or_else(ApiError::not_configured)?;

        let mut cached = self.cached.lock().await;
        if cached.is_none() {
            *cached = Some(self.store.load_session()?);
        }

        let now = self.clock.now();
        if let Some(session) = cached.as_ref()
            && !needs_reauthentication(session, now)
            && let Some(token) = session.token.as_ref()
        {
            debug!("reusing cached session token");
            return Ok(token.clone());
        }

        let session = self.issue(&credential).await?;
        let token = session.token.clone().unwrap_or_default();
        *cached = Some(session);
        Ok(token)
    }

    /// Discards the cached session in memory and on disk. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Store`] when the cleared session cannot be
    /// persisted.
    pub async fn invalidate(&self) -> Result<(), ApiError> {
        let mut cached = self.cached.lock().await;
        *cached = Some(Session::cleared());
        self.store.save_session(&Session::cleared())?;
        debug!("session invalidated");
        Ok(())
    }

    /// Validates `credential` against the server and stores it together with
    /// the resulting session. Nothing is persisted when validation fails.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Configuration`] when the credential is
    /// incomplete, [`ApiError::Authentication`] when the server rejects it,
    /// and [`ApiError::Store`] when persisting fails.
    pub async fn login(&self, credential: Credential) -> Result<SessionStatus, ApiError> {
        if !credential.is_complete() {
            return Err(ApiError::Configuration(String::from(
                "both an e-mail address and an API token are required",
            )));
        }

        let mut cached = self.cached.lock().await;
        let session = self.issue(&credential).await?;
        self.store.save_credential(&credential)?;
        let status = SessionStatus {
            identity: Some(credential.identity),
            token_present: true,
            expiry: session.expiry,
            valid: true,
        };
        *cached = Some(session);
        Ok(status)
    }

    /// Forces a new token regardless of the cached expiry.
    ///
    /// # Errors
    ///
    /// Same conditions as [`SessionManager::valid_token`].
    pub async fn refresh(&self) -> Result<String, ApiError> {
        self.invalidate().await?;
        self.valid_token().await
    }

    /// Reports the local authentication state without contacting the server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Store`] when stored state cannot be read.
    pub async fn status(&self) -> Result<SessionStatus, ApiError> {
        let identity = self
            .store
            .load_credential()?
            .map(|credential| credential.identity);
        let mut cached = self.cached.lock().await;
        if cached.is_none() {
            *cached = Some(self.store.load_session()?);
        }
        let session = cached.clone().unwrap_or_default();
        Ok(SessionStatus {
            identity,
            token_present: session.token.is_some(),
            expiry: session.expiry,
            valid: !needs_reauthentication(&session, self.clock.now()),
        })
    }

    async fn issue(&self, credential: &Credential) -> Result<Session, ApiError> {
        let token = self.transport.authenticate(credential).await?;
        let expiry = self.clock.now() + SESSION_LIFETIME;
        let session = Session::new(token, expiry);
        self.store.save_session(&session)?;
        info!(identity = %credential.identity, %expiry, "obtained new session token");
        Ok(session)
    }
}
