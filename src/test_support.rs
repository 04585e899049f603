//! Test support utilities shared across unit and integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::api::{ApiError, ApiFuture};
use crate::catalog::{SizeCatalog, SizeEntry};
use crate::clock::{Clock, SleepFuture};
use crate::services::{Service, ServiceDirectory};
use crate::store::{Credential, CredentialStore, Session, SessionStore, StoreError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct MemoryState {
    credential: Option<Credential>,
    session: Session,
    session_writes: usize,
    credential_writes: usize,
}

/// In-memory credential and session store that counts writes.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Creates an empty store with no credential configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `credential`.
    #[must_use]
    pub fn with_credential(credential: Credential) -> Self {
        let store = Self::new();
        lock(&store.state).credential = Some(credential);
        store
    }

    /// Seeds the persisted session without counting a write.
    pub fn seed_session(&self, session: Session) {
        lock(&self.state).session = session;
    }

    /// Returns the persisted session.
    #[must_use]
    pub fn session(&self) -> Session {
        lock(&self.state).session.clone()
    }

    /// Returns the persisted credential.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        lock(&self.state).credential.clone()
    }

    /// Returns how many times the session was written.
    #[must_use]
    pub fn session_writes(&self) -> usize {
        lock(&self.state).session_writes
    }

    /// Returns how many times the credential was written.
    #[must_use]
    pub fn credential_writes(&self) -> usize {
        lock(&self.state).credential_writes
    }
}

impl CredentialStore for MemoryStore {
    fn load_credential(&self) -> Result<Option<Credential>, StoreError> {
        Ok(lock(&self.state).credential.clone())
    }

    fn save_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        state.credential = Some(credential.clone());
        state.credential_writes += 1;
        Ok(())
    }
}

impl SessionStore for MemoryStore {
    fn load_session(&self) -> Result<Session, StoreError> {
        Ok(lock(&self.state).session.clone())
    }

    fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        state.session = session.clone();
        state.session_writes += 1;
        Ok(())
    }
}

#[derive(Debug)]
struct ClockState {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

/// Manually driven clock. Sleeping advances time instantly and is recorded.
#[derive(Clone, Debug)]
pub struct ManualClock {
    state: Arc<Mutex<ClockState>>,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState {
                now,
                sleeps: Vec::new(),
            })),
        }
    }

    /// Moves the clock forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        let mut state = lock(&self.state);
        state.now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
    }

    /// Returns every sleep requested so far.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.state).sleeps.clone()
    }

    /// Returns the total time spent sleeping.
    #[must_use]
    pub fn slept(&self) -> Duration {
        lock(&self.state).sleeps.iter().sum()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        )
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        lock(&self.state).now
    }

    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        {
            let mut state = lock(&self.state);
            state.sleeps.push(duration);
            state.now += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        }
        Box::pin(std::future::ready(()))
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    responses: VecDeque<Result<Vec<Service>, String>>,
    last: Vec<Service>,
    queries: usize,
}

/// Service directory that replays pre-seeded listings in FIFO order.
///
/// Once the script is exhausted the last successful listing repeats.
#[derive(Clone, Debug, Default)]
pub struct ScriptedDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl ScriptedDirectory {
    /// Creates a directory with no queued listings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a listing.
    pub fn push_listing(&self, services: Vec<Service>) {
        lock(&self.state).responses.push_back(Ok(services));
    }

    /// Queues a failure surfaced as [`ApiError::Remote`].
    pub fn push_failure(&self, message: &str) {
        lock(&self.state).responses.push_back(Err(message.to_owned()));
    }

    /// Returns how many listings were requested.
    #[must_use]
    pub fn queries(&self) -> usize {
        lock(&self.state).queries
    }
}

impl ServiceDirectory for ScriptedDirectory {
    fn list_services<'a>(&'a self, _project_id: &'a str) -> ApiFuture<'a, Vec<Service>> {
        let result = {
            let mut state = lock(&self.state);
            state.queries += 1;
            match state.responses.pop_front() {
                Some(Ok(services)) => {
                    state.last.clone_from(&services);
                    Ok(services)
                }
                Some(Err(message)) => Err(ApiError::Remote { message }),
                None => Ok(state.last.clone()),
            }
        };
        Box::pin(std::future::ready(result))
    }
}

/// Size catalog serving a fixed list and counting fetches.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    sizes: Arc<Vec<SizeEntry>>,
    fetches: Arc<Mutex<usize>>,
}

impl StaticCatalog {
    /// Creates a catalog serving `sizes`.
    #[must_use]
    pub fn new(sizes: Vec<SizeEntry>) -> Self {
        Self {
            sizes: Arc::new(sizes),
            fetches: Arc::default(),
        }
    }

    /// Returns how many times the catalog was read.
    #[must_use]
    pub fn fetches(&self) -> usize {
        *lock(&self.fetches)
    }
}

impl SizeCatalog for StaticCatalog {
    fn sizes(&self) -> ApiFuture<'_, Arc<Vec<SizeEntry>>> {
        *lock(&self.fetches) += 1;
        Box::pin(std::future::ready(Ok(Arc::clone(&self.sizes))))
    }
}

/// Builds a service record for listings.
#[must_use]
pub fn service(vm_id: &str, deployment_status: &str, status: &str) -> Service {
    Service {
        vm_id: Some(vm_id.to_owned()),
        deployment_status: Some(deployment_status.to_owned()),
        status: Some(status.to_owned()),
        ..Service::default()
    }
}
