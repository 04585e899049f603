//! Core library for the Elestio command-line client.
//!
//! The crate wraps the Elestio management API: a session manager that keeps
//! a short-lived token fresh, a request executor that re-authenticates once
//! when the server rejects a token, a poller that waits for deployments to
//! finish, and a size resolver that validates resize targets against the
//! provider catalog.

pub mod api;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod output;
pub mod poller;
pub mod resize;
pub mod services;
pub mod session;
pub mod store;
pub mod test_support;
mod wire;

pub use api::{ApiClient, ApiError, ApiRequest, AuthSignal, AuthSignals, HttpTransport, Method};
pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, ElestioConfig};
pub use poller::{DeploymentPoller, StatusChange, WaitError};
pub use resize::{ResizeError, ResolvedSize, SizeQuery, resolve_size};
pub use session::{SessionManager, SessionStatus};
pub use store::{Credential, CredentialStore, FileStore, Session, SessionStore, StoreError};
