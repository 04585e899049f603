//! Deployment readiness polling.
//!
//! A freshly created service takes several minutes to appear in the listing
//! and then walks through provider-specific deployment states. The poller
//! lists the project's services on a fixed cadence until the service reports
//! `Deployed`/`running` or the deadline passes. There is no failure state:
//! a service that never becomes ready simply times out.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::api::ApiError;
use crate::clock::{Clock, elapsed_since};
use crate::services::{Service, ServiceDirectory};

/// Delay between queries once the service is listed.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Delay between queries while the service is not yet listed.
pub const DEFAULT_NOT_FOUND_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on a wait when the caller does not choose one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Emitted when the observed deployment status changes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusChange {
    /// Resource being watched.
    pub resource_id: String,
    /// Status observed before the change, if any.
    pub previous: Option<String>,
    /// Newly observed status.
    pub status: Option<String>,
    /// Time since the wait started.
    pub elapsed: Duration,
}

/// Errors raised while waiting for a deployment.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The service did not become ready before the deadline.
    #[error("deployment of {resource_id} timed out after {}s", elapsed.as_secs())]
    Timeout {
        /// Resource being watched.
        resource_id: String,
        /// Time spent waiting.
        elapsed: Duration,
    },
    /// Listing services failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Polls a [`ServiceDirectory`] until a service is ready.
pub struct DeploymentPoller<'a, L: ?Sized, K: ?Sized> {
    directory: &'a L,
    clock: &'a K,
    project_id: String,
    poll_interval: Duration,
    not_found_interval: Duration,
}

impl<'a, L, K> DeploymentPoller<'a, L, K>
where
    L: ServiceDirectory + ?Sized,
    K: Clock + ?Sized,
{
    /// Creates a poller for services in `project_id` using the default
    /// cadences.
    #[must_use]
    pub fn new(directory: &'a L, clock: &'a K, project_id: impl Into<String>) -> Self {
        Self {
            directory,
            clock,
            project_id: project_id.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            not_found_interval: DEFAULT_NOT_FOUND_INTERVAL,
        }
    }

    /// Overrides the delay between queries once the service is listed.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the delay between queries while the service is missing.
    #[must_use]
    pub const fn with_not_found_interval(mut self, interval: Duration) -> Self {
        self.not_found_interval = interval;
        self
    }

    /// Waits until the service matching `resource_id` (its VM id or provider
    /// server id) is deployed and running, calling `on_change` whenever its
    /// deployment status changes.
    ///
    /// The deadline is checked before every query, so a timeout is never
    /// reported before `timeout` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Timeout`] when the deadline passes and
    /// [`WaitError::Api`] when listing services fails.
    pub async fn wait_for<F>(
        &self,
        resource_id: &str,
        timeout: Duration,
        mut on_change: F,
    ) -> Result<Service, WaitError>
    where
        F: FnMut(&StatusChange) + Send,
    {
        let started = self.clock.now();
        let mut last_status: Option<String> = None;

        loop {
            let elapsed = elapsed_since(started, self.clock.now());
            if elapsed >= timeout {
                return Err(WaitError::Timeout {
                    resource_id: resource_id.to_owned(),
                    elapsed,
                });
            }

            let services = self.directory.list_services(&self.project_id).await?;
            let Some(service) = services
                .into_iter()
                .find(|candidate| candidate.matches_id(resource_id))
            else {
                debug!(resource_id, "service not listed yet");
                self.clock.sleep(self.not_found_interval).await;
                continue;
            };

            if service.deployment_status != last_status {
                let change = StatusChange {
                    resource_id: resource_id.to_owned(),
                    previous: last_status.take(),
                    status: service.deployment_status.clone(),
                    elapsed,
                };
                info!(
                    resource_id,
                    status = change.status.as_deref().unwrap_or("unknown"),
                    "deployment status changed"
                );
                on_change(&change);
                last_status = change.status;
            }

            if service.is_deployed() {
                info!(resource_id, elapsed_secs = elapsed.as_secs(), "deployment complete");
                return Ok(service);
            }
            self.clock.sleep(self.poll_interval).await;
        }
    }
}
