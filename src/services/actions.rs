//! Machine actions: power management, termination protection, and resize.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value, json};
use tracing::{info, warn};

use super::{Service, service_details};
use crate::api::{ApiClient, ApiError, ApiRequest, response_message, response_status};
use crate::clock::Clock;
use crate::resize::{ResizeError, SizeQuery, resolve_size};
use crate::store::{CredentialStore, SessionStore};

/// Endpoint accepting every machine action.
pub const ACTION_ENDPOINT: &str = "/api/servers/DoActionOnServer";

const CHANGE_TYPE_ACTION: &str = "changeType";

const MANAGED_DATABASES: &[&str] = &[
    "postgresql",
    "mysql",
    "mariadb",
    "mongodb",
    "redis",
    "memcached",
    "keydb",
    "clickhouse",
    "couchdb",
    "elasticsearch",
    "opensearch",
    "meilisearch",
    "typesense",
    "ferretdb",
];

/// Power and protection actions accepted by the action endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PowerAction {
    /// Graceful reboot.
    Reboot,
    /// Hard reset.
    Reset,
    /// Graceful shutdown.
    Shutdown,
    /// Forced power off.
    PowerOff,
    /// Power on.
    PowerOn,
    /// Restart the application's container stack.
    RestartStack,
    /// Enable termination protection.
    Lock,
    /// Disable termination protection.
    Unlock,
}

impl PowerAction {
    /// Every action, in display order.
    pub const ALL: [Self; 8] = [
        Self::Reboot,
        Self::Reset,
        Self::Shutdown,
        Self::PowerOff,
        Self::PowerOn,
        Self::RestartStack,
        Self::Lock,
        Self::Unlock,
    ];

    /// Returns the action name sent to the API.
    #[must_use]
    pub const fn api_name(self) -> &'static str {
        match self {
            Self::Reboot => "reboot",
            Self::Reset => "reset",
            Self::Shutdown => "shutdown",
            Self::PowerOff => "powerOff",
            Self::PowerOn => "powerOn",
            Self::RestartStack => "restartAppStack",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

impl FromStr for PowerAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        Self::ALL
            .into_iter()
            .find(|action| action.api_name().eq_ignore_ascii_case(wanted))
            .or_else(|| match wanted.to_ascii_lowercase().as_str() {
                "power-off" => Some(Self::PowerOff),
                "power-on" => Some(Self::PowerOn),
                "restart-stack" | "restartstack" => Some(Self::RestartStack),
                _ => None,
            })
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|action| action.api_name()).collect();
                format!("unknown action {wanted:?}; expected one of {}", known.join(", "))
            })
    }
}

/// Runs `action` on `vm_id` with extra parameters.
///
/// An array response is normalised to `{"status": "OK", "data": [...]}`.
///
/// # Errors
///
/// Returns [`ApiError::Remote`] when the API answers `KO` or `error`, and
/// propagates executor errors.
pub async fn do_action<St, K>(
    client: &ApiClient<St, K>,
    vm_id: &str,
    action: &str,
    params: Map<String, Value>,
) -> Result<Value, ApiError>
where
    St: CredentialStore + SessionStore,
    K: Clock,
{
    let request = ApiRequest::post(ACTION_ENDPOINT)
        .param("vmID", vm_id)
        .param("action", action)
        .params(params);
    let body = client.execute(&request).await?;

    if body.is_array() {
        return Ok(json!({ "data": body, "status": "OK" }));
    }
    if matches!(response_status(&body), Some("KO" | "error")) {
        return Err(ApiError::remote(
            response_message(&body),
            &format!("Action \"{action}\" failed"),
        ));
    }
    info!(vm_id, action, "action accepted");
    Ok(body)
}

/// Runs a power or protection action.
///
/// Shutting down a managed database is refused; those services must be
/// rebooted instead. The guard is skipped when the service record cannot be
/// read.
///
/// # Errors
///
/// Returns [`ApiError::Remote`] for refused or failed actions, and
/// propagates executor errors.
pub async fn power_action<St, K>(
    client: &ApiClient<St, K>,
    vm_id: &str,
    project_id: &str,
    action: PowerAction,
) -> Result<Value, ApiError>
where
    St: CredentialStore + SessionStore,
    K: Clock,
{
    if action == PowerAction::Shutdown {
        match service_details(client, vm_id, project_id).await {
            Ok(service) => refuse_managed_database_shutdown(&service)?,
            Err(err) => warn!(vm_id, error = %err, "could not inspect service before shutdown"),
        }
    }
    do_action(client, vm_id, action.api_name(), Map::new()).await
}

fn refuse_managed_database_shutdown(service: &Service) -> Result<(), ApiError> {
    let name = service
        .template_name
        .as_deref()
        .or(service.display_name.as_deref())
        .unwrap_or_default();
    let lowered = name.to_lowercase();
    if MANAGED_DATABASES.iter().any(|db| lowered.contains(db)) {
        return Err(ApiError::Remote {
            message: format!(
                "Cannot shutdown managed database \"{name}\". Use \"reboot\" instead."
            ),
        });
    }
    Ok(())
}

/// Inputs for [`resize_service`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResizeRequest {
    /// Machine to resize.
    pub vm_id: String,
    /// Requested size title or prefix.
    pub size: String,
    /// Project owning the machine.
    pub project_id: String,
    /// Provider used when the service record does not name one.
    pub fallback_provider: String,
    /// Region used when the service record does not name one.
    pub fallback_region: String,
    /// Change CPU and RAM only, leaving the disk untouched.
    pub cpu_ram_only: bool,
}

/// Result of [`resize_service`].
#[derive(Clone, Debug, PartialEq)]
pub enum ResizeOutcome {
    /// The machine already has the requested size; nothing was sent.
    AlreadySized {
        /// Current size title.
        size: String,
    },
    /// The resize was accepted by the API.
    Requested {
        /// Size before the change.
        from: String,
        /// Size requested.
        to: String,
        /// Whether the change reduces CPU or RAM.
        downgrade: bool,
        /// API response.
        response: Value,
    },
}

/// Resizes a machine after validating the target size against the catalog.
///
/// # Errors
///
/// Returns [`ResizeError`] when the size cannot be resolved or the downgrade
/// is not supported, and wraps API failures in [`ResizeError::Api`].
pub async fn resize_service<St, K>(
    client: &ApiClient<St, K>,
    request: &ResizeRequest,
) -> Result<ResizeOutcome, ResizeError>
where
    St: CredentialStore + SessionStore,
    K: Clock,
{
    if request.size.trim().is_empty() {
        return Err(ResizeError::MissingSize);
    }
    let service = service_details(client, &request.vm_id, &request.project_id).await?;
    let provider = service
        .provider()
        .unwrap_or(&request.fallback_provider)
        .to_owned();
    let region = service
        .datacenter
        .clone()
        .filter(|dc| !dc.is_empty())
        .unwrap_or_else(|| request.fallback_region.clone());
    let current = service
        .server_type
        .clone()
        .unwrap_or_else(|| String::from("unknown"));

    let query = SizeQuery {
        requested: request.size.clone(),
        provider: provider.clone(),
        region: region.clone(),
        current: current.clone(),
    };
    let resolved = resolve_size(client, &query).await?;
    if let Some(warning) = resolved.warning(&query) {
        warn!("{warning}");
    }

    if resolved.title == current {
        return Ok(ResizeOutcome::AlreadySized { size: current });
    }
    if resolved.downgrade {
        warn!(from = %current, to = %resolved.title, "downgrade detected");
    }

    info!(vm_id = %request.vm_id, from = %current, to = %resolved.title, "resizing service");
    let mut params = Map::new();
    params.insert(String::from("newType"), Value::String(resolved.title.clone()));
    params.insert(String::from("region"), Value::String(region));
    params.insert(String::from("providerName"), Value::String(provider));
    params.insert(String::from("upgradeCPURAMOnly"), Value::Bool(request.cpu_ram_only));
    let response = do_action(client, &request.vm_id, CHANGE_TYPE_ACTION, params).await?;

    Ok(ResizeOutcome::Requested {
        from: current,
        to: resolved.title,
        downgrade: resolved.downgrade,
        response,
    })
}
