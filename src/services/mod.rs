//! Service-level operations built on the request executor.

mod actions;
mod deploy;
mod types;

use serde_json::Value;
use tracing::debug;

pub use actions::{
    ACTION_ENDPOINT, PowerAction, ResizeOutcome, ResizeRequest, do_action, power_action,
    resize_service,
};
pub use deploy::{
    DeployError, DeployOptions, DeployOutcome, DeployPlan, deploy_service, validate_server_name,
};
pub use types::{DEPLOYED, Project, RUNNING, Service};

use crate::api::{ApiClient, ApiError, ApiFuture, ApiRequest, response_message, response_status};
use crate::clock::Clock;
use crate::store::{CredentialStore, SessionStore};

/// Identifier the dashboard uses for API-originated calls.
pub const APP_ID: &str = "Cloudxx";

const SERVICES_ENDPOINT: &str = "/api/servers/getServices";
const DETAILS_ENDPOINT: &str = "/api/servers/getServerDetails";
const PROJECTS_ENDPOINT: &str = "/api/projects/getList";

/// Lists the services of a project.
///
/// Implemented by [`ApiClient`] and by scripted doubles in tests.
pub trait ServiceDirectory: Send + Sync {
    /// Returns the active services of `project_id`.
    fn list_services<'a>(&'a self, project_id: &'a str) -> ApiFuture<'a, Vec<Service>>;
}

impl<St, K> ServiceDirectory for ApiClient<St, K>
where
    St: CredentialStore + SessionStore,
    K: Clock,
{
    fn list_services<'a>(&'a self, project_id: &'a str) -> ApiFuture<'a, Vec<Service>> {
        Box::pin(list_services(self, project_id))
    }
}

fn decode<T>(endpoint: &str, value: Value) -> Result<T, ApiError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    serde_json::from_value(value).map_err(|err| ApiError::Decode {
        endpoint: endpoint.to_owned(),
        message: err.to_string(),
    })
}

/// Returns the active services of `project_id`.
///
/// # Errors
///
/// Returns [`ApiError::Remote`] when the API answers `KO` or denies access,
/// and propagates executor errors.
pub async fn list_services<St, K>(
    client: &ApiClient<St, K>,
    project_id: &str,
) -> Result<Vec<Service>, ApiError>
where
    St: CredentialStore + SessionStore,
    K: Clock,
{
    let request = ApiRequest::post(SERVICES_ENDPOINT)
        .param("appid", APP_ID)
        .param("projectId", project_id)
        .param("isActiveService", "true");
    let mut body = client.execute(&request).await?;

    if response_status(&body) == Some("KO")
        || body.get("code").and_then(Value::as_str) == Some("AccessDenied")
    {
        return Err(ApiError::remote(response_message(&body), "Access denied."));
    }

    let services = match body.get_mut("servers").map(Value::take) {
        Some(servers @ Value::Array(_)) => servers,
        _ => body
            .pointer_mut("/data/services")
            .map(Value::take)
            .unwrap_or_else(|| Value::Array(Vec::new())),
    };
    let listed: Vec<Service> = decode(SERVICES_ENDPOINT, services)?;
    debug!(project_id, count = listed.len(), "listed services");
    Ok(listed)
}

/// Returns the detail record of one service.
///
/// # Errors
///
/// Returns [`ApiError::Remote`] when the API reports a failure or returns no
/// record, and propagates executor errors.
pub async fn service_details<St, K>(
    client: &ApiClient<St, K>,
    vm_id: &str,
    project_id: &str,
) -> Result<Service, ApiError>
where
    St: CredentialStore + SessionStore,
    K: Clock,
{
    let request = ApiRequest::post(DETAILS_ENDPOINT)
        .param("vmID", vm_id)
        .param("projectID", project_id);
    let mut body = client.execute(&request).await?;

    if let Some(first) = body
        .get_mut("serviceInfos")
        .and_then(Value::as_array_mut)
        .filter(|infos| !infos.is_empty())
        .map(|infos| infos.swap_remove(0))
    {
        return decode(DETAILS_ENDPOINT, first);
    }
    if response_status(&body) == Some("OK")
        && let Some(data) = body.get_mut("data").filter(|data| !data.is_null())
    {
        return decode(DETAILS_ENDPOINT, data.take());
    }
    Err(ApiError::remote(
        response_message(&body),
        &format!("service {vm_id} not found in project {project_id}"),
    ))
}

/// Returns the projects visible to the account.
///
/// # Errors
///
/// Returns [`ApiError::Remote`] when the API does not answer `OK`, and
/// propagates executor errors.
pub async fn list_projects<St, K>(client: &ApiClient<St, K>) -> Result<Vec<Project>, ApiError>
where
    St: CredentialStore + SessionStore,
    K: Clock,
{
    let mut body = client.execute(&ApiRequest::post(PROJECTS_ENDPOINT)).await?;
    if response_status(&body) != Some("OK") {
        return Err(ApiError::remote(
            response_message(&body),
            "failed to list projects",
        ));
    }
    let projects = body
        .pointer_mut("/data/projects")
        .map(Value::take)
        .unwrap_or_else(|| Value::Array(Vec::new()));
    decode(PROJECTS_ENDPOINT, projects)
}

/// Returns `configured` when set, otherwise the first project of the
/// account.
///
/// # Errors
///
/// Returns [`ApiError::Configuration`] when neither source yields a
/// project, and propagates listing errors.
pub async fn default_project<St, K>(
    client: &ApiClient<St, K>,
    configured: Option<&str>,
) -> Result<String, ApiError>
where
    St: CredentialStore + SessionStore,
    K: Clock,
{
    if let Some(project) = configured.map(str::trim).filter(|id| !id.is_empty()) {
        return Ok(project.to_owned());
    }
    list_projects(client)
        .await?
        .into_iter()
        .map(|project| project.id)
        .find(|id| !id.is_empty())
        .ok_or_else(|| {
            ApiError::Configuration(String::from(
                "no project available: pass --project or set ELESTIO_DEFAULT_PROJECT",
            ))
        })
}

#[cfg(test)]
mod tests;
