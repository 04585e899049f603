//! Service deployment: payload planning, creation, and optional wait.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::{APP_ID, Service};
use crate::api::{ApiClient, ApiError, ApiRequest, response_message};
use crate::catalog::{TemplateCatalog, find_template};
use crate::clock::Clock;
use crate::config::ElestioConfig;
use crate::poller::{DeploymentPoller, StatusChange, WaitError};
use crate::store::{CredentialStore, SessionStore};

const CREATE_ENDPOINT: &str = "/api/servers/createServer";
const MAX_NAME_LEN: usize = 63;
const NAME_SUFFIX_LEN: usize = 8;

/// Caller choices for a deployment; unset fields fall back to configuration
/// defaults.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeployOptions {
    /// Template id, alias, or title.
    pub template: String,
    /// Project to deploy into.
    pub project_id: String,
    /// Server name; generated from the template title when unset.
    pub name: Option<String>,
    /// Size title.
    pub size: Option<String>,
    /// Datacenter.
    pub region: Option<String>,
    /// Hosting provider.
    pub provider: Option<String>,
    /// Support plan.
    pub support: Option<String>,
    /// Administrator e-mail; defaults to the account identity.
    pub admin_email: Option<String>,
    /// Software version; defaults to the template's default tag.
    pub version: Option<String>,
    /// Pipeline name for CI/CD targets; defaults to the server name.
    pub pipeline_name: Option<String>,
    /// Plan only; nothing is created.
    pub dry_run: bool,
    /// Wait for the deployment to finish.
    pub wait: bool,
    /// Upper bound on the wait; the configured timeout when unset.
    pub timeout: Option<Duration>,
}

/// Fully resolved deployment request.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployPlan {
    /// Template title.
    pub template: String,
    /// Template identifier.
    pub template_id: String,
    /// Software version.
    pub version: String,
    /// Target project.
    pub project_id: String,
    /// Server name.
    pub server_name: String,
    /// Hosting provider.
    pub provider: String,
    /// Datacenter.
    pub datacenter: String,
    /// Size title.
    pub server_type: String,
    /// Support plan.
    pub support: String,
    /// Administrator e-mail.
    pub admin_email: String,
    /// `CICD` for CI/CD targets, `Service` otherwise.
    pub service_type: String,
    /// Pipeline name for CI/CD targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_name: Option<String>,
}

impl DeployPlan {
    /// Returns the `createServer` request parameters.
    #[must_use]
    pub fn payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        let mut put = |key: &str, value: &str| {
            payload.insert(key.to_owned(), Value::String(value.to_owned()));
        };
        put("templateID", &self.template_id);
        put("serverType", &self.server_type);
        put("datacenter", &self.datacenter);
        put("providerName", &self.provider);
        put("serverName", &self.server_name);
        put("appid", APP_ID);
        put("data", "data");
        put("support", &self.support);
        put("projectId", &self.project_id);
        put("version", &self.version);
        put("adminEmail", &self.admin_email);
        put("deploymentServiceType", "normal");
        put("serviceType", &self.service_type);
        if let Some(pipeline) = &self.pipeline_name {
            payload.insert(
                String::from("cicdPayload"),
                json!({ "pipelineName": pipeline }),
            );
        }
        payload
    }
}

/// Result of [`deploy_service`].
#[derive(Clone, Debug, PartialEq)]
pub enum DeployOutcome {
    /// Dry run; nothing was created.
    DryRun(DeployPlan),
    /// Creation was accepted; the caller chose not to wait.
    Started {
        /// Submitted plan.
        plan: DeployPlan,
        /// Provider server id, when returned.
        provider_server_id: Option<String>,
        /// API response.
        response: Value,
    },
    /// Creation finished and the service is running.
    Completed {
        /// Submitted plan.
        plan: DeployPlan,
        /// Final service record.
        service: Box<Service>,
    },
}

/// Errors raised while deploying.
#[derive(Debug, Error)]
pub enum DeployError {
    /// No template matches the request.
    #[error("template \"{0}\" not found; list templates with `elestio templates`")]
    TemplateNotFound(String),
    /// The server name is not acceptable.
    #[error("invalid server name \"{name}\": {reason}")]
    InvalidName {
        /// Rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Creation failed.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// Waiting for the deployment failed.
    #[error(transparent)]
    Wait(#[from] WaitError),
}

/// Checks that `name` is usable as a server (DNS) name.
///
/// # Errors
///
/// Returns [`DeployError::InvalidName`] describing the first violated rule.
pub fn validate_server_name(name: &str) -> Result<(), DeployError> {
    let reject = |reason: &str| {
        Err(DeployError::InvalidName {
            name: name.to_owned(),
            reason: reason.to_owned(),
        })
    };
    if name.is_empty() {
        return reject("name must not be empty");
    }
    if name.len() > MAX_NAME_LEN {
        return reject("name must be at most 63 characters");
    }
    if !name
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
    {
        return reject("use lowercase letters, digits, and hyphens only");
    }
    if name.starts_with('-') || name.ends_with('-') {
        return reject("name must not start or end with a hyphen");
    }
    Ok(())
}

fn generated_name(title: &str) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '-' })
        .collect();
    let trimmed: String = slug
        .trim_matches('-')
        .chars()
        .take(MAX_NAME_LEN - NAME_SUFFIX_LEN - 1)
        .collect();
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(NAME_SUFFIX_LEN)
        .collect();
    let base = trimmed.trim_end_matches('-');
    if base.is_empty() {
        format!("service-{suffix}")
    } else {
        format!("{base}-{suffix}")
    }
}

fn pick(choice: Option<&String>, fallback: &str) -> String {
    choice
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .unwrap_or(fallback)
        .to_owned()
}

/// Resolves, creates, and optionally waits for a new service.
///
/// # Errors
///
/// Returns [`DeployError::TemplateNotFound`] or [`DeployError::InvalidName`]
/// before anything is sent, [`DeployError::Api`] when creation is rejected
/// (the response carries neither a provider server id nor an action), and
/// [`DeployError::Wait`] when the deployment does not complete in time.
///
/// `on_change` receives every status change observed while waiting.
pub async fn deploy_service<St, K, F>(
    client: &ApiClient<St, K>,
    config: &ElestioConfig,
    options: &DeployOptions,
    on_change: F,
) -> Result<DeployOutcome, DeployError>
where
    St: CredentialStore + SessionStore,
    K: Clock,
    F: FnMut(&StatusChange) + Send,
{
    let templates = client.templates().await?;
    let template = find_template(&templates, &options.template)
        .ok_or_else(|| DeployError::TemplateNotFound(options.template.clone()))?;

    let server_name = options
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map_or_else(|| generated_name(&template.title), ToOwned::to_owned);
    validate_server_name(&server_name)?;

    let admin_email = match options.admin_email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => email.to_owned(),
        _ => client
            .session()
            .store()
            .load_credential()
            .map_err(ApiError::from)?
            .map(|credential| credential.identity)
            .unwrap_or_default(),
    };
    let is_cicd = template.is_cicd() || options.template.eq_ignore_ascii_case("cicd");
    let plan = DeployPlan {
        template: template.title.clone(),
        template_id: template.id.clone(),
        version: pick(
            options.version.as_ref(),
            template.dockerhub_default_tag.as_deref().unwrap_or("latest"),
        ),
        project_id: options.project_id.clone(),
        provider: pick(options.provider.as_ref(), &config.default_provider),
        datacenter: pick(options.region.as_ref(), &config.default_datacenter),
        server_type: pick(options.size.as_ref(), &config.default_server_type),
        support: pick(options.support.as_ref(), &config.default_support),
        admin_email,
        service_type: String::from(if is_cicd { "CICD" } else { "Service" }),
        pipeline_name: is_cicd.then(|| pick(options.pipeline_name.as_ref(), &server_name)),
        server_name,
    };

    if options.dry_run {
        return Ok(DeployOutcome::DryRun(plan));
    }

    info!(
        template = %plan.template,
        project_id = %plan.project_id,
        server_name = %plan.server_name,
        provider = %plan.provider,
        size = %plan.server_type,
        datacenter = %plan.datacenter,
        "creating service"
    );
    let request = ApiRequest::post(CREATE_ENDPOINT).params(plan.payload());
    let response = client.execute(&request).await?;
    let provider_server_id = response
        .get("providerServerID")
        .filter(|id| !id.is_null())
        .map(|id| id.as_str().map_or_else(|| id.to_string(), ToOwned::to_owned));
    if provider_server_id.is_none() && response.get("action").is_none_or(Value::is_null) {
        let message = response_message(&response);
        return Err(ApiError::remote(message, "Failed to create service").into());
    }
    info!(provider_server_id = ?provider_server_id, "deployment started");

    let Some(resource_id) = provider_server_id.clone().filter(|_| options.wait) else {
        return Ok(DeployOutcome::Started {
            plan,
            provider_server_id,
            response,
        });
    };

    let poller = DeploymentPoller::new(client, client.clock(), plan.project_id.clone())
        .with_poll_interval(config.poll_interval())
        .with_not_found_interval(config.not_found_interval());
    let service = poller
        .wait_for(
            &resource_id,
            options.timeout.unwrap_or_else(|| config.deploy_timeout()),
            on_change,
        )
        .await?;
    Ok(DeployOutcome::Completed {
        plan,
        service: Box::new(service),
    })
}
