//! Service records returned by the listing and detail endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::wire;

/// Deployment status reported once provisioning has finished.
pub const DEPLOYED: &str = "Deployed";

/// Runtime status reported for a healthy machine.
pub const RUNNING: &str = "running";

/// A deployed (or deploying) service as reported by the API.
///
/// Only the fields the client acts on are typed; everything else is kept in
/// [`Service::extra`] so JSON output stays lossless.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Internal server identifier.
    #[serde(
        default,
        deserialize_with = "wire::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    /// Virtual machine identifier used by most endpoints.
    #[serde(
        rename = "vmID",
        default,
        deserialize_with = "wire::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub vm_id: Option<String>,
    /// Identifier assigned by the hosting provider.
    #[serde(
        rename = "providerServerID",
        default,
        deserialize_with = "wire::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub provider_server_id: Option<String>,
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Software template the service runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    /// Provisioning progress, for example `Deploying` or `Deployed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_status: Option<String>,
    /// Runtime state, for example `running` or `stopped`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Public IPv4 address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    /// Current size title, for example `MEDIUM-2C-4G`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_type: Option<String>,
    /// Hosting provider (detail endpoint spelling).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Hosting provider (listing endpoint spelling).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    /// Datacenter the machine lives in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
    /// Every other field the API returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Service {
    /// Returns `true` when `resource_id` equals the VM id or the provider's
    /// server id.
    #[must_use]
    pub fn matches_id(&self, resource_id: &str) -> bool {
        self.vm_id.as_deref() == Some(resource_id)
            || self.provider_server_id.as_deref() == Some(resource_id)
    }

    /// Returns `true` once provisioning finished and the machine runs.
    #[must_use]
    pub fn is_deployed(&self) -> bool {
        self.deployment_status.as_deref() == Some(DEPLOYED)
            && self.status.as_deref() == Some(RUNNING)
    }

    /// Returns the hosting provider under either spelling.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.provider
            .as_deref()
            .or(self.provider_name.as_deref())
            .filter(|name| !name.is_empty())
    }

    /// Returns the best available label for display.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.template_name.as_deref())
            .or(self.vm_id.as_deref())
            .unwrap_or("unnamed")
    }
}

/// A project the account can deploy into.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Project {
    /// Project identifier.
    #[serde(rename = "projectID", default, deserialize_with = "wire::string")]
    pub id: String,
    /// Project name.
    #[serde(rename = "project_name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
