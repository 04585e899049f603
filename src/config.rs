//! Configuration loading via `ortho-config`.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::store::{FileStore, StoreError};

/// Public API endpoint used when no override is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.elest.io";

/// Client settings derived from environment variables and configuration
/// files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "ELESTIO",
    discovery(
        app_name = "elestio",
        env_var = "ELESTIO_CONFIG_PATH",
        config_file_name = "elestio.toml",
        dotfile_name = ".elestio.toml",
        project_file_name = "elestio.toml"
    )
)]
pub struct ElestioConfig {
    /// Base URL of the management API.
    #[ortho_config(default = DEFAULT_BASE_URL.to_owned())]
    pub base_url: String,
    /// Project used when a command does not name one explicitly.
    pub default_project: Option<String>,
    /// Hosting provider for new deployments.
    #[ortho_config(default = "netcup".to_owned())]
    pub default_provider: String,
    /// Datacenter (region) for new deployments.
    #[ortho_config(default = "nbg".to_owned())]
    pub default_datacenter: String,
    /// Server size for new deployments.
    #[ortho_config(default = "MEDIUM-2C-4G".to_owned())]
    pub default_server_type: String,
    /// Support plan for new deployments.
    #[ortho_config(default = "level1".to_owned())]
    pub default_support: String,
    /// Upper bound on how long to wait for a deployment, in seconds.
    #[ortho_config(default = 600)]
    pub deploy_timeout_secs: u64,
    /// Delay between status queries once the service is visible, in seconds.
    #[ortho_config(default = 15)]
    pub poll_interval_secs: u64,
    /// Delay between queries while the service is not yet listed, in seconds.
    #[ortho_config(default = 10)]
    pub not_found_interval_secs: u64,
    /// Per-request HTTP timeout, in seconds.
    #[ortho_config(default = 30)]
    pub http_timeout_secs: u64,
    /// Directory holding `credentials.toml` and `session.toml`. Defaults to
    /// `~/.elestio`.
    pub state_dir: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to elestio.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

impl ElestioConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(metadata.missing());
        }
        Ok(())
    }

    fn require_nonzero(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "{} must be greater than zero: set {} or {} in elestio.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("elestio")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required string is empty
    /// and [`ConfigError::InvalidValue`] when a duration is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.base_url,
            &FieldMetadata::new("API base URL", "ELESTIO_BASE_URL", "base_url"),
        )?;
        Self::require_field(
            &self.default_provider,
            &FieldMetadata::new("provider", "ELESTIO_DEFAULT_PROVIDER", "default_provider"),
        )?;
        Self::require_field(
            &self.default_datacenter,
            &FieldMetadata::new(
                "datacenter",
                "ELESTIO_DEFAULT_DATACENTER",
                "default_datacenter",
            ),
        )?;
        Self::require_field(
            &self.default_server_type,
            &FieldMetadata::new(
                "server type",
                "ELESTIO_DEFAULT_SERVER_TYPE",
                "default_server_type",
            ),
        )?;
        Self::require_field(
            &self.default_support,
            &FieldMetadata::new("support plan", "ELESTIO_DEFAULT_SUPPORT", "default_support"),
        )?;
        Self::require_nonzero(
            self.deploy_timeout_secs,
            &FieldMetadata::new(
                "deployment timeout",
                "ELESTIO_DEPLOY_TIMEOUT_SECS",
                "deploy_timeout_secs",
            ),
        )?;
        Self::require_nonzero(
            self.poll_interval_secs,
            &FieldMetadata::new(
                "poll interval",
                "ELESTIO_POLL_INTERVAL_SECS",
                "poll_interval_secs",
            ),
        )?;
        Self::require_nonzero(
            self.not_found_interval_secs,
            &FieldMetadata::new(
                "not-found retry interval",
                "ELESTIO_NOT_FOUND_INTERVAL_SECS",
                "not_found_interval_secs",
            ),
        )?;
        Self::require_nonzero(
            self.http_timeout_secs,
            &FieldMetadata::new(
                "HTTP timeout",
                "ELESTIO_HTTP_TIMEOUT_SECS",
                "http_timeout_secs",
            ),
        )?;
        Ok(())
    }

    /// Returns the configured deployment timeout.
    #[must_use]
    pub const fn deploy_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy_timeout_secs)
    }

    /// Returns the configured poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Returns the configured not-found retry interval.
    #[must_use]
    pub const fn not_found_interval(&self) -> Duration {
        Duration::from_secs(self.not_found_interval_secs)
    }

    /// Returns the configured HTTP timeout.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Opens the credential/session store for the configured state directory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoStateDir`] when no directory is configured and
    /// `HOME` is unavailable.
    pub fn file_store(&self) -> Result<FileStore, StoreError> {
        match self.state_dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => Ok(FileStore::new(Utf8PathBuf::from(dir))),
            _ => FileStore::in_home(),
        }
    }
}

impl Default for ElestioConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            default_project: None,
            default_provider: String::from("netcup"),
            default_datacenter: String::from("nbg"),
            default_server_type: String::from("MEDIUM-2C-4G"),
            default_support: String::from("level1"),
            deploy_timeout_secs: 600,
            poll_interval_secs: 15,
            not_found_interval_secs: 10,
            http_timeout_secs: 30,
            state_dir: None,
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
