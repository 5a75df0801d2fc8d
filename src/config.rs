//! Configuration loading via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::dispatch::OperationDefaults;
use crate::poll::PollPolicy;
use crate::request::{
    DEFAULT_ADMIN_USERNAME, DEFAULT_LOCATION, DEFAULT_VM_SIZE, validate_name,
};

/// Default Microsoft Entra authority.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
/// Default Resource Manager endpoint.
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Azure credentials and orchestration defaults derived from environment
/// variables, configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "AZURE",
    discovery(
        app_name = "azvm",
        env_var = "AZVM_CONFIG_PATH",
        config_file_name = "azvm.toml",
        dotfile_name = ".azvm.toml",
        project_file_name = "azvm.toml"
    )
)]
pub struct AzureConfig {
    /// Directory (tenant) of the service principal.
    #[ortho_config(default = String::new())]
    pub tenant_id: String,
    /// Application (client) identifier of the service principal.
    #[ortho_config(default = String::new())]
    pub client_id: String,
    /// Client secret of the service principal.
    #[ortho_config(default = String::new())]
    pub client_secret: String,
    /// Subscription every resource is created in.
    #[ortho_config(default = String::new())]
    pub subscription_id: String,
    /// Region used when a deployment omits `location`.
    #[ortho_config(default = DEFAULT_LOCATION.to_owned())]
    pub default_location: String,
    /// VM size used when a deployment omits `vm_size`.
    #[ortho_config(default = DEFAULT_VM_SIZE.to_owned())]
    pub default_vm_size: String,
    /// Administrator account used when a deployment omits `admin_username`.
    #[ortho_config(default = DEFAULT_ADMIN_USERNAME.to_owned())]
    pub default_admin_username: String,
    /// Seconds between two observations of a long-running operation.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Upper bound, in seconds, on waiting for one operation.
    #[ortho_config(default = 1800)]
    pub max_wait_secs: u64,
    /// Token authority host.
    #[ortho_config(default = DEFAULT_AUTHORITY_HOST.to_owned())]
    pub authority_host: String,
    /// Resource Manager endpoint.
    #[ortho_config(default = DEFAULT_MANAGEMENT_ENDPOINT.to_owned())]
    pub management_endpoint: String,
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
            "missing {}: set {} or add {} to [azure] in azvm.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

const REQUIRED_FIELDS: [FieldMetadata; 4] = [
    FieldMetadata::new("Azure tenant ID", "AZURE_TENANT_ID", "tenant_id"),
    FieldMetadata::new("Azure client ID", "AZURE_CLIENT_ID", "client_id"),
    FieldMetadata::new("Azure client secret", "AZURE_CLIENT_SECRET", "client_secret"),
    FieldMetadata::new(
        "Azure subscription ID",
        "AZURE_SUBSCRIPTION_ID",
        "subscription_id",
    ),
];

impl AzureConfig {
    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("azvm")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and configuration key that supply the missing value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a credential is empty and
    /// [`ConfigError::Invalid`] when a default or bound is unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            &self.tenant_id,
            &self.client_id,
            &self.client_secret,
            &self.subscription_id,
        ];
        for (value, metadata) in required.iter().zip(REQUIRED_FIELDS.iter()) {
            if value.trim().is_empty() {
                return Err(metadata.missing());
            }
        }

        for (field, value) in [
            ("default_location", &self.default_location),
            ("default_vm_size", &self.default_vm_size),
            ("default_admin_username", &self.default_admin_username),
        ] {
            validate_name(field, value).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        }

        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(String::from(
                "poll_interval_secs must be greater than zero",
            )));
        }
        if self.max_wait_secs < self.poll_interval_secs {
            return Err(ConfigError::Invalid(format!(
                "max_wait_secs ({}) must be at least poll_interval_secs ({})",
                self.max_wait_secs, self.poll_interval_secs
            )));
        }
        Ok(())
    }

    /// Wait policy applied to every long-running operation.
    #[must_use]
    pub const fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.max_wait_secs),
        )
    }

    /// Defaults applied when an operation omits optional parameters.
    #[must_use]
    pub fn operation_defaults(&self) -> OperationDefaults {
        OperationDefaults {
            location: self.default_location.trim().to_owned(),
            vm_size: self.default_vm_size.trim().to_owned(),
            admin_username: self.default_admin_username.trim().to_owned(),
            ..OperationDefaults::default()
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configured value cannot be used.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
