//! Integration tests for configuration loading and validation.

use std::time::Duration;

use azvm::{AzureConfig, ConfigError};
use rstest::*;

#[fixture]
fn valid_config() -> AzureConfig {
    AzureConfig {
        tenant_id: String::from("00000000-0000-0000-0000-000000000001"),
        client_id: String::from("00000000-0000-0000-0000-000000000002"),
        client_secret: String::from("client-secret-example"),
        subscription_id: String::from("00000000-0000-0000-0000-000000000003"),
        default_location: String::from("eastus"),
        default_vm_size: String::from("Standard_B2s"),
        default_admin_username: String::from("azureuser"),
        poll_interval_secs: 5,
        max_wait_secs: 1800,
        authority_host: String::from("https://login.microsoftonline.com"),
        management_endpoint: String::from("https://management.azure.com"),
    }
}

/// Every credential error names the variable and key that supply it.
#[rstest]
#[case::tenant("AZURE_TENANT_ID", "tenant_id")]
#[case::client("AZURE_CLIENT_ID", "client_id")]
#[case::secret("AZURE_CLIENT_SECRET", "client_secret")]
#[case::subscription("AZURE_SUBSCRIPTION_ID", "subscription_id")]
fn missing_credentials_produce_actionable_errors(
    valid_config: AzureConfig,
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_config;
    match toml_key {
        "tenant_id" => cfg.tenant_id.clear(),
        "client_id" => cfg.client_id.clear(),
        "client_secret" => cfg.client_secret = String::from("   "),
        _ => cfg.subscription_id.clear(),
    }

    let error = cfg.validate().expect_err("validation should fail");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error:?}");
    };
    assert!(message.contains(env_var), "{message}");
    assert!(message.contains(toml_key), "{message}");
    assert!(message.contains("azvm.toml"), "{message}");
}

#[rstest]
fn default_names_must_be_path_safe(valid_config: AzureConfig) {
    let cfg = AzureConfig {
        default_location: String::from("east us"),
        ..valid_config
    };
    let error = cfg.validate().expect_err("location with a space is invalid");
    assert!(
        matches!(error, ConfigError::Invalid(ref message) if message.contains("default_location")),
        "unexpected error: {error:?}"
    );
}

#[rstest]
fn defaults_flow_into_operations(valid_config: AzureConfig) {
    let cfg = AzureConfig {
        default_location: String::from(" westeurope "),
        ..valid_config
    };
    let defaults = cfg.operation_defaults();
    assert_eq!(defaults.location, "westeurope");
    assert_eq!(defaults.vm_size, "Standard_B2s");
}

#[tokio::test]
async fn environment_overrides_defaults() {
    let _guard = azvm::test_support::EnvGuard::set_vars(&[
        ("HOME", "/nonexistent/azvm-home"),
        ("XDG_CONFIG_HOME", "/nonexistent/azvm-config"),
        ("AZURE_TENANT_ID", "tenant-from-env"),
        ("AZURE_CLIENT_ID", "client-from-env"),
        ("AZURE_CLIENT_SECRET", "secret-from-env"),
        ("AZURE_SUBSCRIPTION_ID", "subscription-from-env"),
        ("AZURE_DEFAULT_LOCATION", "northeurope"),
        ("AZURE_POLL_INTERVAL_SECS", "10"),
    ])
    .await;

    let cfg = AzureConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("configuration should load: {err}"));
    cfg.validate()
        .unwrap_or_else(|err| panic!("configuration should validate: {err}"));

    assert_eq!(cfg.tenant_id, "tenant-from-env");
    assert_eq!(cfg.default_location, "northeurope");
    assert_eq!(cfg.default_vm_size, "Standard_B2s");
    assert_eq!(cfg.poll_policy().interval, Duration::from_secs(10));
    assert_eq!(cfg.poll_policy().max_wait, Duration::from_secs(1800));
}
