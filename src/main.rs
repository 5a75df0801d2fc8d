//! Binary entry point for the `azvm` CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use azvm::dispatch::{
    DEPLOY_VM, GET_PROCESS_UTILIZATION, OperationDispatcher, Parameters, RESTART_SERVICE,
    RESTART_VM, is_success,
};
use azvm::{AzureClient, AzureClientError, AzureConfig, ConfigError, ProvisioningContext};

mod cli;

use cli::{Cli, TargetArgs};

const LOG_ENV_VAR: &str = "AZVM_LOG";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("client error: {0}")]
    Client(#[from] AzureClientError),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let (operation, params) = into_operation(cli);

    let exit_code = match execute(operation, &params).await {
        Ok(result) => {
            writeln!(io::stdout(), "{result}").ok();
            if is_success(&result) { 0 } else { 1 }
        }
        Err(err) => {
            writeln!(io::stderr(), "{err}").ok();
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn execute(operation: &str, params: &Parameters) -> Result<String, CliError> {
    let config = AzureConfig::load_without_cli_args()?;
    config.validate()?;
    let client = AzureClient::new(&config)?;
    let context = ProvisioningContext::new(client, config.poll_policy());
    let dispatcher = OperationDispatcher::new(&context, config.operation_defaults());
    Ok(dispatcher.dispatch(operation, params).await)
}

fn into_operation(cli: Cli) -> (&'static str, Parameters) {
    let mut params = Parameters::new();
    let operation = match cli {
        Cli::DeployVm(args) => {
            insert_target(&mut params, args.target);
            params.insert(String::from("admin_password"), args.admin_password);
            insert_optional(&mut params, "location", args.location);
            insert_optional(&mut params, "vm_size", args.vm_size);
            insert_optional(&mut params, "admin_username", args.admin_username);
            insert_optional(&mut params, "os_type", args.os_type);
            DEPLOY_VM
        }
        Cli::RestartVm(target) => {
            insert_target(&mut params, target);
            RESTART_VM
        }
        Cli::RestartService(args) => {
            insert_target(&mut params, args.target);
            params.insert(String::from("service_name"), args.service_name);
            insert_optional(&mut params, "os_type", args.os_type);
            RESTART_SERVICE
        }
        Cli::GetProcessUtilization(args) => {
            insert_target(&mut params, args.target);
            insert_optional(&mut params, "os_type", args.os_type);
            insert_optional(
                &mut params,
                "sample_seconds",
                args.sample_seconds.map(|value| value.to_string()),
            );
            insert_optional(&mut params, "top_n", args.top_n.map(|value| value.to_string()));
            GET_PROCESS_UTILIZATION
        }
    };
    (operation, params)
}

fn insert_target(params: &mut Parameters, target: TargetArgs) {
    params.insert(String::from("resource_group"), target.resource_group);
    params.insert(String::from("vm_name"), target.vm_name);
}

fn insert_optional(params: &mut Parameters, key: &str, value: Option<String>) {
    if let Some(given) = value {
        params.insert(key.to_owned(), given);
    }
}
