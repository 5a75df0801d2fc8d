//! Command-line interface definitions for the `azvm` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser};

/// Top-level CLI for the `azvm` binary.
#[derive(Debug, Parser)]
#[command(
    name = "azvm",
    about = "Provision Azure VMs and run in-guest maintenance commands",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Deploy a VM together with its network stack.
    #[command(name = "deploy-vm", about = "Deploy a VM together with its network stack")]
    DeployVm(DeployVmCommand),
    /// Restart a whole VM.
    #[command(name = "restart-vm", about = "Restart an existing VM")]
    RestartVm(TargetArgs),
    /// Restart a service inside a VM and verify it is running.
    #[command(
        name = "restart-service",
        about = "Restart a service inside a VM and verify it is running"
    )]
    RestartService(RestartServiceCommand),
    /// Report the busiest processes inside a VM as JSON.
    #[command(
        name = "get-process-utilization",
        about = "Report the busiest processes inside a VM as JSON"
    )]
    GetProcessUtilization(ProcessUtilizationCommand),
}

/// Resource group and VM every operation targets.
#[derive(Debug, Args)]
pub(crate) struct TargetArgs {
    /// Resource group containing the VM.
    #[arg(long, value_name = "GROUP")]
    pub(crate) resource_group: String,
    /// Name of the VM.
    #[arg(long, value_name = "NAME")]
    pub(crate) vm_name: String,
}

/// Arguments for `azvm deploy-vm`.
#[derive(Debug, Args)]
pub(crate) struct DeployVmCommand {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Administrator password: at least 12 characters with upper and lower
    /// case letters, a digit, and a symbol.
    #[arg(long, env = "AZVM_ADMIN_PASSWORD", hide_env_values = true)]
    pub(crate) admin_password: String,
    /// Azure region; defaults to the configured location.
    #[arg(long)]
    pub(crate) location: Option<String>,
    /// VM size; defaults to the configured size.
    #[arg(long)]
    pub(crate) vm_size: Option<String>,
    /// Administrator account; defaults to the configured user.
    #[arg(long)]
    pub(crate) admin_username: Option<String>,
    /// Guest OS: `linux` (default) or `windows`.
    #[arg(long, value_name = "OS")]
    pub(crate) os_type: Option<String>,
}

/// Arguments for `azvm restart-service`.
#[derive(Debug, Args)]
pub(crate) struct RestartServiceCommand {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Service to restart (systemd unit or Windows service name).
    #[arg(long, value_name = "SERVICE")]
    pub(crate) service_name: String,
    /// Guest OS: `windows` (default) or `linux`.
    #[arg(long, value_name = "OS")]
    pub(crate) os_type: Option<String>,
}

/// Arguments for `azvm get-process-utilization`.
#[derive(Debug, Args)]
pub(crate) struct ProcessUtilizationCommand {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Guest OS: `windows` (default) or `linux`.
    #[arg(long, value_name = "OS")]
    pub(crate) os_type: Option<String>,
    /// Sampling window in seconds (1-60, default 5).
    #[arg(long, value_name = "SECONDS")]
    pub(crate) sample_seconds: Option<u32>,
    /// Number of processes to report (1-100, default 15).
    #[arg(long, value_name = "COUNT")]
    pub(crate) top_n: Option<u32>,
}
