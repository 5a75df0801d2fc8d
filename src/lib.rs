//! Core library for the `azvm` Azure VM orchestrator.
//!
//! The crate provisions virtual machines together with their network
//! dependencies (resource group → virtual network → subnet → public IP →
//! network interface → VM), restarts VMs, and runs verified service restarts
//! inside guests. Every long-running cloud operation is waited out to a
//! terminal state under a bounded poll policy. A dispatcher exposes the
//! workflows as named operations returning single status strings.

pub mod azure;
pub mod cloud;
pub mod command;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod network;
pub mod poll;
pub mod request;
pub mod test_support;
pub mod vm;

pub use azure::{AzureClient, AzureClientError};
pub use cloud::{CloudClient, Operation, OperationState, Resource, ResourceId, ResourceKind};
pub use command::{CommandError, CommandExecutionResult, ExitStatus, RemoteCommandRunner};
pub use config::{AzureConfig, ConfigError};
pub use context::ProvisioningContext;
pub use dispatch::{OperationDefaults, OperationDispatcher, Parameters};
pub use network::{NetworkError, NetworkInterfaceHandle, NetworkProvisioner, NetworkTopology};
pub use poll::{PollPolicy, WaitError, wait_for_terminal};
pub use request::{OsType, ProvisioningRequest, ProvisioningRequestBuilder, ValidationError};
pub use vm::{DeployError, Deployment, VmProvisioner};
