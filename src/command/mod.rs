//! In-guest commands and whole-VM restarts.
//!
//! Service restarts are a two-step workflow: the restart command runs first,
//! then a read-only status query checks that the service is running. A
//! restart that reports success is still a failure when the status query
//! does not show the running marker.

mod output;
mod plan;

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::cloud::{CloudClient, Operation, OperationState, ResourceId};
use crate::context::ProvisioningContext;
use crate::poll::{WaitError, wait_for_terminal};
use crate::request::{OsType, ValidationError};

pub use output::{CommandExecutionResult, ExitStatus};
pub use plan::{
    DEFAULT_SAMPLE_SECONDS, DEFAULT_TOP_N, ProcessSamplePlan, RUN_POWERSHELL_SCRIPT,
    RUN_SHELL_SCRIPT, RunCommandScript, ServiceRestartPlan, validate_service_name,
};

/// Action name of the run-command endpoint.
pub const RUN_COMMAND_ACTION: &str = "runCommand";
/// Action name of the VM restart endpoint.
pub const RESTART_ACTION: &str = "restart";

/// Errors raised while running commands against a VM.
#[derive(Debug, Error)]
pub enum CommandError<ClientError>
where
    ClientError: std::error::Error + 'static,
{
    /// Raised when a parameter fails validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Raised when the VM lookup fails.
    #[error("failed to look up virtual machine '{vm_name}': {source}")]
    Lookup {
        /// VM name.
        vm_name: String,
        /// Client error.
        #[source]
        source: ClientError,
    },
    /// Raised when the VM does not exist.
    #[error("virtual machine '{vm_name}' not found in resource group '{resource_group}'")]
    VmNotFound {
        /// Resource group searched.
        resource_group: String,
        /// VM name.
        vm_name: String,
    },
    /// Raised when the provider rejects the call.
    #[error("failed to submit {action} on '{vm_name}': {source}")]
    Submit {
        /// VM name.
        vm_name: String,
        /// Action submitted.
        action: &'static str,
        /// Client error.
        #[source]
        source: ClientError,
    },
    /// Raised when the operation reaches the failed state.
    #[error("{action} on '{vm_name}' failed: {reason}")]
    OperationFailed {
        /// VM name.
        vm_name: String,
        /// Action submitted.
        action: &'static str,
        /// Provider fault reason.
        reason: String,
    },
    /// Raised when the operation cannot be observed to completion.
    #[error("{action} on '{vm_name}' did not complete: {source}")]
    Wait {
        /// VM name.
        vm_name: String,
        /// Action submitted.
        action: &'static str,
        /// Wait error.
        #[source]
        source: WaitError<ClientError>,
    },
    /// Raised when run-command output cannot be interpreted.
    #[error("unreadable run-command output from '{vm_name}': {reason}")]
    MalformedOutput {
        /// VM name.
        vm_name: String,
        /// Decode failure.
        reason: String,
    },
    /// Raised when the in-guest command fails or reports error output.
    #[error("command `{command}` failed on '{vm_name}': {output}")]
    CommandFailed {
        /// VM name.
        vm_name: String,
        /// Command text.
        command: String,
        /// Captured output.
        output: String,
    },
    /// Raised when the status query does not show the service running.
    #[error(
        "service '{service}' on '{vm_name}' was restarted but is not running \
         (expected '{marker}' in status output): {output}"
    )]
    Verification {
        /// Service name.
        service: String,
        /// VM name.
        vm_name: String,
        /// Marker that was missing.
        marker: &'static str,
        /// Status query output.
        output: String,
    },
}

impl<ClientError> CommandError<ClientError>
where
    ClientError: std::error::Error + 'static,
{
    /// Returns `true` when the operation was still running once the wait
    /// bound elapsed.
    #[must_use]
    pub const fn timed_out(&self) -> bool {
        matches!(self, Self::Wait { source, .. } if source.is_timeout())
    }
}

/// Runs scripts inside VMs and restarts whole VMs.
#[derive(Debug)]
pub struct RemoteCommandRunner<C> {
    context: ProvisioningContext<C>,
}

impl<C: CloudClient> RemoteCommandRunner<C> {
    /// Creates a runner bound to the shared context.
    #[must_use]
    pub const fn new(context: ProvisioningContext<C>) -> Self {
        Self { context }
    }

    /// Restarts `service_name` and verifies it is running afterwards.
    ///
    /// Returns the result of the status query.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::CommandFailed`] when the restart command
    /// fails or writes to stderr (the status query is then skipped) and
    /// [`CommandError::Verification`] when the status query does not show
    /// the running marker.
    pub async fn run_and_verify(
        &self,
        resource_group: &str,
        vm_name: &str,
        os_type: OsType,
        service_name: &str,
    ) -> Result<CommandExecutionResult, CommandError<C::Error>> {
        let plan = ServiceRestartPlan::new(os_type, service_name)?;
        let vm = ResourceId::virtual_machine(resource_group, vm_name);

        info!(vm = %vm_name, service = %plan.service_name, %os_type, "restarting service");
        let restart = self.run_script(&vm, &plan.restart_script()).await?;
        // Windows run-command reports succeeded streams even when the cmdlet threw.
        if !restart.is_success() || !restart.stderr.trim().is_empty() {
            warn!(vm = %vm_name, service = %plan.service_name, "restart command failed");
            return Err(CommandError::CommandFailed {
                vm_name: vm_name.to_owned(),
                command: plan.command_text.clone(),
                output: combined_output(&restart),
            });
        }

        let status = self.run_script(&vm, &plan.status_script()).await?;
        if !plan.is_running(&status.stdout) {
            warn!(vm = %vm_name, service = %plan.service_name, "service is not running after restart");
            return Err(CommandError::Verification {
                service: plan.service_name,
                vm_name: vm_name.to_owned(),
                marker: plan.running_marker,
                output: combined_output(&status),
            });
        }

        info!(vm = %vm_name, service = %plan.service_name, "service restarted and running");
        Ok(status)
    }

    /// Restarts the VM after checking that it exists.
    ///
    /// No in-guest health probe follows the restart.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::VmNotFound`] for unknown VMs and
    /// [`CommandError::OperationFailed`] when the restart fails.
    pub async fn restart_vm(
        &self,
        resource_group: &str,
        vm_name: &str,
    ) -> Result<OperationState, CommandError<C::Error>> {
        let client = self.context.client();
        let vm = ResourceId::virtual_machine(resource_group, vm_name);

        let existing = client
            .get(&vm)
            .await
            .map_err(|source| CommandError::Lookup {
                vm_name: vm_name.to_owned(),
                source,
            })?;
        if existing.is_none() {
            return Err(CommandError::VmNotFound {
                resource_group: resource_group.to_owned(),
                vm_name: vm_name.to_owned(),
            });
        }

        info!(vm = %vm_name, "restarting virtual machine");
        let operation = self.submit_operation(&vm, RESTART_ACTION, None).await?;
        info!(vm = %vm_name, "virtual machine restarted");
        Ok(operation.state)
    }

    /// Samples the busiest processes in the guest and returns the report as
    /// pretty-printed JSON.
    ///
    /// Output that is empty or not JSON is wrapped in a JSON object with
    /// `success: false`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when the parameters are out of range or the
    /// run-command call fails.
    pub async fn sample_processes(
        &self,
        resource_group: &str,
        vm_name: &str,
        os_type: OsType,
        sample_seconds: u32,
        top_n: u32,
    ) -> Result<String, CommandError<C::Error>> {
        let plan = ProcessSamplePlan::new(os_type, vm_name, sample_seconds, top_n)?;
        let vm = ResourceId::virtual_machine(resource_group, vm_name);

        info!(vm = %vm_name, %os_type, sample_seconds, top_n, "sampling process utilisation");
        let result = self.run_script(&vm, &plan.run_script()).await?;
        let report = process_report(&result);
        serde_json::to_string_pretty(&report).map_err(|err| CommandError::MalformedOutput {
            vm_name: vm_name.to_owned(),
            reason: err.to_string(),
        })
    }

    async fn run_script(
        &self,
        vm: &ResourceId,
        script: &RunCommandScript,
    ) -> Result<CommandExecutionResult, CommandError<C::Error>> {
        let operation = self
            .submit_operation(vm, RUN_COMMAND_ACTION, Some(script.body()))
            .await?;
        let output = operation
            .output
            .ok_or_else(|| CommandError::MalformedOutput {
                vm_name: vm.name.clone(),
                reason: String::from("no output was returned"),
            })?;
        CommandExecutionResult::from_output(output).map_err(|reason| {
            CommandError::MalformedOutput {
                vm_name: vm.name.clone(),
                reason,
            }
        })
    }

    async fn submit_operation(
        &self,
        vm: &ResourceId,
        action: &'static str,
        body: Option<Value>,
    ) -> Result<Operation, CommandError<C::Error>> {
        let client = self.context.client();
        let operation = client
            .action(vm, action, body)
            .await
            .map_err(|source| CommandError::Submit {
                vm_name: vm.name.clone(),
                action,
                source,
            })?;

        wait_for_terminal(client, operation, self.context.poll_policy())
            .await
            .map_err(|err| {
                warn!(vm = %vm.name, action, error = %err, "operation did not succeed");
                match err {
                    WaitError::Failed { reason, .. } => CommandError::OperationFailed {
                        vm_name: vm.name.clone(),
                        action,
                        reason,
                    },
                    other => CommandError::Wait {
                        vm_name: vm.name.clone(),
                        action,
                        source: other,
                    },
                }
            })
    }
}

fn combined_output(result: &CommandExecutionResult) -> String {
    match (result.stdout.trim(), result.stderr.trim()) {
        (stdout, "") => stdout.to_owned(),
        ("", stderr) => stderr.to_owned(),
        (stdout, stderr) => format!("{stdout}\n{stderr}"),
    }
}

fn process_report(result: &CommandExecutionResult) -> Value {
    let stdout = result.stdout.trim();
    if stdout.is_empty() {
        return json!({
            "success": false,
            "error": "No output received from VM",
            "error_output": result.stderr,
        });
    }
    serde_json::from_str::<Value>(stdout).unwrap_or_else(|_| {
        json!({
            "success": false,
            "error": "Failed to parse output as JSON",
            "raw_output": stdout,
            "error_output": result.stderr,
        })
    })
}

#[cfg(test)]
mod tests;
