//! Operation dispatcher.
//!
//! Maps an operation name and a flat parameter map onto the orchestrator
//! components and renders every outcome, including errors, as a single
//! status string.

mod format;
mod params;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use tracing::{info, warn};

use crate::cloud::CloudClient;
use crate::command::{DEFAULT_SAMPLE_SECONDS, DEFAULT_TOP_N, RemoteCommandRunner};
use crate::context::ProvisioningContext;
use crate::network::{NetworkProvisioner, NetworkTopology};
use crate::request::{
    DEFAULT_ADMIN_USERNAME, DEFAULT_LOCATION, DEFAULT_VM_SIZE, OsType, ValidationError,
};
use crate::vm::VmProvisioner;

pub use format::{FAILURE, SUCCESS, UNCERTAIN, is_success};
pub use params::{Parameters, number, optional, os_type, provisioning_request, required};

/// Name of the VM deployment operation.
pub const DEPLOY_VM: &str = "deploy_vm";
/// Name of the VM restart operation.
pub const RESTART_VM: &str = "restart_vm";
/// Name of the service restart operation.
pub const RESTART_SERVICE: &str = "restart_service";
/// Name of the process sampling operation.
pub const GET_PROCESS_UTILIZATION: &str = "get_process_utilization";

/// Future returned by an operation handler.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = String> + Send + 'a>>;

/// Operation handler: receives the components and the parameters and
/// resolves to a status string.
pub type Handler<C> = for<'a> fn(&'a Operations<C>, &'a Parameters) -> HandlerFuture<'a>;

/// Values applied when optional parameters are omitted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationDefaults {
    /// Region for new VMs.
    pub location: String,
    /// Size for new VMs.
    pub vm_size: String,
    /// Administrator account for new VMs.
    pub admin_username: String,
    /// Guest OS assumed by in-guest operations.
    pub command_os_type: OsType,
    /// Sampling window for process utilisation.
    pub sample_seconds: u32,
    /// Number of processes reported.
    pub top_n: u32,
}

impl Default for OperationDefaults {
    fn default() -> Self {
        Self {
            location: DEFAULT_LOCATION.to_owned(),
            vm_size: DEFAULT_VM_SIZE.to_owned(),
            admin_username: DEFAULT_ADMIN_USERNAME.to_owned(),
            command_os_type: OsType::Windows,
            sample_seconds: DEFAULT_SAMPLE_SECONDS,
            top_n: DEFAULT_TOP_N,
        }
    }
}

/// Orchestrator components shared by every handler.
#[derive(Debug)]
pub struct Operations<C> {
    network: NetworkProvisioner<C>,
    vm: VmProvisioner<C>,
    commands: RemoteCommandRunner<C>,
    defaults: OperationDefaults,
}

impl<C: CloudClient> Operations<C> {
    /// Builds every component from one shared context.
    #[must_use]
    pub fn new(context: &ProvisioningContext<C>, defaults: OperationDefaults) -> Self {
        Self {
            network: NetworkProvisioner::new(context.clone()),
            vm: VmProvisioner::new(context.clone()),
            commands: RemoteCommandRunner::new(context.clone()),
            defaults,
        }
    }

    /// Deploys a VM together with its network chain.
    pub async fn deploy_vm(&self, params: &Parameters) -> String {
        let request = match provisioning_request(params, &self.defaults) {
            Ok(request) => request,
            Err(err) => return format::input_error(&err),
        };
        let what = format!("deploy VM '{}'", request.vm_name);

        let nic = match self.network.ensure_network(&request).await {
            Ok(nic) => nic,
            Err(err) => return format::failure(&what, &err, err.timed_out()),
        };
        match self.vm.deploy(&request, &nic).await {
            Ok(deployment) => {
                let topology = NetworkTopology::for_vm(&request.resource_group, &request.vm_name);
                format::deployed(&request, &topology, &deployment)
            }
            Err(err) => format::failure(&what, &err, err.timed_out()),
        }
    }

    /// Restarts a whole VM.
    pub async fn restart_vm(&self, params: &Parameters) -> String {
        let (resource_group, vm_name) = match target(params) {
            Ok(target) => target,
            Err(err) => return format::input_error(&err),
        };
        match self.commands.restart_vm(resource_group, vm_name).await {
            Ok(_) => format::vm_restarted(vm_name, resource_group),
            Err(err) => format::failure(&format!("restart VM '{vm_name}'"), &err, err.timed_out()),
        }
    }

    /// Restarts an in-guest service and verifies it is running.
    pub async fn restart_service(&self, params: &Parameters) -> String {
        let parsed = target(params).and_then(|(resource_group, vm_name)| {
            let service = required(params, "service_name")?;
            let os = os_type(params, self.defaults.command_os_type)?;
            Ok((resource_group, vm_name, service, os))
        });
        let (resource_group, vm_name, service, os) = match parsed {
            Ok(values) => values,
            Err(err) => return format::input_error(&err),
        };

        match self
            .commands
            .run_and_verify(resource_group, vm_name, os, service)
            .await
        {
            Ok(status) => format::service_restarted(service, vm_name, &status),
            Err(err) => format::failure(
                &format!("restart service '{service}' on VM '{vm_name}'"),
                &err,
                err.timed_out(),
            ),
        }
    }

    /// Samples process utilisation and returns a JSON report.
    pub async fn get_process_utilization(&self, params: &Parameters) -> String {
        let parsed = target(params).and_then(|(resource_group, vm_name)| {
            let os = os_type(params, self.defaults.command_os_type)?;
            let seconds = number(params, "sample_seconds", self.defaults.sample_seconds)?;
            let top_n = number(params, "top_n", self.defaults.top_n)?;
            Ok((resource_group, vm_name, os, seconds, top_n))
        });
        let (resource_group, vm_name, os, seconds, top_n) = match parsed {
            Ok(values) => values,
            Err(err) => return format::json_error(&err),
        };

        self.commands
            .sample_processes(resource_group, vm_name, os, seconds, top_n)
            .await
            .unwrap_or_else(|err| {
                format::json_error(&format!("Failed to get process utilization: {err}"))
            })
    }
}

fn target(params: &Parameters) -> Result<(&str, &str), ValidationError> {
    Ok((
        required(params, "resource_group")?,
        required(params, "vm_name")?,
    ))
}

fn deploy_vm<'a, C: CloudClient>(
    ops: &'a Operations<C>,
    params: &'a Parameters,
) -> HandlerFuture<'a> {
    Box::pin(ops.deploy_vm(params))
}

fn restart_vm<'a, C: CloudClient>(
    ops: &'a Operations<C>,
    params: &'a Parameters,
) -> HandlerFuture<'a> {
    Box::pin(ops.restart_vm(params))
}

fn restart_service<'a, C: CloudClient>(
    ops: &'a Operations<C>,
    params: &'a Parameters,
) -> HandlerFuture<'a> {
    Box::pin(ops.restart_service(params))
}

fn get_process_utilization<'a, C: CloudClient>(
    ops: &'a Operations<C>,
    params: &'a Parameters,
) -> HandlerFuture<'a> {
    Box::pin(ops.get_process_utilization(params))
}

/// Routes named operations to their handlers.
///
/// The handler map is built once and not modified afterwards.
#[derive(Debug)]
pub struct OperationDispatcher<C> {
    operations: Operations<C>,
    handlers: BTreeMap<&'static str, Handler<C>>,
}

impl<C: CloudClient> OperationDispatcher<C> {
    /// Builds a dispatcher exposing every supported operation.
    #[must_use]
    pub fn new(context: &ProvisioningContext<C>, defaults: OperationDefaults) -> Self {
        let mut handlers: BTreeMap<&'static str, Handler<C>> = BTreeMap::new();
        handlers.insert(DEPLOY_VM, deploy_vm::<C>);
        handlers.insert(RESTART_VM, restart_vm::<C>);
        handlers.insert(RESTART_SERVICE, restart_service::<C>);
        handlers.insert(GET_PROCESS_UTILIZATION, get_process_utilization::<C>);
        Self {
            operations: Operations::new(context, defaults),
            handlers,
        }
    }

    /// Names of the registered operations, sorted.
    pub fn operation_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    /// Runs `name` with `params` and returns its status string.
    pub async fn dispatch(&self, name: &str, params: &Parameters) -> String {
        let Some(handler) = self.handlers.get(name) else {
            warn!(operation = %name, "unknown operation");
            return format::input_error(&format!("unknown operation '{name}'"));
        };
        info!(operation = %name, "dispatching operation");
        let result = handler(&self.operations, params).await;
        if is_success(&result) {
            info!(operation = %name, "operation succeeded");
        } else {
            warn!(operation = %name, "operation did not succeed");
        }
        result
    }
}
