//! User-facing status strings.

use std::fmt::Display;

use serde_json::json;

use crate::command::CommandExecutionResult;
use crate::network::NetworkTopology;
use crate::request::{OsType, ProvisioningRequest};
use crate::vm::Deployment;

/// Prefix of successful results.
pub const SUCCESS: &str = "✅";
/// Prefix of failed results.
pub const FAILURE: &str = "❌";
/// Prefix of results whose outcome is unknown.
pub const UNCERTAIN: &str = "⚠️";

/// Returns `true` when `result` reports success, either as a `✅` status
/// line or as a JSON report with `"success": true`.
#[must_use]
pub fn is_success(result: &str) -> bool {
    if result.starts_with(SUCCESS) {
        return true;
    }
    serde_json::from_str::<serde_json::Value>(result)
        .ok()
        .and_then(|report| report.get("success").and_then(serde_json::Value::as_bool))
        .unwrap_or(false)
}

pub(super) fn input_error(err: &impl Display) -> String {
    format!("{FAILURE} Error: {err}")
}

pub(super) fn failure(what: &str, err: &impl Display, timed_out: bool) -> String {
    if timed_out {
        format!("{UNCERTAIN} {what} did not finish in time and may still complete: {err}")
    } else {
        format!("{FAILURE} Failed to {what}: {err}")
    }
}

pub(super) fn deployed(
    request: &ProvisioningRequest,
    topology: &NetworkTopology,
    deployment: &Deployment,
) -> String {
    let address = deployment.public_address;
    let mut message = format!(
        "{SUCCESS} Virtual Machine deployed successfully!\n\n\
         VM Details:\n\
         - Name: {vm}\n\
         - Resource Group: {rg}\n\
         - Location: {location}\n\
         - Size: {size}\n\
         - OS: {os}\n\
         - Public IP: {address}\n\
         - Admin Username: {user}\n\n\
         Resources:\n\
         - Virtual Machine: {vm}\n\
         - Network Interface: {nic}\n\
         - Public IP: {ip}\n\
         - Virtual Network: {vnet}\n\
         - Subnet: {subnet}\n\n\
         Connection Info:",
        vm = request.vm_name,
        rg = request.resource_group,
        location = request.location,
        size = request.vm_size,
        os = request.os_type,
        user = request.admin_username,
        nic = topology.nic_name,
        ip = topology.public_ip_name,
        vnet = topology.vnet_name,
        subnet = topology.subnet_name,
    );
    let hint = match request.os_type {
        OsType::Linux => format!("ssh {}@{address}", request.admin_username),
        OsType::Windows => format!("RDP to {address}"),
    };
    message.push_str("\n  ");
    message.push_str(&hint);
    message
}

pub(super) fn service_restarted(
    service: &str,
    vm_name: &str,
    status: &CommandExecutionResult,
) -> String {
    format!(
        "{SUCCESS} Service Restart Completed for '{service}' on VM '{vm_name}':\n\n{}",
        status.stdout.trim()
    )
}

pub(super) fn vm_restarted(vm_name: &str, resource_group: &str) -> String {
    format!("{SUCCESS} Successfully restarted VM '{vm_name}' in resource group '{resource_group}'")
}

pub(super) fn json_error(err: &impl Display) -> String {
    json!({ "success": false, "error": err.to_string() }).to_string()
}
