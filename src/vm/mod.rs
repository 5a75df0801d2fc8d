//! Virtual machine deployment on top of an ensured network interface.

mod image;

use std::net::IpAddr;
use std::str::FromStr;

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::cloud::{CloudClient, ResourceId};
use crate::context::ProvisioningContext;
use crate::network::NetworkInterfaceHandle;
use crate::poll::{WaitError, wait_for_terminal};
use crate::request::{OsType, ProvisioningRequest};

pub use image::ImageReference;

/// Storage account type used for the OS disk.
pub const OS_DISK_STORAGE_ACCOUNT_TYPE: &str = "Premium_LRS";

/// Outcome of a successful deployment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Deployment {
    /// Fully qualified identifier of the virtual machine.
    pub vm_id: String,
    /// Public address assigned to the VM's network interface.
    pub public_address: IpAddr,
}

/// Errors raised while deploying a virtual machine.
#[derive(Debug, Error)]
pub enum DeployError<ClientError>
where
    ClientError: std::error::Error + 'static,
{
    /// Raised when the create call is rejected.
    #[error("failed to submit virtual machine '{vm_name}': {source}")]
    Submit {
        /// VM name.
        vm_name: String,
        /// Client error.
        #[source]
        source: ClientError,
    },
    /// Raised when the create operation reaches the failed state.
    #[error("virtual machine '{vm_name}' failed to provision: {reason}")]
    Provision {
        /// VM name.
        vm_name: String,
        /// Provider fault reason.
        reason: String,
    },
    /// Raised when the create operation cannot be observed to completion.
    #[error("virtual machine '{vm_name}' did not finish provisioning: {source}")]
    Wait {
        /// VM name.
        vm_name: String,
        /// Wait error.
        #[source]
        source: WaitError<ClientError>,
    },
    /// Raised when the public IP cannot be re-queried.
    #[error("failed to read public IP '{name}': {source}")]
    AddressLookup {
        /// Public IP resource name.
        name: String,
        /// Client error.
        #[source]
        source: ClientError,
    },
    /// Raised when the public IP exists but carries no usable address.
    #[error("public IP '{name}' has no assigned address")]
    MissingPublicAddress {
        /// Public IP resource name.
        name: String,
    },
}

impl<ClientError> DeployError<ClientError>
where
    ClientError: std::error::Error + 'static,
{
    /// Returns `true` when the VM was still provisioning once the wait bound
    /// elapsed.
    #[must_use]
    pub const fn timed_out(&self) -> bool {
        matches!(self, Self::Wait { source, .. } if source.is_timeout())
    }
}

/// Builds and submits VM create requests.
#[derive(Debug)]
pub struct VmProvisioner<C> {
    context: ProvisioningContext<C>,
}

impl<C: CloudClient> VmProvisioner<C> {
    /// Creates a provisioner bound to the shared context.
    #[must_use]
    pub const fn new(context: ProvisioningContext<C>) -> Self {
        Self { context }
    }

    /// Creates the VM referencing `nic`, waits for the operation, and then
    /// reads the address assigned to the public IP.
    ///
    /// Creation is never retried; a repeated deployment is safe because the
    /// network chain is found by lookup.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when submission, provisioning, or the address
    /// lookup fails. The address is not queried when provisioning fails.
    pub async fn deploy(
        &self,
        request: &ProvisioningRequest,
        nic: &NetworkInterfaceHandle,
    ) -> Result<Deployment, DeployError<C::Error>> {
        let client = self.context.client();
        let vm = ResourceId::virtual_machine(&request.resource_group, &request.vm_name);

        info!(vm = %request.vm_name, os = %request.os_type, size = %request.vm_size, "creating virtual machine");
        let operation = client
            .create(&vm, vm_create_body(request, &nic.nic_id))
            .await
            .map_err(|source| DeployError::Submit {
                vm_name: request.vm_name.clone(),
                source,
            })?;

        wait_for_terminal(client, operation, self.context.poll_policy())
            .await
            .map_err(|err| {
                warn!(vm = %request.vm_name, error = %err, "virtual machine was not provisioned");
                match err {
                    WaitError::Failed { reason, .. } => DeployError::Provision {
                        vm_name: request.vm_name.clone(),
                        reason,
                    },
                    other => DeployError::Wait {
                        vm_name: request.vm_name.clone(),
                        source: other,
                    },
                }
            })?;

        let public_address = self.public_address(&nic.public_ip).await?;
        info!(vm = %request.vm_name, %public_address, "virtual machine deployed");
        Ok(Deployment {
            vm_id: client.qualify(&vm),
            public_address,
        })
    }

    async fn public_address(&self, id: &ResourceId) -> Result<IpAddr, DeployError<C::Error>> {
        let resource = self
            .context
            .client()
            .get(id)
            .await
            .map_err(|source| DeployError::AddressLookup {
                name: id.name.clone(),
                source,
            })?;

        resource
            .as_ref()
            .and_then(|ip| ip.property_str(&["ipAddress"]))
            .and_then(|address| IpAddr::from_str(address).ok())
            .ok_or_else(|| DeployError::MissingPublicAddress {
                name: id.name.clone(),
            })
    }
}

fn vm_create_body(request: &ProvisioningRequest, nic_id: &str) -> Value {
    let mut os_profile = json!({
        "computerName": request.vm_name,
        "adminUsername": request.admin_username,
        "adminPassword": request.admin_password,
    });
    if request.os_type == OsType::Linux
        && let Some(profile) = os_profile.as_object_mut()
    {
        profile.insert(
            String::from("linuxConfiguration"),
            json!({ "disablePasswordAuthentication": false }),
        );
    }

    json!({
        "location": request.location,
        "properties": {
            "hardwareProfile": { "vmSize": request.vm_size },
            "storageProfile": {
                "imageReference": ImageReference::for_os(request.os_type),
                "osDisk": {
                    "createOption": "FromImage",
                    "managedDisk": { "storageAccountType": OS_DISK_STORAGE_ACCOUNT_TYPE }
                }
            },
            "osProfile": os_profile,
            "networkProfile": {
                "networkInterfaces": [{
                    "id": nic_id,
                    "properties": { "primary": true }
                }]
            }
        }
    })
}

#[cfg(test)]
mod tests;
