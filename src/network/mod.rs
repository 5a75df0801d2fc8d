//! Network dependency chain for a virtual machine.
//!
//! The chain is resource group → virtual network → subnet → public IP →
//! network interface. Each member is looked up by a name derived from the VM
//! name and only created when absent, so a repeated invocation converges on
//! the same resources. Members already present are reused as-is. A failure
//! aborts the rest of the chain and leaves earlier members in place; the next
//! attempt resumes through the lookups.

use std::fmt;

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::cloud::{CloudClient, ResourceId};
use crate::context::ProvisioningContext;
use crate::poll::{WaitError, wait_for_terminal};
use crate::request::ProvisioningRequest;

const VNET_ADDRESS_SPACE: &str = "10.0.0.0/16";
const SUBNET_ADDRESS_PREFIX: &str = "10.0.0.0/24";
const PUBLIC_IP_SKU: &str = "Standard";
const PUBLIC_IP_ALLOCATION: &str = "Static";
const PUBLIC_IP_VERSION: &str = "IPv4";
const NIC_IP_CONFIGURATION: &str = "ipconfig1";

/// Names of the network resources backing one VM.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetworkTopology {
    /// Resource group owning every member.
    pub resource_group: String,
    /// Virtual network name (`<vm>-vnet`).
    pub vnet_name: String,
    /// Subnet name (`<vm>-subnet`).
    pub subnet_name: String,
    /// Public IP name (`<vm>-ip`).
    pub public_ip_name: String,
    /// Network interface name (`<vm>-nic`).
    pub nic_name: String,
}

impl NetworkTopology {
    /// Derives the topology for `vm_name`.
    #[must_use]
    pub fn for_vm(resource_group: &str, vm_name: &str) -> Self {
        Self {
            resource_group: resource_group.to_owned(),
            vnet_name: format!("{vm_name}-vnet"),
            subnet_name: format!("{vm_name}-subnet"),
            public_ip_name: format!("{vm_name}-ip"),
            nic_name: format!("{vm_name}-nic"),
        }
    }

    /// Identifier of the resource group.
    #[must_use]
    pub fn resource_group_id(&self) -> ResourceId {
        ResourceId::resource_group(&self.resource_group)
    }

    /// Identifier of the virtual network.
    #[must_use]
    pub fn vnet_id(&self) -> ResourceId {
        ResourceId::virtual_network(&self.resource_group, &self.vnet_name)
    }

    /// Identifier of the subnet.
    #[must_use]
    pub fn subnet_id(&self) -> ResourceId {
        ResourceId::subnet(&self.resource_group, &self.vnet_name, &self.subnet_name)
    }

    /// Identifier of the public IP.
    #[must_use]
    pub fn public_ip_id(&self) -> ResourceId {
        ResourceId::public_ip(&self.resource_group, &self.public_ip_name)
    }

    /// Identifier of the network interface.
    #[must_use]
    pub fn nic_id(&self) -> ResourceId {
        ResourceId::network_interface(&self.resource_group, &self.nic_name)
    }
}

/// Member of the chain, in provisioning order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NetworkStage {
    /// Resource group.
    ResourceGroup,
    /// Virtual network.
    VirtualNetwork,
    /// Subnet.
    Subnet,
    /// Public IP.
    PublicIp,
    /// Network interface.
    NetworkInterface,
}

impl fmt::Display for NetworkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ResourceGroup => "resource group",
            Self::VirtualNetwork => "virtual network",
            Self::Subnet => "subnet",
            Self::PublicIp => "public IP",
            Self::NetworkInterface => "network interface",
        };
        f.write_str(label)
    }
}

/// Result of [`NetworkProvisioner::ensure_network`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetworkInterfaceHandle {
    /// Fully qualified identifier of the network interface.
    pub nic_id: String,
    /// Public IP attached to the interface, re-queried after deployment.
    pub public_ip: ResourceId,
    /// Names used for every member of the chain.
    pub topology: NetworkTopology,
}

/// Errors raised while ensuring the network chain.
#[derive(Debug, Error)]
pub enum NetworkError<ClientError>
where
    ClientError: std::error::Error + 'static,
{
    /// Raised when the existence check fails.
    #[error("failed to look up {stage} '{name}': {source}")]
    Lookup {
        /// Failing member.
        stage: NetworkStage,
        /// Resource name.
        name: String,
        /// Client error.
        #[source]
        source: ClientError,
    },
    /// Raised when the create call is rejected.
    #[error("failed to create {stage} '{name}': {source}")]
    Create {
        /// Failing member.
        stage: NetworkStage,
        /// Resource name.
        name: String,
        /// Client error.
        #[source]
        source: ClientError,
    },
    /// Raised when the create operation fails or never completes.
    #[error("{stage} '{name}' was not provisioned: {source}")]
    Provision {
        /// Failing member.
        stage: NetworkStage,
        /// Resource name.
        name: String,
        /// Wait error carrying the provider fault.
        #[source]
        source: WaitError<ClientError>,
    },
}

impl<ClientError> NetworkError<ClientError>
where
    ClientError: std::error::Error + 'static,
{
    /// Returns the member that failed.
    #[must_use]
    pub const fn stage(&self) -> NetworkStage {
        match self {
            Self::Lookup { stage, .. } | Self::Create { stage, .. } | Self::Provision { stage, .. } => {
                *stage
            }
        }
    }

    /// Returns `true` when the member was still provisioning once the wait
    /// bound elapsed.
    #[must_use]
    pub const fn timed_out(&self) -> bool {
        matches!(self, Self::Provision { source, .. } if source.is_timeout())
    }
}

/// Ensures the network chain exists for a deployment request.
#[derive(Debug)]
pub struct NetworkProvisioner<C> {
    context: ProvisioningContext<C>,
}

impl<C: CloudClient> NetworkProvisioner<C> {
    /// Creates a provisioner bound to the shared context.
    #[must_use]
    pub const fn new(context: ProvisioningContext<C>) -> Self {
        Self { context }
    }

    /// Looks up or creates every member of the chain in order and returns the
    /// network interface the VM will reference.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] tagged with the first member that failed;
    /// nothing after it is attempted.
    pub async fn ensure_network(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<NetworkInterfaceHandle, NetworkError<C::Error>> {
        let topology = NetworkTopology::for_vm(&request.resource_group, &request.vm_name);
        let location = request.location.as_str();

        self.ensure(
            NetworkStage::ResourceGroup,
            &topology.resource_group_id(),
            || json!({ "location": location }),
        )
        .await?;

        self.ensure(NetworkStage::VirtualNetwork, &topology.vnet_id(), || {
            json!({
                "location": location,
                "properties": {
                    "addressSpace": { "addressPrefixes": [VNET_ADDRESS_SPACE] }
                }
            })
        })
        .await?;

        let subnet_id = self
            .ensure(NetworkStage::Subnet, &topology.subnet_id(), || {
                json!({ "properties": { "addressPrefix": SUBNET_ADDRESS_PREFIX } })
            })
            .await?;

        let public_ip_id = self
            .ensure(NetworkStage::PublicIp, &topology.public_ip_id(), || {
                json!({
                    "location": location,
                    "sku": { "name": PUBLIC_IP_SKU },
                    "properties": {
                        "publicIPAllocationMethod": PUBLIC_IP_ALLOCATION,
                        "publicIPAddressVersion": PUBLIC_IP_VERSION
                    }
                })
            })
            .await?;

        let nic_id = self
            .ensure(NetworkStage::NetworkInterface, &topology.nic_id(), || {
                json!({
                    "location": location,
                    "properties": {
                        "ipConfigurations": [{
                            "name": NIC_IP_CONFIGURATION,
                            "properties": {
                                "subnet": { "id": subnet_id },
                                "publicIPAddress": { "id": public_ip_id }
                            }
                        }]
                    }
                })
            })
            .await?;

        Ok(NetworkInterfaceHandle {
            nic_id,
            public_ip: topology.public_ip_id(),
            topology,
        })
    }

    /// Reuses `id` when it exists, otherwise creates it and waits for the
    /// operation to finish. Returns the fully qualified identifier.
    async fn ensure(
        &self,
        stage: NetworkStage,
        id: &ResourceId,
        body: impl FnOnce() -> Value,
    ) -> Result<String, NetworkError<C::Error>> {
        let client = self.context.client();
        let existing = client
            .get(id)
            .await
            .map_err(|source| NetworkError::Lookup {
                stage,
                name: id.name.clone(),
                source,
            })?;

        if let Some(resource) = existing {
            info!(%stage, name = %id.name, "reusing existing resource");
            return Ok(resource.id);
        }

        info!(%stage, name = %id.name, "creating resource");
        let operation = client
            .create(id, body())
            .await
            .map_err(|source| NetworkError::Create {
                stage,
                name: id.name.clone(),
                source,
            })?;

        wait_for_terminal(client, operation, self.context.poll_policy())
            .await
            .map_err(|source| {
                warn!(%stage, name = %id.name, error = %source, "resource was not provisioned");
                NetworkError::Provision {
                    stage,
                    name: id.name.clone(),
                    source,
                }
            })?;

        Ok(client.qualify(id))
    }
}
