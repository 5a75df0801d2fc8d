//! Cloud client abstraction consumed by the orchestration core.
//!
//! A [`CloudClient`] only issues lookups, create calls, and resource actions
//! and reports the state of the long-running operations they return. All
//! sequencing lives in the provisioners that sit on top of it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

/// Future returned by cloud client operations.
pub type CloudFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Kinds of resource the orchestrator manages.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ResourceKind {
    /// Resource group owning every other resource.
    ResourceGroup,
    /// Virtual network.
    VirtualNetwork,
    /// Subnet inside a virtual network.
    Subnet,
    /// Public IPv4 address.
    PublicIpAddress,
    /// Network interface.
    NetworkInterface,
    /// Virtual machine.
    VirtualMachine,
}

impl ResourceKind {
    /// Human readable label used in logs and errors.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ResourceGroup => "resource group",
            Self::VirtualNetwork => "virtual network",
            Self::Subnet => "subnet",
            Self::PublicIpAddress => "public IP",
            Self::NetworkInterface => "network interface",
            Self::VirtualMachine => "virtual machine",
        }
    }

    /// Resource Manager API version used for this kind.
    #[must_use]
    pub const fn api_version(self) -> &'static str {
        match self {
            Self::ResourceGroup => "2021-04-01",
            Self::VirtualNetwork
            | Self::Subnet
            | Self::PublicIpAddress
            | Self::NetworkInterface => "2023-09-01",
            Self::VirtualMachine => "2024-03-01",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Address of a resource within a subscription.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ResourceId {
    /// Owning resource group.
    pub resource_group: String,
    /// Kind of resource addressed.
    pub kind: ResourceKind,
    /// Resource name.
    pub name: String,
    /// Parent resource name (the virtual network for subnets).
    pub parent: Option<String>,
}

impl ResourceId {
    fn new(resource_group: &str, kind: ResourceKind, name: &str) -> Self {
        Self {
            resource_group: resource_group.to_owned(),
            kind,
            name: name.to_owned(),
            parent: None,
        }
    }

    /// Addresses a resource group.
    #[must_use]
    pub fn resource_group(name: &str) -> Self {
        Self::new(name, ResourceKind::ResourceGroup, name)
    }

    /// Addresses a virtual network.
    #[must_use]
    pub fn virtual_network(resource_group: &str, name: &str) -> Self {
        Self::new(resource_group, ResourceKind::VirtualNetwork, name)
    }

    /// Addresses a subnet of `vnet`.
    #[must_use]
    pub fn subnet(resource_group: &str, vnet: &str, name: &str) -> Self {
        Self {
            parent: Some(vnet.to_owned()),
            ..Self::new(resource_group, ResourceKind::Subnet, name)
        }
    }

    /// Addresses a public IP address.
    #[must_use]
    pub fn public_ip(resource_group: &str, name: &str) -> Self {
        Self::new(resource_group, ResourceKind::PublicIpAddress, name)
    }

    /// Addresses a network interface.
    #[must_use]
    pub fn network_interface(resource_group: &str, name: &str) -> Self {
        Self::new(resource_group, ResourceKind::NetworkInterface, name)
    }

    /// Addresses a virtual machine.
    #[must_use]
    pub fn virtual_machine(resource_group: &str, name: &str) -> Self {
        Self::new(resource_group, ResourceKind::VirtualMachine, name)
    }

    /// Renders the fully qualified Resource Manager identifier.
    #[must_use]
    pub fn arm_path(&self, subscription_id: &str) -> String {
        let group = format!(
            "/subscriptions/{subscription_id}/resourceGroups/{}",
            self.resource_group
        );
        match self.kind {
            ResourceKind::ResourceGroup => group,
            ResourceKind::VirtualNetwork => format!(
                "{group}/providers/Microsoft.Network/virtualNetworks/{}",
                self.name
            ),
            ResourceKind::Subnet => format!(
                "{group}/providers/Microsoft.Network/virtualNetworks/{}/subnets/{}",
                self.parent.as_deref().unwrap_or_default(),
                self.name
            ),
            ResourceKind::PublicIpAddress => format!(
                "{group}/providers/Microsoft.Network/publicIPAddresses/{}",
                self.name
            ),
            ResourceKind::NetworkInterface => format!(
                "{group}/providers/Microsoft.Network/networkInterfaces/{}",
                self.name
            ),
            ResourceKind::VirtualMachine => format!(
                "{group}/providers/Microsoft.Compute/virtualMachines/{}",
                self.name
            ),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}

/// Snapshot of an existing resource returned by a lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    /// Fully qualified identifier reported by the provider.
    pub id: String,
    /// Provider specific `properties` object.
    pub properties: Value,
}

impl Resource {
    /// Reads a string nested under `properties` following `path`.
    #[must_use]
    pub fn property_str(&self, path: &[&str]) -> Option<&str> {
        path.iter()
            .try_fold(&self.properties, |value, key| value.get(key))
            .and_then(Value::as_str)
    }
}

/// Lifecycle of a long-running operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperationState {
    /// Accepted by the provider; not yet observed.
    Submitted,
    /// Observed at least once and still running.
    Polling,
    /// Completed successfully.
    Succeeded,
    /// Completed with a fault.
    Failed,
}

impl OperationState {
    /// Returns `true` for the states in which a result may be interpreted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Submitted => "submitted",
            Self::Polling => "polling",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Handle for a create or action call.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    /// Resource the operation acts on.
    pub target: ResourceId,
    /// Action name (`create`, `restart`, `runCommand`, ...).
    pub action: String,
    /// Current state.
    pub state: OperationState,
    /// Provider URL used to observe progress, when one was issued.
    pub poll_url: Option<String>,
    /// Output attached to a succeeded operation (run-command output).
    pub output: Option<Value>,
    /// Provider fault reason attached to a failed operation.
    pub fault: Option<String>,
}

impl Operation {
    /// Creates a freshly submitted operation.
    #[must_use]
    pub fn submitted(target: ResourceId, action: impl Into<String>) -> Self {
        Self {
            target,
            action: action.into(),
            state: OperationState::Submitted,
            poll_url: None,
            output: None,
            fault: None,
        }
    }
}

/// Minimal interface implemented by cloud clients.
///
/// Implementations must be safe to share across concurrently running
/// requests; every call is an independent, stateless request.
pub trait CloudClient: Send + Sync {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Renders the fully qualified identifier the provider uses for `id`.
    fn qualify(&self, id: &ResourceId) -> String;

    /// Looks a resource up by name, returning `None` when it does not exist.
    fn get<'a>(&'a self, id: &'a ResourceId) -> CloudFuture<'a, Option<Resource>, Self::Error>;

    /// Submits a create (or create-or-update) call.
    fn create<'a>(
        &'a self,
        id: &'a ResourceId,
        body: Value,
    ) -> CloudFuture<'a, Operation, Self::Error>;

    /// Submits an action against an existing resource.
    fn action<'a>(
        &'a self,
        id: &'a ResourceId,
        action: &'a str,
        body: Option<Value>,
    ) -> CloudFuture<'a, Operation, Self::Error>;

    /// Observes the operation once and returns its updated state.
    fn poll<'a>(&'a self, operation: &'a Operation) -> CloudFuture<'a, Operation, Self::Error>;
}
