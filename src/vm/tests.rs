//! Unit tests for VM deployment.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde_json::json;

use super::{DeployError, ImageReference, VmProvisioner};
use crate::cloud::{ResourceId, ResourceKind};
use crate::context::ProvisioningContext;
use crate::network::{NetworkInterfaceHandle, NetworkProvisioner};
use crate::poll::PollPolicy;
use crate::request::{OsType, ProvisioningRequest};
use crate::test_support::{SCRIPTED_SUBSCRIPTION, ScriptedCloud};

fn request(os_type: OsType) -> ProvisioningRequest {
    ProvisioningRequest::builder()
        .resource_group("rg1")
        .vm_name("vm1")
        .admin_password("Str0ng!Pass123")
        .os_type(os_type)
        .build()
        .unwrap_or_else(|err| panic!("request should be valid: {err}"))
}

fn context(cloud: &ScriptedCloud) -> ProvisioningContext<ScriptedCloud> {
    let policy = PollPolicy::new(Duration::from_millis(1), Duration::from_millis(500));
    ProvisioningContext::new(cloud.clone(), policy)
}

async fn network(cloud: &ScriptedCloud, request: &ProvisioningRequest) -> NetworkInterfaceHandle {
    NetworkProvisioner::new(context(cloud))
        .ensure_network(request)
        .await
        .unwrap_or_else(|err| panic!("network should provision: {err}"))
}

#[tokio::test]
async fn deploy_returns_public_address_of_nic_ip() {
    let cloud = ScriptedCloud::new();
    let request = request(OsType::Linux);
    let nic = network(&cloud, &request).await;

    let deployment = VmProvisioner::new(context(&cloud))
        .deploy(&request, &nic)
        .await
        .unwrap_or_else(|err| panic!("deployment should succeed: {err}"));

    assert_eq!(
        deployment.public_address,
        IpAddr::V4(Ipv4Addr::new(20, 51, 100, 7))
    );
    assert_eq!(
        deployment.vm_id,
        ResourceId::virtual_machine("rg1", "vm1").arm_path(SCRIPTED_SUBSCRIPTION)
    );
}

#[tokio::test]
async fn linux_body_uses_ubuntu_image_and_password_login() {
    let cloud = ScriptedCloud::new();
    let request = request(OsType::Linux);
    let nic = network(&cloud, &request).await;
    VmProvisioner::new(context(&cloud))
        .deploy(&request, &nic)
        .await
        .unwrap_or_else(|err| panic!("deployment should succeed: {err}"));

    let body = cloud
        .create_body(ResourceKind::VirtualMachine)
        .unwrap_or_else(|| panic!("vm create body missing"));
    let properties = &body["properties"];
    assert_eq!(properties["hardwareProfile"]["vmSize"], json!("Standard_B2s"));
    assert_eq!(
        properties["storageProfile"]["imageReference"]["offer"],
        json!(ImageReference::UBUNTU_2204.offer)
    );
    assert_eq!(
        properties["storageProfile"]["osDisk"]["managedDisk"]["storageAccountType"],
        json!("Premium_LRS")
    );
    assert_eq!(
        properties["osProfile"]["linuxConfiguration"]["disablePasswordAuthentication"],
        json!(false)
    );
    assert_eq!(properties["osProfile"]["adminUsername"], json!("azureuser"));
    assert_eq!(
        properties["networkProfile"]["networkInterfaces"][0]["id"],
        json!(nic.nic_id)
    );
    assert_eq!(body["location"], json!("eastus"));
}

#[tokio::test]
async fn windows_body_uses_server_image_without_linux_configuration() {
    let cloud = ScriptedCloud::new();
    let request = request(OsType::Windows);
    let nic = network(&cloud, &request).await;
    VmProvisioner::new(context(&cloud))
        .deploy(&request, &nic)
        .await
        .unwrap_or_else(|err| panic!("deployment should succeed: {err}"));

    let body = cloud
        .create_body(ResourceKind::VirtualMachine)
        .unwrap_or_else(|| panic!("vm create body missing"));
    let os_profile = &body["properties"]["osProfile"];
    assert!(os_profile.get("linuxConfiguration").is_none());
    assert_eq!(
        body["properties"]["storageProfile"]["imageReference"]["publisher"],
        json!("MicrosoftWindowsServer")
    );
}

#[tokio::test]
async fn provisioning_fault_skips_address_lookup() {
    let cloud = ScriptedCloud::new();
    let request = request(OsType::Linux);
    let nic = network(&cloud, &request).await;
    cloud.fail_provisioning(ResourceKind::VirtualMachine, "SkuNotAvailable");
    let lookups_before = cloud.lookup_count(ResourceKind::PublicIpAddress);

    let err = VmProvisioner::new(context(&cloud))
        .deploy(&request, &nic)
        .await
        .expect_err("vm fault should surface");

    match err {
        DeployError::Provision { vm_name, reason } => {
            assert_eq!(vm_name, "vm1");
            assert_eq!(reason, "SkuNotAvailable");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        cloud.lookup_count(ResourceKind::PublicIpAddress),
        lookups_before
    );
}

#[tokio::test]
async fn missing_address_is_reported() {
    let cloud = ScriptedCloud::new();
    cloud.set_public_address(None);
    let request = request(OsType::Linux);
    let nic = network(&cloud, &request).await;

    let err = VmProvisioner::new(context(&cloud))
        .deploy(&request, &nic)
        .await
        .expect_err("address should be missing");

    assert!(matches!(err, DeployError::MissingPublicAddress { ref name } if name == "vm1-ip"));
}

#[tokio::test]
async fn submit_rejection_is_reported() {
    let cloud = ScriptedCloud::new();
    let request = request(OsType::Linux);
    let nic = network(&cloud, &request).await;
    cloud.fail_create(ResourceKind::VirtualMachine);

    let err = VmProvisioner::new(context(&cloud))
        .deploy(&request, &nic)
        .await
        .expect_err("submit should fail");

    assert!(matches!(err, DeployError::Submit { .. }));
    assert_eq!(cloud.poll_count(), 5, "only network operations were polled");
}
