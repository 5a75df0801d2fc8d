//! End-to-end dispatcher scenarios against the scripted cloud.

use std::time::Duration;

use azvm::dispatch::is_success;
use azvm::test_support::ScriptedCloud;
use azvm::{
    OperationDefaults, OperationDispatcher, Parameters, PollPolicy, ProvisioningContext,
    ResourceId, ResourceKind,
};
use rstest::{fixture, rstest};

#[fixture]
fn cloud() -> ScriptedCloud {
    let cloud = ScriptedCloud::new();
    cloud.set_poll_rounds(1);
    cloud
}

fn dispatcher(cloud: &ScriptedCloud) -> OperationDispatcher<ScriptedCloud> {
    let policy = PollPolicy::new(Duration::from_millis(1), Duration::from_secs(2));
    OperationDispatcher::new(
        &ProvisioningContext::new(cloud.clone(), policy),
        OperationDefaults::default(),
    )
}

fn params(pairs: &[(&str, &str)]) -> Parameters {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

fn linux_deploy() -> Parameters {
    params(&[
        ("resource_group", "rg1"),
        ("vm_name", "vm1"),
        ("admin_password", "Str0ng!Pass123"),
        ("os_type", "linux"),
    ])
}

#[rstest]
#[tokio::test]
async fn linux_deploy_builds_full_chain(cloud: ScriptedCloud) {
    let result = dispatcher(&cloud)
        .dispatch("deploy_vm", &linux_deploy())
        .await;

    assert!(is_success(&result), "unexpected result: {result}");
    assert!(result.contains("20.51.100.7"), "{result}");
    assert!(result.contains("ssh azureuser@20.51.100.7"), "{result}");

    let kinds: Vec<ResourceKind> = cloud.created().iter().map(|id| id.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ResourceKind::ResourceGroup,
            ResourceKind::VirtualNetwork,
            ResourceKind::Subnet,
            ResourceKind::PublicIpAddress,
            ResourceKind::NetworkInterface,
            ResourceKind::VirtualMachine,
        ]
    );

    let vm_body = cloud
        .create_body(ResourceKind::VirtualMachine)
        .unwrap_or_else(|| panic!("VM create body recorded"));
    let image = &vm_body["properties"]["storageProfile"]["imageReference"];
    assert_eq!(image["publisher"], "Canonical");
    assert_eq!(image["sku"], "22_04-lts-gen2");
    assert!(cloud.contains(&ResourceId::virtual_machine("rg1", "vm1")));
}

#[rstest]
#[tokio::test]
async fn repeated_deploy_reuses_network(cloud: ScriptedCloud) {
    let dispatcher = dispatcher(&cloud);
    let first = dispatcher.dispatch("deploy_vm", &linux_deploy()).await;
    assert!(is_success(&first), "{first}");

    let second = dispatcher.dispatch("deploy_vm", &linux_deploy()).await;
    assert!(is_success(&second), "{second}");

    let network_creates = cloud
        .created()
        .iter()
        .filter(|id| id.kind != ResourceKind::VirtualMachine)
        .count();
    assert_eq!(network_creates, 5);
}

#[rstest]
#[tokio::test]
async fn weak_password_makes_no_cloud_calls(cloud: ScriptedCloud) {
    let mut request = linux_deploy();
    request.insert(String::from("admin_password"), String::from("short1"));

    let result = dispatcher(&cloud).dispatch("deploy_vm", &request).await;

    assert!(result.starts_with("❌ Error:"), "{result}");
    assert!(result.contains("admin_password"), "{result}");
    assert!(cloud.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn verified_service_restart_reports_status(cloud: ScriptedCloud) {
    cloud.push_run_command_output("", "");
    cloud.push_run_command_output(
        "● nginx.service - A high performance web server\n   Active: active (running)",
        "",
    );

    let result = dispatcher(&cloud)
        .dispatch(
            "restart_service",
            &params(&[
                ("resource_group", "rg1"),
                ("vm_name", "vm1"),
                ("service_name", "nginx"),
                ("os_type", "linux"),
            ]),
        )
        .await;

    assert!(is_success(&result), "{result}");
    assert!(result.contains("'nginx'"), "{result}");
    assert!(result.contains("active (running)"), "{result}");
    let scripts = cloud.run_command_scripts();
    assert_eq!(scripts.len(), 2);
    assert!(scripts[0].contains("systemctl restart nginx"), "{scripts:?}");
}

#[rstest]
#[tokio::test]
async fn inactive_service_is_reported_with_status_text(cloud: ScriptedCloud) {
    cloud.push_run_command_output("", "");
    cloud.push_run_command_output("   Active: inactive (dead)", "");

    let result = dispatcher(&cloud)
        .dispatch(
            "restart_service",
            &params(&[
                ("resource_group", "rg1"),
                ("vm_name", "vm1"),
                ("service_name", "nginx"),
                ("os_type", "linux"),
            ]),
        )
        .await;

    assert!(result.starts_with("❌"), "{result}");
    assert!(result.contains("inactive (dead)"), "{result}");
}
