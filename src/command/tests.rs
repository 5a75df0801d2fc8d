//! Unit tests for the remote command runner.

use std::time::Duration;

use serde_json::{Value, json};

use super::{
    CommandError, ExitStatus, ProcessSamplePlan, RUN_COMMAND_ACTION, RUN_POWERSHELL_SCRIPT,
    RemoteCommandRunner, ServiceRestartPlan,
};
use crate::cloud::{OperationState, ResourceId};
use crate::context::ProvisioningContext;
use crate::poll::PollPolicy;
use crate::request::{OsType, ValidationError};
use crate::test_support::{CloudCall, ScriptedCloud};

fn runner(cloud: &ScriptedCloud) -> RemoteCommandRunner<ScriptedCloud> {
    let policy = PollPolicy::new(Duration::from_millis(1), Duration::from_millis(500));
    RemoteCommandRunner::new(ProvisioningContext::new(cloud.clone(), policy))
}

fn linux_output(stdout: &str) -> Value {
    json!({
        "value": [{
            "code": "ProvisioningState/succeeded",
            "message": format!("Enable succeeded: \n[stdout]\n{stdout}\n\n[stderr]\n"),
        }]
    })
}

fn run_command_count(cloud: &ScriptedCloud) -> usize {
    cloud
        .calls()
        .iter()
        .filter(|call| matches!(call, CloudCall::Action(_, action, _) if action == RUN_COMMAND_ACTION))
        .count()
}

#[test]
fn linux_plan_uses_systemctl() {
    let plan = ServiceRestartPlan::new(OsType::Linux, " nginx ")
        .unwrap_or_else(|err| panic!("plan should build: {err}"));
    assert_eq!(plan.service_name, "nginx");
    assert_eq!(plan.command_text, "systemctl restart nginx");
    assert_eq!(plan.status_query, "systemctl status nginx --no-pager");
    assert!(plan.is_running("Active: active (running) since Mon"));
    assert!(!plan.is_running("Active: inactive (dead)"));
}

#[test]
fn linux_plan_escapes_service_name() {
    let plan = ServiceRestartPlan::new(OsType::Linux, "odd name;rm")
        .unwrap_or_else(|err| panic!("plan should build: {err}"));
    assert_eq!(plan.command_text, "systemctl restart 'odd name;rm'");
}

#[test]
fn windows_plan_quotes_for_powershell() {
    let plan = ServiceRestartPlan::new(OsType::Windows, "it's")
        .unwrap_or_else(|err| panic!("plan should build: {err}"));
    assert_eq!(
        plan.command_text,
        "Restart-Service -Name 'it''s' -Force -ErrorAction Stop"
    );
    assert_eq!(plan.running_marker, "Running");
    assert_eq!(plan.restart_script().command_id, RUN_POWERSHELL_SCRIPT);
}

#[test]
fn service_name_with_control_characters_is_rejected() {
    let err = ServiceRestartPlan::new(OsType::Linux, "nginx\nreboot")
        .expect_err("newline should be rejected");
    assert!(matches!(err, ValidationError::InvalidName { .. }));
}

#[test]
fn sample_plan_rejects_out_of_range_values() {
    let seconds_err = ProcessSamplePlan::new(OsType::Linux, "vm1", 0, 15)
        .expect_err("zero seconds should be rejected");
    assert!(matches!(seconds_err, ValidationError::InvalidNumber { ref field, .. } if field == "sample_seconds"));

    let top_n_err = ProcessSamplePlan::new(OsType::Windows, "vm1", 5, 101)
        .expect_err("too many processes should be rejected");
    assert!(matches!(top_n_err, ValidationError::InvalidNumber { ref field, .. } if field == "top_n"));
}

#[tokio::test]
async fn restart_succeeds_when_status_shows_running() {
    let cloud = ScriptedCloud::new();
    cloud.push_run_command_value(linux_output(""));
    cloud.push_run_command_value(linux_output("Active: active (running) since Mon"));

    let result = runner(&cloud)
        .run_and_verify("rg1", "vm1", OsType::Linux, "nginx")
        .await
        .unwrap_or_else(|err| panic!("restart should verify: {err}"));

    assert_eq!(result.exit_status, ExitStatus::Succeeded);
    assert_eq!(
        cloud.run_command_scripts(),
        vec![
            String::from("systemctl restart nginx"),
            String::from("systemctl status nginx --no-pager"),
        ]
    );
}

#[tokio::test]
async fn missing_marker_fails_verification_with_output() {
    let cloud = ScriptedCloud::new();
    cloud.push_run_command_value(linux_output(""));
    cloud.push_run_command_value(linux_output("Active: inactive (dead)"));

    let err = runner(&cloud)
        .run_and_verify("rg1", "vm1", OsType::Linux, "nginx")
        .await
        .expect_err("inactive service should fail verification");

    assert!(matches!(err, CommandError::Verification { .. }));
    assert!(err.to_string().contains("inactive"), "{err}");
}

#[tokio::test]
async fn failed_restart_skips_status_query() {
    let cloud = ScriptedCloud::new();
    cloud.push_run_command_value(json!({
        "value": [{
            "code": "ProvisioningState/failed/5",
            "message": "[stdout]\n\n[stderr]\nFailed to restart nginx.service: Unit nginx.service not found.",
        }]
    }));

    let err = runner(&cloud)
        .run_and_verify("rg1", "vm1", OsType::Linux, "nginx")
        .await
        .expect_err("failed restart should surface");

    assert!(matches!(err, CommandError::CommandFailed { .. }));
    assert!(err.to_string().contains("not found"), "{err}");
    assert_eq!(run_command_count(&cloud), 1);
}

#[tokio::test]
async fn windows_restart_verifies_running_status() {
    let cloud = ScriptedCloud::new();
    cloud.push_run_command_output("", "");
    cloud.push_run_command_output("Running", "");

    runner(&cloud)
        .run_and_verify("rg1", "vm1", OsType::Windows, "Spooler")
        .await
        .unwrap_or_else(|err| panic!("restart should verify: {err}"));

    assert_eq!(
        cloud.run_command_scripts().last().map(String::as_str),
        Some("(Get-Service -Name 'Spooler' -ErrorAction Stop).Status")
    );
}

#[tokio::test]
async fn windows_restart_error_output_is_a_command_failure() {
    let cloud = ScriptedCloud::new();
    cloud.push_run_command_output(
        "",
        "Restart-Service : Cannot find any service with service name 'Nope'.",
    );
    cloud.push_run_command_output("", "Get-Service : Cannot find any service with service name 'Nope'.");

    let err = runner(&cloud)
        .run_and_verify("rg1", "vm1", OsType::Windows, "Nope")
        .await
        .expect_err("restart error output should surface");

    assert!(matches!(err, CommandError::CommandFailed { .. }), "got {err:?}");
    assert!(err.to_string().contains("Cannot find any service"), "{err}");
    assert!(!err.to_string().contains("was restarted"), "{err}");
    assert_eq!(run_command_count(&cloud), 1);
}

#[tokio::test]
async fn blank_service_name_issues_no_calls() {
    let cloud = ScriptedCloud::new();
    let err = runner(&cloud)
        .run_and_verify("rg1", "vm1", OsType::Linux, "   ")
        .await
        .expect_err("blank service should be rejected");

    assert!(matches!(
        err,
        CommandError::Validation(ValidationError::MissingField(_))
    ));
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn missing_output_is_malformed() {
    let cloud = ScriptedCloud::new();
    let err = runner(&cloud)
        .run_and_verify("rg1", "vm1", OsType::Linux, "nginx")
        .await
        .expect_err("missing output should fail");
    assert!(matches!(err, CommandError::MalformedOutput { .. }));
}

#[tokio::test]
async fn restart_vm_succeeds_for_existing_vm() {
    let cloud = ScriptedCloud::new();
    let vm = ResourceId::virtual_machine("rg1", "vm1");
    cloud.insert_existing(&vm, json!({}));
    cloud.set_poll_rounds(2);

    let state = runner(&cloud)
        .restart_vm("rg1", "vm1")
        .await
        .unwrap_or_else(|err| panic!("restart should succeed: {err}"));

    assert_eq!(state, OperationState::Succeeded);
    assert_eq!(cloud.poll_count(), 3);
    assert!(
        cloud
            .calls()
            .contains(&CloudCall::Action(vm, String::from("restart"), None))
    );
}

#[tokio::test]
async fn restart_vm_reports_missing_vm_without_action() {
    let cloud = ScriptedCloud::new();
    let err = runner(&cloud)
        .restart_vm("rg1", "ghost")
        .await
        .expect_err("missing vm should fail");

    assert!(matches!(err, CommandError::VmNotFound { ref vm_name, .. } if vm_name == "ghost"));
    assert!(
        !cloud
            .calls()
            .iter()
            .any(|call| matches!(call, CloudCall::Action(..)))
    );
}

#[tokio::test]
async fn restart_vm_failure_carries_fault() {
    let cloud = ScriptedCloud::new();
    cloud.insert_existing(&ResourceId::virtual_machine("rg1", "vm1"), json!({}));
    cloud.fail_action("restart", "VM is deallocated");

    let err = runner(&cloud)
        .restart_vm("rg1", "vm1")
        .await
        .expect_err("failed restart should surface");

    assert!(matches!(err, CommandError::OperationFailed { ref reason, .. } if reason == "VM is deallocated"));
}

#[tokio::test]
async fn process_sample_is_pretty_printed() {
    let cloud = ScriptedCloud::new();
    cloud.push_run_command_output(r#"{"success": true, "processes": []}"#, "");

    let report = runner(&cloud)
        .sample_processes("rg1", "vm1", OsType::Windows, 5, 15)
        .await
        .unwrap_or_else(|err| panic!("sample should succeed: {err}"));

    let parsed: Value = serde_json::from_str(&report)
        .unwrap_or_else(|err| panic!("report should be JSON: {err}"));
    assert_eq!(parsed["success"], json!(true));
    assert!(report.contains('\n'));
}

#[tokio::test]
async fn non_json_sample_is_wrapped() {
    let cloud = ScriptedCloud::new();
    cloud.push_run_command_output("not json", "boom");

    let report = runner(&cloud)
        .sample_processes("rg1", "vm1", OsType::Windows, 5, 15)
        .await
        .unwrap_or_else(|err| panic!("sample should return a report: {err}"));

    let parsed: Value = serde_json::from_str(&report)
        .unwrap_or_else(|err| panic!("report should be JSON: {err}"));
    assert_eq!(parsed["success"], json!(false));
    assert_eq!(parsed["raw_output"], json!("not json"));
    assert_eq!(parsed["error_output"], json!("boom"));
}

#[tokio::test]
async fn empty_sample_is_wrapped() {
    let cloud = ScriptedCloud::new();
    cloud.push_run_command_output("", "");

    let report = runner(&cloud)
        .sample_processes("rg1", "vm1", OsType::Linux, 5, 15)
        .await
        .unwrap_or_else(|err| panic!("sample should return a report: {err}"));

    let parsed: Value = serde_json::from_str(&report)
        .unwrap_or_else(|err| panic!("report should be JSON: {err}"));
    assert_eq!(parsed["error"], json!("No output received from VM"));
}
