//! Interpretation of run-command output.
//!
//! The provider reports output as a list of instance view statuses. Windows
//! guests report separate `ComponentStatus/StdOut/*` and
//! `ComponentStatus/StdErr/*` entries, Linux guests a single
//! `ProvisioningState/*` entry whose message embeds `[stdout]` and
//! `[stderr]` sections.

use serde::Deserialize;
use serde_json::Value;

const STDOUT_SECTION: &str = "[stdout]";
const STDERR_SECTION: &str = "[stderr]";

/// Exit status reported for a run-command invocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitStatus {
    /// The script completed successfully.
    Succeeded,
    /// The script reported a failure.
    Failed,
}

/// Captured result of one run-command invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandExecutionResult {
    /// Exit status.
    pub exit_status: ExitStatus,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandExecutionResult {
    /// Returns `true` when the script succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_status, ExitStatus::Succeeded)
    }

    /// Parses the `properties.output` value of a run-command operation.
    ///
    /// # Errors
    ///
    /// Returns the decode error message when the value is not a status list.
    pub fn from_output(value: Value) -> Result<Self, String> {
        let output: RunCommandOutput =
            serde_json::from_value(value).map_err(|err| err.to_string())?;

        let mut result = Self {
            exit_status: ExitStatus::Succeeded,
            stdout: String::new(),
            stderr: String::new(),
        };
        for status in output.value {
            if status.code.split('/').any(|part| part == "failed") {
                result.exit_status = ExitStatus::Failed;
            }
            let message = status.message.unwrap_or_default();
            if status.code.starts_with("ComponentStatus/StdOut") {
                result.stdout.push_str(&message);
            } else if status.code.starts_with("ComponentStatus/StdErr") {
                result.stderr.push_str(&message);
            } else if status.code.starts_with("ProvisioningState") {
                let (stdout, stderr) = split_sections(&message);
                result.stdout.push_str(stdout);
                result.stderr.push_str(stderr);
            }
        }
        Ok(result)
    }
}

#[derive(Debug, Deserialize)]
struct RunCommandOutput {
    #[serde(default)]
    value: Vec<InstanceViewStatus>,
}

#[derive(Debug, Deserialize)]
struct InstanceViewStatus {
    code: String,
    #[serde(default)]
    message: Option<String>,
}

fn split_sections(message: &str) -> (&str, &str) {
    let Some((_, rest)) = message.split_once(STDOUT_SECTION) else {
        return (message.trim(), "");
    };
    match rest.split_once(STDERR_SECTION) {
        Some((stdout, stderr)) => (stdout.trim(), stderr.trim()),
        None => (rest.trim(), ""),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CommandExecutionResult, ExitStatus};

    #[test]
    fn windows_status_list_is_split_by_stream() {
        let result = CommandExecutionResult::from_output(json!({
            "value": [
                { "code": "ComponentStatus/StdOut/succeeded", "message": "Running" },
                { "code": "ComponentStatus/StdErr/succeeded", "message": "" }
            ]
        }))
        .unwrap_or_else(|err| panic!("output should parse: {err}"));

        assert_eq!(result.exit_status, ExitStatus::Succeeded);
        assert_eq!(result.stdout, "Running");
        assert!(result.stderr.is_empty());
    }

    #[test]
    fn linux_provisioning_message_is_split_into_sections() {
        let result = CommandExecutionResult::from_output(json!({
            "value": [{
                "code": "ProvisioningState/succeeded",
                "message": "Enable succeeded: \n[stdout]\nactive (running)\n\n[stderr]\nwarning\n"
            }]
        }))
        .unwrap_or_else(|err| panic!("output should parse: {err}"));

        assert_eq!(result.stdout, "active (running)");
        assert_eq!(result.stderr, "warning");
        assert!(result.is_success());
    }

    #[test]
    fn failed_code_marks_exit_status() {
        let result = CommandExecutionResult::from_output(json!({
            "value": [{
                "code": "ProvisioningState/failed/5",
                "message": "[stdout]\n\n[stderr]\nUnit nginx.service not found."
            }]
        }))
        .unwrap_or_else(|err| panic!("output should parse: {err}"));

        assert_eq!(result.exit_status, ExitStatus::Failed);
        assert_eq!(result.stderr, "Unit nginx.service not found.");
    }

    #[test]
    fn malformed_output_is_rejected() {
        let err = CommandExecutionResult::from_output(json!({ "value": "nope" }))
            .expect_err("non-list output should fail");
        assert!(!err.is_empty());
    }
}
