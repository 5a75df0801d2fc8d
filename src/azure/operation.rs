//! Classification of long-running operation responses.
//!
//! Resource Manager reports progress three ways: an `Azure-AsyncOperation`
//! status document (`status` field), a `Location` URL answering `202` until
//! the result is ready, or the resource itself carrying
//! `properties.provisioningState`. These helpers are free of I/O so the
//! rules can be tested directly.

use reqwest::header::{HeaderMap, LOCATION};
use serde_json::Value;

/// Header carrying the status document URL.
pub const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

/// Progress derived from one response.
#[derive(Clone, Debug, PartialEq)]
pub enum Progress {
    /// Still running.
    Running,
    /// Finished; carries run-command output when present.
    Succeeded(Option<Value>),
    /// Finished with a fault.
    Failed(String),
}

/// Picks the URL used to observe an operation, preferring the status
/// document over `Location`.
#[must_use]
pub fn poll_url_from_headers(headers: &HeaderMap) -> Option<String> {
    [ASYNC_OPERATION_HEADER, LOCATION.as_str()]
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Classifies a response body received with `status`.
#[must_use]
pub fn classify(status: u16, body: &Value) -> Progress {
    if let Some(text) = body.get("status").and_then(Value::as_str) {
        return classify_status_text(text, body);
    }
    if let Some(text) = body
        .get("properties")
        .and_then(|properties| properties.get("provisioningState"))
        .and_then(Value::as_str)
    {
        return classify_status_text(text, body);
    }
    if status == 202 {
        return Progress::Running;
    }
    Progress::Succeeded(run_command_output(body))
}

fn classify_status_text(text: &str, body: &Value) -> Progress {
    match text.to_ascii_lowercase().as_str() {
        "succeeded" => Progress::Succeeded(run_command_output(body)),
        "failed" | "canceled" | "cancelled" => Progress::Failed(fault_reason(body, text)),
        _ => Progress::Running,
    }
}

/// Extracts run-command output from either a status document
/// (`properties.output`) or a direct result (`value` list).
fn run_command_output(body: &Value) -> Option<Value> {
    if let Some(output) = body
        .get("properties")
        .and_then(|properties| properties.get("output"))
    {
        return Some(output.clone());
    }
    body.get("value").is_some().then(|| body.clone())
}

fn fault_reason(body: &Value, status: &str) -> String {
    body.get("error")
        .and_then(|error| {
            let message = error.get("message").and_then(Value::as_str)?;
            Some(
                error
                    .get("code")
                    .and_then(Value::as_str)
                    .map_or_else(|| message.to_owned(), |code| format!("{code}: {message}")),
            )
        })
        .unwrap_or_else(|| format!("operation {}", status.to_ascii_lowercase()))
}
