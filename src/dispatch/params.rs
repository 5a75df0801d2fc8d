//! Extraction of typed values from the flat parameter map.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::request::{OsType, ProvisioningRequest, ValidationError};

use super::OperationDefaults;

/// Flat parameter map passed to every operation.
pub type Parameters = BTreeMap<String, String>;

/// Returns the trimmed value for `key`, or `None` when absent or blank.
#[must_use]
pub fn optional<'a>(params: &'a Parameters, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

/// Returns the trimmed value for `key`.
///
/// # Errors
///
/// Returns [`ValidationError::MissingField`] when the key is absent or blank.
pub fn required<'a>(params: &'a Parameters, key: &str) -> Result<&'a str, ValidationError> {
    optional(params, key).ok_or_else(|| ValidationError::MissingField(key.to_owned()))
}

/// Parses `os_type`, falling back to `default` when absent.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidOsType`] for unknown values.
pub fn os_type(params: &Parameters, default: OsType) -> Result<OsType, ValidationError> {
    optional(params, "os_type").map_or(Ok(default), OsType::from_str)
}

/// Parses an unsigned integer, falling back to `default` when absent.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidNumber`] when the value is not a
/// non-negative integer.
pub fn number(params: &Parameters, key: &str, default: u32) -> Result<u32, ValidationError> {
    optional(params, key).map_or(Ok(default), |raw| {
        raw.parse().map_err(|_| ValidationError::InvalidNumber {
            field: key.to_owned(),
            reason: format!("expected a whole number, got '{raw}'"),
        })
    })
}

/// Builds a deployment request, filling optional fields from `defaults`.
///
/// The password is passed through untrimmed.
///
/// # Errors
///
/// Returns [`ValidationError`] when a required field is missing or the
/// request fails validation.
pub fn provisioning_request(
    params: &Parameters,
    defaults: &OperationDefaults,
) -> Result<ProvisioningRequest, ValidationError> {
    let resource_group = required(params, "resource_group")?;
    let vm_name = required(params, "vm_name")?;
    let admin_password = params
        .get("admin_password")
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ValidationError::MissingField(String::from("admin_password")))?;

    ProvisioningRequest::builder()
        .resource_group(resource_group)
        .vm_name(vm_name)
        .location(optional(params, "location").unwrap_or(defaults.location.as_str()))
        .vm_size(optional(params, "vm_size").unwrap_or(defaults.vm_size.as_str()))
        .admin_username(optional(params, "admin_username").unwrap_or(defaults.admin_username.as_str()))
        .admin_password(admin_password.as_str())
        .os_type(os_type(params, OsType::Linux)?)
        .build()
}
