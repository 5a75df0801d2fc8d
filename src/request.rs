//! Deployment request types and their validation rules.
//!
//! Requests are trimmed and validated when built so that malformed input is
//! rejected before any cloud call is issued.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Region used when the caller does not supply one.
pub const DEFAULT_LOCATION: &str = "eastus";
/// VM size used when the caller does not supply one.
pub const DEFAULT_VM_SIZE: &str = "Standard_B2s";
/// Administrator account created on the VM when none is supplied.
pub const DEFAULT_ADMIN_USERNAME: &str = "azureuser";

const MIN_PASSWORD_LENGTH: usize = 12;
const MAX_NAME_LENGTH: usize = 80;

/// Guest operating system family.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum OsType {
    /// Ubuntu based Linux guest.
    #[default]
    Linux,
    /// Windows Server guest.
    Windows,
}

impl OsType {
    /// Returns the lowercase label used in parameters and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            _ => Err(ValidationError::InvalidOsType(value.trim().to_owned())),
        }
    }
}

/// Errors raised when a request fails validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ValidationError {
    /// Raised when a required field is missing or blank.
    #[error("missing or empty field: {0}")]
    MissingField(String),
    /// Raised when the administrator password fails the complexity policy.
    #[error("admin_password does not meet the complexity policy: {0}")]
    WeakPassword(String),
    /// Raised when an unknown operating system is requested.
    #[error("os_type must be 'linux' or 'windows', got '{0}'")]
    InvalidOsType(String),
    /// Raised when a name cannot be used in a resource path or script.
    #[error("invalid {field}: {reason}")]
    InvalidName {
        /// Field carrying the rejected value.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// Raised when a numeric parameter is malformed or out of range.
    #[error("invalid {field}: {reason}")]
    InvalidNumber {
        /// Field carrying the rejected value.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Parameters needed to deploy a VM together with its network stack.
#[derive(Clone, Eq, PartialEq)]
pub struct ProvisioningRequest {
    /// Resource group that owns every created resource.
    pub resource_group: String,
    /// Name of the virtual machine; network resource names derive from it.
    pub vm_name: String,
    /// Azure region (for example `eastus`).
    pub location: String,
    /// VM size SKU (for example `Standard_B2s`).
    pub vm_size: String,
    /// Administrator account name.
    pub admin_username: String,
    /// Administrator password.
    pub admin_password: String,
    /// Guest operating system.
    pub os_type: OsType,
}

impl fmt::Debug for ProvisioningRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningRequest")
            .field("resource_group", &self.resource_group)
            .field("vm_name", &self.vm_name)
            .field("location", &self.location)
            .field("vm_size", &self.vm_size)
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"<redacted>")
            .field("os_type", &self.os_type)
            .finish()
    }
}

impl ProvisioningRequest {
    /// Starts a builder pre-populated with the default region, size, and user.
    #[must_use]
    pub fn builder() -> ProvisioningRequestBuilder {
        ProvisioningRequestBuilder::new()
    }

    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when a field is empty, a name contains
    /// characters that cannot appear in a resource path, or the password
    /// fails the complexity policy.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name("resource_group", &self.resource_group)?;
        validate_name("vm_name", &self.vm_name)?;
        validate_name("location", &self.location)?;
        validate_name("vm_size", &self.vm_size)?;
        validate_name("admin_username", &self.admin_username)?;
        validate_password(&self.admin_password)
    }
}

/// Builder for [`ProvisioningRequest`] that trims inputs and validates on
/// build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisioningRequestBuilder {
    resource_group: String,
    vm_name: String,
    location: String,
    vm_size: String,
    admin_username: String,
    admin_password: String,
    os_type: OsType,
}

impl Default for ProvisioningRequestBuilder {
    fn default() -> Self {
        Self {
            resource_group: String::new(),
            vm_name: String::new(),
            location: DEFAULT_LOCATION.to_owned(),
            vm_size: DEFAULT_VM_SIZE.to_owned(),
            admin_username: DEFAULT_ADMIN_USERNAME.to_owned(),
            admin_password: String::new(),
            os_type: OsType::Linux,
        }
    }
}

impl ProvisioningRequestBuilder {
    /// Creates a builder with default region, size, user, and OS.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the resource group.
    #[must_use]
    pub fn resource_group(mut self, value: impl Into<String>) -> Self {
        self.resource_group = value.into();
        self
    }

    /// Sets the VM name.
    #[must_use]
    pub fn vm_name(mut self, value: impl Into<String>) -> Self {
        self.vm_name = value.into();
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn location(mut self, value: impl Into<String>) -> Self {
        self.location = value.into();
        self
    }

    /// Sets the VM size.
    #[must_use]
    pub fn vm_size(mut self, value: impl Into<String>) -> Self {
        self.vm_size = value.into();
        self
    }

    /// Sets the administrator account name.
    #[must_use]
    pub fn admin_username(mut self, value: impl Into<String>) -> Self {
        self.admin_username = value.into();
        self
    }

    /// Sets the administrator password. Passwords are not trimmed.
    #[must_use]
    pub fn admin_password(mut self, value: impl Into<String>) -> Self {
        self.admin_password = value.into();
        self
    }

    /// Sets the guest operating system.
    #[must_use]
    pub const fn os_type(mut self, value: OsType) -> Self {
        self.os_type = value;
        self
    }

    /// Builds and validates the request.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when any field fails validation.
    pub fn build(self) -> Result<ProvisioningRequest, ValidationError> {
        let request = ProvisioningRequest {
            resource_group: self.resource_group.trim().to_owned(),
            vm_name: self.vm_name.trim().to_owned(),
            location: self.location.trim().to_owned(),
            vm_size: self.vm_size.trim().to_owned(),
            admin_username: self.admin_username.trim().to_owned(),
            admin_password: self.admin_password,
            os_type: self.os_type,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Checks that a value can be embedded in an Azure resource path.
///
/// # Errors
///
/// Returns [`ValidationError::MissingField`] for blank values and
/// [`ValidationError::InvalidName`] for values containing path separators,
/// whitespace, control characters, or exceeding the length limit.
pub fn validate_name(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_owned()));
    }
    if value.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::InvalidName {
            field: field.to_owned(),
            reason: format!("must be at most {MAX_NAME_LENGTH} characters"),
        });
    }
    if value
        .chars()
        .any(|ch| ch.is_whitespace() || ch.is_control() || matches!(ch, '/' | '\\' | '?' | '#'))
    {
        return Err(ValidationError::InvalidName {
            field: field.to_owned(),
            reason: String::from(
                "must not contain whitespace, control characters, or any of / \\ ? #",
            ),
        });
    }
    Ok(())
}

/// Applies the administrator password complexity policy: at least twelve
/// characters with an uppercase letter, a lowercase letter, a digit, and a
/// symbol.
///
/// # Errors
///
/// Returns [`ValidationError::MissingField`] for an empty password and
/// [`ValidationError::WeakPassword`] listing every unmet requirement
/// otherwise.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::MissingField(String::from(
            "admin_password",
        )));
    }

    let mut unmet = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        unmet.push("must be at least 12 characters");
    }
    if !password.chars().any(char::is_uppercase) {
        unmet.push("must include an uppercase letter");
    }
    if !password.chars().any(char::is_lowercase) {
        unmet.push("must include a lowercase letter");
    }
    if !password.chars().any(|ch| ch.is_ascii_digit()) {
        unmet.push("must include a digit");
    }
    if !password
        .chars()
        .any(|ch| !ch.is_alphanumeric() && !ch.is_whitespace())
    {
        unmet.push("must include a symbol");
    }

    if unmet.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::WeakPassword(unmet.join("; ")))
    }
}
