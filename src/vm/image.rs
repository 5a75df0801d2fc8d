//! Marketplace image references for the supported guest operating systems.

use serde::Serialize;

use crate::request::OsType;

/// Marketplace image reference embedded in the VM storage profile.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct ImageReference {
    /// Image publisher.
    pub publisher: &'static str,
    /// Image offer.
    pub offer: &'static str,
    /// Image SKU.
    pub sku: &'static str,
    /// Image version.
    pub version: &'static str,
}

impl ImageReference {
    /// Ubuntu Server 22.04 LTS (Gen2).
    pub const UBUNTU_2204: Self = Self {
        publisher: "Canonical",
        offer: "0001-com-ubuntu-server-jammy",
        sku: "22_04-lts-gen2",
        version: "latest",
    };

    /// Windows Server 2022 Datacenter Azure Edition.
    pub const WINDOWS_SERVER_2022: Self = Self {
        publisher: "MicrosoftWindowsServer",
        offer: "WindowsServer",
        sku: "2022-datacenter-azure-edition",
        version: "latest",
    };

    /// Returns the fixed image for `os_type`.
    #[must_use]
    pub const fn for_os(os_type: OsType) -> Self {
        match os_type {
            OsType::Linux => Self::UBUNTU_2204,
            OsType::Windows => Self::WINDOWS_SERVER_2022,
        }
    }
}
