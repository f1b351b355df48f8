//! Server self-description returned by the capability probe.

use serde::{Deserialize, Serialize};

/// Unauthenticated server description (`/System/Info/Public`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PublicSystemInfo {
    /// Display name chosen by the server owner.
    pub server_name: String,
    /// Stable server-assigned identifier.
    pub id: String,
    /// LAN address the server advertises for itself.
    pub local_address: Option<String>,
    /// WAN address the server advertises for itself.
    pub wan_address: Option<String>,
    /// Server software version.
    pub version: Option<String>,
}

/// Full server description (`/System/Info`), only returned to authenticated callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SystemInfo {
    #[serde(flatten)]
    pub public: PublicSystemInfo,
    /// MAC address of the server's primary interface, used for Wake-on-LAN.
    pub mac_address: Option<String>,
    pub operating_system: Option<String>,
    pub has_pending_restart: bool,
}

/// Outcome of a successful probe: either the public or the full description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbedInfo {
    Public(PublicSystemInfo),
    Full(SystemInfo),
}

impl ProbedInfo {
    /// Returns the public part, present in both variants.
    #[must_use]
    pub fn public(&self) -> &PublicSystemInfo {
        match self {
            Self::Public(info) => info,
            Self::Full(info) => &info.public,
        }
    }

    /// Returns the full description if the probe was authenticated.
    #[must_use]
    pub fn full(&self) -> Option<&SystemInfo> {
        match self {
            Self::Public(_) => None,
            Self::Full(info) => Some(info),
        }
    }
}

impl From<PublicSystemInfo> for ProbedInfo {
    fn from(info: PublicSystemInfo) -> Self {
        Self::Public(info)
    }
}

impl From<SystemInfo> for ProbedInfo {
    fn from(info: SystemInfo) -> Self {
        Self::Full(info)
    }
}
