//! Probe targets, vendor tags and login credentials

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Network equipment vendor, selects the neighbour command set for active discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VendorTag {
    /// Cisco IOS / IOS-XE
    Cisco,
    /// Extreme Networks ExtremeXOS
    Extreme,
    /// Linux host running lldpd
    Linux,
}

impl Default for VendorTag {
    fn default() -> Self {
        Self::Cisco
    }
}

impl VendorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cisco => "cisco",
            Self::Extreme => "extreme",
            Self::Linux => "linux",
        }
    }
}

impl fmt::Display for VendorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VendorTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cisco" => Ok(Self::Cisco),
            "extreme" => Ok(Self::Extreme),
            "linux" => Ok(Self::Linux),
            other => Err(format!("unknown vendor '{}'", other)),
        }
    }
}

/// Remote endpoint of a probe
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Device address
    pub addr: IpAddr,
    /// Vendor of the device, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<VendorTag>,
}

impl Target {
    pub fn new(addr: IpAddr) -> Self {
        Self { addr, vendor: None }
    }

    pub fn with_vendor(addr: IpAddr, vendor: VendorTag) -> Self {
        Self {
            addr,
            vendor: Some(vendor),
        }
    }

    /// Vendor used for command lookup, falling back to the default vendor
    pub fn vendor_or_default(&self) -> VendorTag {
        self.vendor.unwrap_or_default()
    }

    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.addr, port)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vendor {
            Some(vendor) => write!(f, "{} ({})", self.addr, vendor),
            None => write!(f, "{}", self.addr),
        }
    }
}

impl FromStr for Target {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.trim().parse()?))
    }
}

/// Login credentials for a remote shell
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
