//! Decoded neighbour advertisements
//!
//! A [`DiscoveryFrame`] has the same shape whether it came from an LLDP or a
//! CDP frame on the wire, or from a device's CLI output. Downstream code never
//! needs to know which protocol produced it.

use serde::{Serialize, Serializer};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Link-layer discovery protocol that produced a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryProtocol {
    /// IEEE 802.1AB Link Layer Discovery Protocol
    Lldp,
    /// Cisco Discovery Protocol
    Cdp,
}

impl fmt::Display for DiscoveryProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lldp => f.write_str("LLDP"),
            Self::Cdp => f.write_str("CDP"),
        }
    }
}

/// Stable identifier of a neighbouring chassis
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChassisId {
    /// MAC address (LLDP chassis subtype 4)
    Mac([u8; 6]),
    /// Any textual identifier (CDP device ID, LLDP locally assigned, ...)
    Name(String),
}

impl ChassisId {
    /// Parse a MAC in colon, dash or Cisco dotted (`0011.2233.4455`) notation
    pub fn parse_mac(s: &str) -> Option<[u8; 6]> {
        let digits: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.'))
            .collect();
        if digits.len() != 12 {
            return None;
        }
        let bytes = hex::decode(digits).ok()?;
        bytes.try_into().ok()
    }

    /// Build an identifier from CLI text, preferring the MAC form when it parses
    pub fn from_text(s: &str) -> Self {
        match Self::parse_mac(s) {
            Some(mac) => Self::Mac(mac),
            None => Self::Name(s.trim().to_string()),
        }
    }
}

/// Format a MAC as lowercase colon-separated hex
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

impl fmt::Display for ChassisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mac(mac) => f.write_str(&format_mac(mac)),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl Serialize for ChassisId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Advertised system capabilities.
///
/// Bit positions follow the LLDP system capabilities TLV; CDP capability
/// bits are mapped onto the nearest LLDP capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u16);

impl Capabilities {
    pub const OTHER: Self = Self(1 << 0);
    pub const REPEATER: Self = Self(1 << 1);
    pub const BRIDGE: Self = Self(1 << 2);
    pub const WLAN_AP: Self = Self(1 << 3);
    pub const ROUTER: Self = Self(1 << 4);
    pub const TELEPHONE: Self = Self(1 << 5);
    pub const DOCSIS: Self = Self(1 << 6);
    pub const STATION: Self = Self(1 << 7);

    const NAMED: [(Self, &'static str, char); 8] = [
        (Self::OTHER, "other", 'O'),
        (Self::REPEATER, "repeater", 'P'),
        (Self::BRIDGE, "bridge", 'B'),
        (Self::WLAN_AP, "wlan-ap", 'W'),
        (Self::ROUTER, "router", 'R'),
        (Self::TELEPHONE, "telephone", 'T'),
        (Self::DOCSIS, "docsis", 'C'),
        (Self::STATION, "station", 'S'),
    ];

    // CDP bit -> capability. Transparent and source-route bridges, and
    // switches, all collapse onto BRIDGE.
    const CDP_BITS: [(u32, Self); 7] = [
        (0x01, Self::ROUTER),
        (0x02, Self::BRIDGE),
        (0x04, Self::BRIDGE),
        (0x08, Self::BRIDGE),
        (0x10, Self::STATION),
        (0x40, Self::REPEATER),
        (0x80, Self::TELEPHONE),
    ];

    // Capability -> the CDP bit written for it
    const CDP_ENCODE: [(Self, u32); 5] = [
        (Self::ROUTER, 0x01),
        (Self::BRIDGE, 0x08),
        (Self::STATION, 0x10),
        (Self::REPEATER, 0x40),
        (Self::TELEPHONE, 0x80),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u16 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn from_cdp_bits(bits: u32) -> Self {
        Self::CDP_BITS
            .iter()
            .filter(|(bit, _)| bits & bit != 0)
            .fold(Self::empty(), |acc, (_, cap)| acc | *cap)
    }

    /// CDP capability bits, or `None` when a capability has no CDP bit
    /// (other, WLAN access point, DOCSIS and the reserved LLDP bits)
    pub fn to_cdp_bits(&self) -> Option<u32> {
        let mut bits = 0;
        let mut covered = Self::empty();
        for (cap, bit) in Self::CDP_ENCODE {
            if self.contains(cap) {
                bits |= bit;
                covered = covered | cap;
            }
        }
        (covered == *self).then_some(bits)
    }

    /// Parse Cisco single-letter capability codes, e.g. `B,R` from
    /// `show lldp neighbors detail`
    pub fn from_cisco_codes(s: &str) -> Self {
        s.split(|c: char| c == ',' || c.is_whitespace())
            .filter_map(|code| {
                let mut chars = code.trim().chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Self::NAMED
                        .iter()
                        .find(|(_, _, letter)| *letter == c.to_ascii_uppercase())
                        .map(|(cap, _, _)| *cap),
                    _ => None,
                }
            })
            .fold(Self::empty(), |acc, cap| acc | cap)
    }

    /// Parse CDP capability words, e.g. `Router Switch IGMP` from
    /// `show cdp neighbors detail`
    pub fn from_cdp_words(s: &str) -> Self {
        s.split_whitespace()
            .filter_map(|word| match word.to_lowercase().as_str() {
                "router" => Some(Self::ROUTER),
                "switch" | "trans-bridge" | "source-route-bridge" => Some(Self::BRIDGE),
                "host" => Some(Self::STATION),
                "repeater" => Some(Self::REPEATER),
                "phone" => Some(Self::TELEPHONE),
                _ => None,
            })
            .fold(Self::empty(), |acc, cap| acc | cap)
    }

    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(cap, _, _)| self.contains(*cap))
            .map(|(_, name, _)| *name)
            .collect()
    }
}

impl std::ops::BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(","))
    }
}

impl Serialize for Capabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.names())
    }
}

/// One decoded neighbour advertisement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryFrame {
    pub protocol: DiscoveryProtocol,
    pub chassis_id: ChassisId,
    /// Remote port the advertisement was sent from
    pub port_id: String,
    pub system_name: Option<String>,
    pub system_description: Option<String>,
    /// Hardware platform (CDP only)
    pub platform: Option<String>,
    pub capabilities: Capabilities,
    pub management_address: Option<IpAddr>,
    /// Advertised hold time, normalised from the protocol's wire unit
    #[serde(rename = "ttl_secs", serialize_with = "serialize_secs")]
    pub ttl: Duration,
}

fn serialize_secs<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(ttl.as_secs())
}

impl DiscoveryFrame {
    /// Minimal frame carrying only the mandatory fields
    pub fn new(
        protocol: DiscoveryProtocol,
        chassis_id: ChassisId,
        port_id: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            protocol,
            chassis_id,
            port_id: port_id.into(),
            system_name: None,
            system_description: None,
            platform: None,
            capabilities: Capabilities::empty(),
            management_address: None,
            ttl,
        }
    }

    /// Host name to show for this neighbour, falling back to the chassis ID
    pub fn hostname(&self) -> String {
        self.system_name
            .clone()
            .unwrap_or_else(|| self.chassis_id.to_string())
    }
}
