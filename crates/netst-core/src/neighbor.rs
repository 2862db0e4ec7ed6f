//! Neighbour records kept by the discovery table

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use crate::frame::{ChassisId, DiscoveryFrame};

/// Identity of a neighbour: the local interface it was heard on plus its chassis
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NeighborKey {
    pub local_interface: String,
    pub chassis_id: ChassisId,
}

impl NeighborKey {
    pub fn new(local_interface: impl Into<String>, chassis_id: ChassisId) -> Self {
        Self {
            local_interface: local_interface.into(),
            chassis_id,
        }
    }
}

impl std::fmt::Display for NeighborKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.local_interface, self.chassis_id)
    }
}

/// One remote device as seen on one local interface
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub local_interface: String,
    /// Most recent advertisement; replaces the previous one on refresh
    pub frame: DiscoveryFrame,
    /// Wall-clock time of the last refresh
    pub updated_at: DateTime<Utc>,
    /// Monotonic time of the last refresh
    #[serde(skip)]
    pub last_seen: Instant,
}

impl Neighbor {
    pub fn new(local_interface: impl Into<String>, frame: DiscoveryFrame, now: Instant) -> Self {
        Self {
            local_interface: local_interface.into(),
            frame,
            updated_at: Utc::now(),
            last_seen: now,
        }
    }

    pub fn key(&self) -> NeighborKey {
        NeighborKey::new(self.local_interface.clone(), self.frame.chassis_id.clone())
    }

    /// Instant after which the neighbour is stale
    pub fn expires_at(&self) -> Instant {
        self.last_seen + self.frame.ttl
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at()
    }

    /// Time left before expiry, zero once expired
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at().saturating_duration_since(now)
    }

    pub fn summary(&self) -> NeighborSummary {
        NeighborSummary {
            hostname: self.frame.hostname(),
            management_address: self.frame.management_address,
        }
    }
}

/// Protocol-agnostic view of a neighbour: a device heard over both CDP and
/// LLDP collapses into one summary
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NeighborSummary {
    pub hostname: String,
    pub management_address: Option<IpAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::DiscoveryProtocol;

    fn frame(ttl: u64) -> DiscoveryFrame {
        DiscoveryFrame::new(
            DiscoveryProtocol::Cdp,
            ChassisId::Name("edge-sw1".to_string()),
            "GigabitEthernet0/1",
            Duration::from_secs(ttl),
        )
    }

    #[test]
    fn test_expiry() {
        let now = Instant::now();
        let neighbor = Neighbor::new("eth0", frame(10), now);
        assert!(!neighbor.is_expired(now + Duration::from_secs(9)));
        assert!(neighbor.is_expired(now + Duration::from_secs(10)));
        assert_eq!(neighbor.remaining(now + Duration::from_secs(4)), Duration::from_secs(6));
        assert_eq!(neighbor.remaining(now + Duration::from_secs(40)), Duration::ZERO);
    }

    #[test]
    fn test_key_and_summary() {
        let neighbor = Neighbor::new("eth0", frame(10), Instant::now());
        assert_eq!(neighbor.key().to_string(), "eth0/edge-sw1");
        let summary = neighbor.summary();
        assert_eq!(summary.hostname, "edge-sw1");
        assert_eq!(summary.management_address, None);
    }
}
