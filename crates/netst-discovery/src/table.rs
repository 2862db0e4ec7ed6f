//! Neighbour table shared by passive capture and active retrieval

use netst_core::{DiscoveryFrame, Neighbor, NeighborKey};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Table handle shared between the discoverer and retrieval jobs
pub type SharedNeighborTable = Arc<RwLock<NeighborTable>>;

/// What an upsert did to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Refreshed,
    /// TTL 0: the neighbour announced it is going away
    Withdrawn,
}

/// Neighbours keyed by (local interface, chassis id)
#[derive(Debug, Default)]
pub struct NeighborTable {
    entries: BTreeMap<NeighborKey, Neighbor>,
    min_ttl: Option<Duration>,
}

impl NeighborTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedNeighborTable {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Insert or replace the neighbour a frame describes.
    ///
    /// A refresh replaces the stored frame wholesale. The last-seen time
    /// never moves backwards, even if `now` is older than the stored value.
    pub fn upsert(&mut self, local_interface: &str, frame: DiscoveryFrame, now: Instant) -> Upsert {
        let key = NeighborKey::new(local_interface, frame.chassis_id.clone());

        if frame.ttl.is_zero() {
            if self.entries.remove(&key).is_some() {
                info!(neighbor = %key, "Neighbour withdrawn");
            }
            return Upsert::Withdrawn;
        }

        self.min_ttl = Some(self.min_ttl.map_or(frame.ttl, |min| min.min(frame.ttl)));

        match self.entries.get_mut(&key) {
            Some(existing) => {
                let last_seen = existing.last_seen.max(now);
                *existing = Neighbor::new(local_interface, frame, last_seen);
                debug!(neighbor = %key, "Neighbour refreshed");
                Upsert::Refreshed
            }
            None => {
                info!(
                    neighbor = %key,
                    protocol = %frame.protocol,
                    system_name = frame.system_name.as_deref().unwrap_or("-"),
                    ttl_secs = frame.ttl.as_secs(),
                    "New neighbour"
                );
                self.entries
                    .insert(key, Neighbor::new(local_interface, frame, now));
                Upsert::Inserted
            }
        }
    }

    /// Remove neighbours whose TTL elapsed without a refresh
    pub fn expire(&mut self, now: Instant) -> Vec<NeighborKey> {
        let expired: Vec<NeighborKey> = self
            .entries
            .iter()
            .filter(|(_, n)| n.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.remove(key);
            info!(neighbor = %key, "Neighbour expired");
        }
        expired
    }

    /// Copy of all neighbours ordered by (interface, chassis)
    pub fn snapshot(&self) -> Vec<Neighbor> {
        self.entries.values().cloned().collect()
    }

    pub fn get(&self, key: &NeighborKey) -> Option<&Neighbor> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Smallest non-zero TTL seen since the table was created
    pub fn min_ttl(&self) -> Option<Duration> {
        self.min_ttl
    }

    /// Earliest instant at which some neighbour becomes stale
    pub fn next_expiry(&self) -> Option<Instant> {
        self.entries.values().map(Neighbor::expires_at).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netst_core::{ChassisId, DiscoveryProtocol};

    fn frame(chassis: &str, ttl: u64) -> DiscoveryFrame {
        DiscoveryFrame::new(
            DiscoveryProtocol::Lldp,
            ChassisId::Name(chassis.to_string()),
            "Gi0/1",
            Duration::from_secs(ttl),
        )
    }

    #[test]
    fn test_refresh_replaces_frame() {
        let mut table = NeighborTable::new();
        let t0 = Instant::now();

        assert_eq!(table.upsert("eth0", frame("sw1", 120), t0), Upsert::Inserted);

        let mut fresher = frame("sw1", 120);
        fresher.system_name = Some("sw1.lab".to_string());
        assert_eq!(
            table.upsert("eth0", fresher, t0 + Duration::from_secs(10)),
            Upsert::Refreshed
        );

        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].frame.system_name.as_deref(), Some("sw1.lab"));
        assert_eq!(snapshot[0].last_seen, t0 + Duration::from_secs(10));
    }

    #[test]
    fn test_last_seen_never_decreases() {
        let mut table = NeighborTable::new();
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(5);

        table.upsert("eth0", frame("sw1", 120), later);
        table.upsert("eth0", frame("sw1", 120), t0);
        table.upsert("eth0", frame("sw1", 120), later);

        let key = NeighborKey::new("eth0", ChassisId::Name("sw1".into()));
        assert_eq!(table.get(&key).unwrap().last_seen, later);
    }

    #[test]
    fn test_same_chassis_on_two_interfaces() {
        let mut table = NeighborTable::new();
        let now = Instant::now();
        table.upsert("eth1", frame("sw1", 120), now);
        table.upsert("eth0", frame("sw1", 120), now);
        table.upsert("eth0", frame("ap1", 120), now);

        let keys: Vec<String> = table.snapshot().iter().map(|n| n.key().to_string()).collect();
        assert_eq!(keys, vec!["eth0/ap1", "eth0/sw1", "eth1/sw1"]);
    }

    #[test]
    fn test_withdrawal_removes_neighbor() {
        let mut table = NeighborTable::new();
        let now = Instant::now();
        table.upsert("eth0", frame("sw1", 120), now);

        assert_eq!(table.upsert("eth0", frame("sw1", 0), now), Upsert::Withdrawn);
        assert!(table.is_empty());
        assert_eq!(table.min_ttl(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_expire_only_stale_entries() {
        let mut table = NeighborTable::new();
        let t0 = Instant::now();
        table.upsert("eth0", frame("short", 10), t0);
        table.upsert("eth0", frame("long", 120), t0);
        assert_eq!(table.min_ttl(), Some(Duration::from_secs(10)));
        assert_eq!(table.next_expiry(), Some(t0 + Duration::from_secs(10)));

        assert!(table.expire(t0 + Duration::from_secs(9)).is_empty());
        let expired = table.expire(t0 + Duration::from_secs(10));
        assert_eq!(expired, vec![NeighborKey::new("eth0", ChassisId::Name("short".into()))]);
        assert_eq!(table.len(), 1);
    }
}
