//! Reports returned to callers of the diagnostics operations

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

use crate::neighbor::{Neighbor, NeighborSummary};
use crate::probe::{PortState, ProbeResult, RunStatus};
use crate::target::Target;

#[derive(Serialize)]
struct TargetOutcome<'a> {
    target: &'a Target,
    result: &'a ProbeResult,
}

// JSON object keys must be strings, so per-target maps serialise as a list.
fn as_entries<S: Serializer>(
    map: &BTreeMap<Target, ProbeResult>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(
        map.iter()
            .map(|(target, result)| TargetOutcome { target, result }),
    )
}

/// Remote-login reachability per target
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ConnectivityReport {
    #[serde(serialize_with = "as_entries")]
    pub results: BTreeMap<Target, ProbeResult>,
    pub status: RunStatus,
}

impl ConnectivityReport {
    pub fn get(&self, target: &Target) -> Option<&ProbeResult> {
        self.results.get(target)
    }

    pub fn reachable(&self) -> usize {
        self.results.values().filter(|r| r.is_success()).count()
    }
}

/// Port classification for one target, ordered by port
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub target: Target,
    pub ports: Vec<(u16, PortState)>,
    pub status: RunStatus,
}

impl ScanReport {
    pub fn empty(target: Target) -> Self {
        Self {
            target,
            ports: Vec::new(),
            status: RunStatus::Completed,
        }
    }

    pub fn open_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.ports
            .iter()
            .filter(|(_, state)| *state == PortState::Open)
            .map(|(port, _)| *port)
    }
}

/// Neighbours known at the end of a discovery run
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DiscoveryReport {
    /// Ordered by (local interface, chassis identifier)
    pub neighbors: Vec<Neighbor>,
    /// Per-device outcome of active retrieval; empty for passive capture
    #[serde(serialize_with = "as_entries", skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: BTreeMap<Target, ProbeResult>,
    pub status: RunStatus,
}

impl DiscoveryReport {
    /// Distinct (hostname, management address) pairs across protocols
    pub fn unique_neighbors(&self) -> Vec<NeighborSummary> {
        self.neighbors
            .iter()
            .map(Neighbor::summary)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
