//! netst Core - shared types for the netst network diagnostics toolkit
//!
//! This crate provides the data model used by every other netst crate:
//! - Probe targets, vendor tags and credentials
//! - Probe outcomes, port states and run status
//! - Decoded discovery frames and neighbour records
//! - Reports returned by the diagnostics operations
//! - The vendor command table for active neighbour retrieval

pub mod frame;
pub mod neighbor;
pub mod ports;
pub mod probe;
pub mod report;
pub mod target;
pub mod vendor;

pub use frame::{format_mac, Capabilities, ChassisId, DiscoveryFrame, DiscoveryProtocol};
pub use neighbor::{Neighbor, NeighborKey, NeighborSummary};
pub use ports::{PortRange, PortRangeError};
pub use probe::{PortState, ProbeMetadata, ProbeResult, RunStatus};
pub use report::{ConnectivityReport, DiscoveryReport, ScanReport};
pub use target::{Credentials, Target, VendorTag};
pub use vendor::{ParserTag, VendorCommand, VendorCommandTable};
