//! netst Discovery - directly connected neighbours over LLDP and CDP
//!
//! This crate provides two discovery methods:
//! - Passive capture of LLDP/CDP frames from a local interface
//! - Active retrieval of a device's neighbour table over a remote shell
//!
//! Both feed one [`NeighborTable`] whose entries expire with their TTL.

pub mod capture;
pub mod codec;
pub mod discoverer;
pub mod table;
pub mod text;

pub use capture::{CaptureError, PnetCapture, RawInterfaceCapture};
pub use codec::{decode, detect, encode, DecodeError, EncodeError};
pub use discoverer::{
    DiscoveryConfig, DiscoveryError, DiscoveryState, ListenSummary, NeighborDiscoverer,
    RemoteRetriever, StopReason, DEFAULT_READ_TIMEOUT,
};
pub use table::{NeighborTable, SharedNeighborTable, Upsert};
pub use text::{ParsedNeighbor, TextError};
