//! netst Shell - remote shell sessions to network devices
//!
//! This crate defines the narrow [`RemoteShell`]/[`Session`] capability the
//! rest of netst is written against, and an SSH implementation of it.

pub mod session;
pub mod ssh;

pub use session::{RemoteShell, Session, SessionError};
pub use ssh::SshShell;
