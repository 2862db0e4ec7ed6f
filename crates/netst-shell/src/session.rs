//! Remote shell capability consumed by the probing and discovery code

use async_trait::async_trait;
use netst_core::Credentials;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    ConnectFailed(#[from] std::io::Error),
    #[error("authentication rejected for user {0}")]
    AuthRejected(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("command '{command}' failed: {reason}")]
    ExecFailed { command: String, reason: String },
}

/// Opens authenticated sessions to remote devices
#[async_trait]
pub trait RemoteShell: Send + Sync + 'static {
    type Session: Session;

    /// Connect and authenticate, giving up after `timeout`
    async fn connect(
        &self,
        addr: SocketAddr,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Self::Session, SessionError>;
}

/// An authenticated shell session.
///
/// Dropping a session releases its transport; `close` additionally says
/// goodbye to the remote end.
#[async_trait]
pub trait Session: Send + 'static {
    /// Run one command and return its output
    async fn execute(&mut self, command: &str) -> Result<String, SessionError>;

    /// Close the session
    async fn close(&mut self) -> Result<(), SessionError>;

    /// Prompt or host name reported by the device, if known
    fn remote_name(&self) -> Option<&str> {
        None
    }
}
