//! SSH implementation of [`RemoteShell`] on top of russh

use async_trait::async_trait;
use netst_core::Credentials;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::session::{RemoteShell, Session, SessionError};

/// Default time allowed for a single command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts any host key; network gear is routinely re-keyed and host key
/// pinning is left to the operator's SSH tooling.
struct DeviceHandler {
    addr: SocketAddr,
}

#[async_trait]
impl client::Handler for DeviceHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        trace!(
            addr = %self.addr,
            fingerprint = %server_public_key.fingerprint(),
            "Accepting host key"
        );
        Ok(true)
    }
}

fn map_russh_error(err: russh::Error) -> SessionError {
    match err {
        russh::Error::IO(io) => SessionError::ConnectFailed(io),
        other => SessionError::Protocol(other.to_string()),
    }
}

/// Password-authenticated SSH sessions to network devices
#[derive(Debug, Clone)]
pub struct SshShell {
    command_timeout: Duration,
}

impl Default for SshShell {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl SshShell {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }

    async fn handshake(
        addr: SocketAddr,
        credentials: &Credentials,
    ) -> Result<Handle<DeviceHandler>, SessionError> {
        let config = Arc::new(client::Config::default());
        let mut handle = client::connect(config, addr, DeviceHandler { addr })
            .await
            .map_err(map_russh_error)?;

        let accepted = handle
            .authenticate_password(credentials.username.clone(), credentials.password.clone())
            .await
            .map_err(map_russh_error)?;

        if !accepted {
            return Err(SessionError::AuthRejected(credentials.username.clone()));
        }
        Ok(handle)
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    type Session = SshSession;

    async fn connect(
        &self,
        addr: SocketAddr,
        credentials: &Credentials,
        limit: Duration,
    ) -> Result<SshSession, SessionError> {
        debug!(addr = %addr, user = %credentials.username, "Opening SSH session");

        let handle = timeout(limit, Self::handshake(addr, credentials))
            .await
            .map_err(|_| SessionError::Timeout(limit))??;

        debug!(addr = %addr, "SSH session authenticated");
        Ok(SshSession {
            handle,
            addr,
            command_timeout: self.command_timeout,
        })
    }
}

/// An authenticated SSH connection; each command runs on its own channel
pub struct SshSession {
    handle: Handle<DeviceHandler>,
    addr: SocketAddr,
    command_timeout: Duration,
}

impl SshSession {
    async fn run(&mut self, command: &str) -> Result<String, SessionError> {
        let exec_failed = |reason: String| SessionError::ExecFailed {
            command: command.to_string(),
            reason,
        };

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| exec_failed(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| exec_failed(e.to_string()))?;

        let mut output = Vec::new();
        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, .. } => output.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                _ => {}
            }
        }

        trace!(
            addr = %self.addr,
            command = command,
            bytes = output.len(),
            exit_status = ?exit_status,
            "Command finished"
        );

        match exit_status {
            Some(status) if status != 0 && output.is_empty() => {
                Err(exec_failed(format!("exit status {}", status)))
            }
            _ => Ok(String::from_utf8_lossy(&output).into_owned()),
        }
    }
}

#[async_trait]
impl Session for SshSession {
    async fn execute(&mut self, command: &str) -> Result<String, SessionError> {
        let limit = self.command_timeout;
        timeout(limit, self.run(command))
            .await
            .map_err(|_| SessionError::Timeout(limit))?
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        debug!(addr = %self.addr, "Closing SSH session");
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(map_russh_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_errors_map_to_connect_failed() {
        let err = russh::Error::IO(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        match map_russh_error(err) {
            SessionError::ConnectFailed(io) => {
                assert_eq!(io.kind(), io::ErrorKind::ConnectionRefused)
            }
            other => panic!("unexpected mapping: {:?}", other),
        }
    }

    #[test]
    fn test_other_errors_map_to_protocol() {
        let err = russh::Error::Disconnect;
        assert!(matches!(map_russh_error(err), SessionError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_connect_refused_port() {
        // Bind then drop a listener so the port is almost certainly closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let shell = SshShell::default();
        let creds = Credentials::new("admin", "admin");
        let result = shell.connect(addr, &creds, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(SessionError::ConnectFailed(_))));
    }
}
