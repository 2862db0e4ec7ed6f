//! Remote-login reachability checks

use netst_core::{ConnectivityReport, Credentials, ProbeMetadata, ProbeResult, Target};
use netst_shell::{RemoteShell, Session, SessionError};
use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::scheduler::{is_resource_exhaustion, JobError, ProbeScheduler};

/// Default remote shell port
pub const DEFAULT_SHELL_PORT: u16 = 22;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("no targets given")]
    NoTargets,
    #[error("remote shell port must be non-zero")]
    InvalidPort,
}

/// Map a session failure onto a probe result.
///
/// Descriptor or memory exhaustion is returned as a fatal [`JobError`].
pub fn classify_session_error(err: &SessionError) -> Result<ProbeResult, JobError> {
    match err {
        SessionError::AuthRejected(_) => Ok(ProbeResult::AuthFailure),
        SessionError::Timeout(_) => Ok(ProbeResult::Timeout),
        SessionError::ConnectFailed(io_err) if is_resource_exhaustion(io_err) => {
            Err(JobError::ResourceExhausted(io_err.to_string()))
        }
        SessionError::ConnectFailed(io_err) => match io_err.kind() {
            io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
                Ok(ProbeResult::Refused)
            }
            io::ErrorKind::TimedOut => Ok(ProbeResult::Timeout),
            _ => Ok(ProbeResult::ProtocolError(err.to_string())),
        },
        other => Ok(ProbeResult::ProtocolError(other.to_string())),
    }
}

/// Checks whether targets accept a remote-login session
pub struct ConnectivityChecker<S> {
    shell: Arc<S>,
    scheduler: ProbeScheduler,
    port: u16,
}

impl<S: RemoteShell> ConnectivityChecker<S> {
    pub fn new(shell: S, scheduler: ProbeScheduler) -> Self {
        Self {
            shell: Arc::new(shell),
            scheduler,
            port: DEFAULT_SHELL_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Attempt a session with every target; one result per distinct target
    pub async fn check(
        &self,
        targets: &[Target],
        credentials: &Credentials,
    ) -> Result<ConnectivityReport, CheckError> {
        if targets.is_empty() {
            return Err(CheckError::NoTargets);
        }
        if self.port == 0 {
            return Err(CheckError::InvalidPort);
        }

        let targets: Vec<Target> = targets.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        info!(targets = targets.len(), port = self.port, "Checking connectivity");

        let credentials = Arc::new(credentials.clone());
        let jobs: Vec<_> = targets
            .iter()
            .map(|target| {
                let shell = Arc::clone(&self.shell);
                let credentials = Arc::clone(&credentials);
                let addr = target.socket_addr(self.port);
                let limit = self.scheduler.timeout();
                async move {
                    let started = Instant::now();
                    match shell.connect(addr, &credentials, limit).await {
                        Ok(mut session) => {
                            let mut meta = ProbeMetadata::new(started.elapsed());
                            if let Some(name) = session.remote_name() {
                                meta = meta.with_detail(name);
                            }
                            if let Err(e) = session.close().await {
                                debug!(addr = %addr, error = %e, "Session close failed");
                            }
                            Ok(ProbeResult::Success(meta))
                        }
                        Err(e) => {
                            debug!(addr = %addr, error = %e, "Session failed");
                            classify_session_error(&e)
                        }
                    }
                }
            })
            .collect();

        let run = self.scheduler.run(jobs).await;
        let status = run.status();
        let results = targets
            .into_iter()
            .zip(run.outcomes)
            .filter_map(|(target, outcome)| outcome.map(|result| (target, result)))
            .collect();

        let report = ConnectivityReport { results, status };
        info!(
            reachable = report.reachable(),
            total = report.results.len(),
            status = %report.status,
            "Connectivity check finished"
        );
        Ok(report)
    }
}
