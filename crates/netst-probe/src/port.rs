//! TCP port scanning

use async_trait::async_trait;
use netst_core::{PortRange, PortRangeError, PortState, ProbeMetadata, ProbeResult, ScanReport, Target};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::scheduler::{JobError, ProbeScheduler};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("invalid port list: {0}")]
    InvalidPorts(#[from] PortRangeError),
}

/// Opens (and immediately drops) a TCP connection
#[async_trait]
pub trait TcpConnector: Send + Sync + 'static {
    async fn connect(&self, addr: SocketAddr) -> io::Result<()>;
}

/// Plain tokio TCP connect
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioConnector;

#[async_trait]
impl TcpConnector for TokioConnector {
    async fn connect(&self, addr: SocketAddr) -> io::Result<()> {
        let stream = TcpStream::connect(addr).await?;
        drop(stream);
        Ok(())
    }
}

/// Map a connect outcome onto a probe result.
///
/// A reset during the handshake counts as refused, so the port is `Closed`.
fn classify_connect(outcome: io::Result<()>, started: Instant) -> Result<ProbeResult, JobError> {
    match outcome {
        Ok(()) => Ok(ProbeResult::Success(ProbeMetadata::new(started.elapsed()))),
        Err(e) => match e.kind() {
            io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
                Ok(ProbeResult::Refused)
            }
            io::ErrorKind::TimedOut => Ok(ProbeResult::Timeout),
            _ => Err(JobError::from_io(&e)),
        },
    }
}

/// Classifies ports on one target as open, closed or filtered
pub struct PortScanner<C = TokioConnector> {
    connector: Arc<C>,
    scheduler: ProbeScheduler,
}

impl PortScanner<TokioConnector> {
    pub fn new(scheduler: ProbeScheduler) -> Self {
        Self::with_connector(TokioConnector, scheduler)
    }
}

impl<C: TcpConnector> PortScanner<C> {
    pub fn with_connector(connector: C, scheduler: ProbeScheduler) -> Self {
        Self {
            connector: Arc::new(connector),
            scheduler,
        }
    }

    /// Scan `ports` on `target`; results are ascending by port
    pub async fn scan(&self, target: &Target, ports: &[u16]) -> Result<ScanReport, ScanError> {
        let ports = PortRange::from_ports(ports.iter().copied())?.into_vec();
        if ports.is_empty() {
            return Ok(ScanReport::empty(target.clone()));
        }

        info!(target = %target, ports = ports.len(), "Starting port scan");

        // One job per port, built in ascending port order
        let jobs: Vec<_> = ports
            .iter()
            .map(|&port| {
                let connector = Arc::clone(&self.connector);
                let addr = target.socket_addr(port);
                async move {
                    let started = Instant::now();
                    classify_connect(connector.connect(addr).await, started)
                }
            })
            .collect();

        let run = self.scheduler.run(jobs).await;
        let status = run.status();

        let classified: Vec<(u16, PortState)> = ports
            .into_iter()
            .zip(run.outcomes)
            .filter_map(|(port, outcome)| {
                let state = PortState::from_probe(outcome.as_ref()?)?;
                debug!(target = %target, port = port, state = %state, "Port classified");
                Some((port, state))
            })
            .collect();

        info!(
            target = %target,
            open = classified.iter().filter(|(_, s)| *s == PortState::Open).count(),
            status = %status,
            "Port scan finished"
        );

        Ok(ScanReport {
            target: target.clone(),
            ports: classified,
            status,
        })
    }
}
