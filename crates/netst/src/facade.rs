//! Diagnostics operations exposed by the command line

use anyhow::{Context, Result};
use netst_core::{ConnectivityReport, Credentials, DiscoveryReport, RunStatus, ScanReport, Target};
use netst_discovery::{NeighborDiscoverer, RawInterfaceCapture, RemoteRetriever, StopReason};
use netst_probe::{CancelToken, ConnectivityChecker, PortScanner, ProbeScheduler, TcpConnector, TokioConnector};
use netst_shell::{RemoteShell, SshShell};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Config;

/// Builds checkers, scanners and discoverers from one configuration.
///
/// Every operation is tied to the same cancel token.
pub struct DiagnosticsFacade<S = SshShell, C = TokioConnector> {
    config: Config,
    shell: S,
    connector: C,
    cancel: CancelToken,
}

impl DiagnosticsFacade<SshShell, TokioConnector> {
    /// SSH sessions and plain TCP connects
    pub fn ssh(config: Config, cancel: CancelToken) -> Self {
        let shell = SshShell::new(config.command_timeout());
        Self::new(config, shell, TokioConnector, cancel)
    }
}

impl<S, C> DiagnosticsFacade<S, C>
where
    S: RemoteShell + Clone,
    C: TcpConnector + Clone,
{
    pub fn new(config: Config, shell: S, connector: C, cancel: CancelToken) -> Self {
        Self {
            config,
            shell,
            connector,
            cancel,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn scheduler(&self) -> Result<ProbeScheduler> {
        Ok(self.config.to_scheduler()?.with_cancel(self.cancel.clone()))
    }

    /// Remote-login reachability of every target
    pub async fn connect_test(&self, targets: &[Target], credentials: &Credentials) -> Result<ConnectivityReport> {
        let checker = ConnectivityChecker::new(self.shell.clone(), self.scheduler()?)
            .with_port(self.config.shell.port);
        let report = checker
            .check(targets, credentials)
            .await
            .context("connectivity check rejected")?;
        Ok(report)
    }

    /// Classify `ports` on `target`
    pub async fn scan(&self, target: &Target, ports: &[u16]) -> Result<ScanReport> {
        let scanner = PortScanner::with_connector(self.connector.clone(), self.scheduler()?);
        let report = scanner.scan(target, ports).await.context("port scan rejected")?;
        Ok(report)
    }

    /// Listen for LLDP/CDP on `capture` for `duration`, or until cancelled
    /// when `duration` is `None`
    pub async fn discover_passive<R: RawInterfaceCapture + ?Sized>(
        &self,
        capture: &mut R,
        duration: Option<Duration>,
    ) -> Result<DiscoveryReport> {
        let discoverer = NeighborDiscoverer::new(self.config.to_discovery_config());
        let summary = discoverer
            .listen(capture, duration, self.cancel.clone())
            .await
            .context("passive discovery failed")?;

        // Nothing was left unattempted when listening stops early
        let status = match summary.stop_reason {
            StopReason::Cancelled => RunStatus::Cancelled { skipped: 0 },
            StopReason::EndOfStream | StopReason::DurationElapsed => RunStatus::Completed,
        };

        discoverer.sweep().await;
        let report = discoverer.report(status).await;
        info!(
            interface = capture.interface_name(),
            neighbors = report.neighbors.len(),
            decoded = summary.frames_decoded,
            errors = summary.decode_errors,
            "Passive discovery finished"
        );
        Ok(report)
    }

    /// Ask each target for its neighbour table over SSH
    pub async fn discover_active(&self, targets: &[Target], credentials: &Credentials) -> Result<DiscoveryReport> {
        let commands = self.config.vendor_table();

        // A device job covers the login plus every command for its vendor
        let per_device = commands
            .vendors()
            .filter_map(|vendor| commands.commands(vendor).map(<[_]>::len))
            .max()
            .unwrap_or(0) as u32;
        let timeout = self.config.probe_timeout() + self.config.command_timeout() * per_device;
        let scheduler = ProbeScheduler::new(self.config.probe.max_concurrency, timeout)?
            .with_cancel(self.cancel.clone());

        let retriever = RemoteRetriever::new(
            Arc::new(self.shell.clone()),
            commands,
            scheduler,
            self.config.shell.port,
        )
        .with_connect_timeout(self.config.probe_timeout());
        let discoverer = NeighborDiscoverer::default();
        let report = discoverer
            .retrieve(&retriever, targets, credentials)
            .await
            .context("active discovery rejected")?;
        Ok(report)
    }
}
