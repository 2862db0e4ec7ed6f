//! Neighbour discovery: passive capture and active retrieval
//!
//! Passive capture is a single task reading frames with a timeout. It moves
//! through `Idle -> Listening -> (Decoding -> Listening)* -> Stopped` and
//! runs the expiry sweep itself between reads, so discovery adds no
//! concurrent work of its own.
//!
//! Active retrieval asks devices for their neighbour tables over a remote
//! shell, one scheduler job per device.

use netst_core::{
    Credentials, DiscoveryReport, Neighbor, ProbeMetadata, ProbeResult, RunStatus, Target,
    VendorCommand, VendorCommandTable, VendorTag,
};
use netst_probe::{classify_session_error, CancelToken, ProbeScheduler, DEFAULT_TIMEOUT};
use netst_shell::{RemoteShell, Session};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::capture::{CaptureError, RawInterfaceCapture};
use crate::codec;
use crate::table::{NeighborTable, SharedNeighborTable, Upsert};
use crate::text::{self, TextError};

/// Sweep interval when neither configuration nor any TTL gives one
const FALLBACK_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
/// Lower bound for the sweep interval
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
/// Default wait for one frame before the loop checks its timers
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("discovery cannot start from state {0}")]
    NotIdle(DiscoveryState),
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("no targets given")]
    NoTargets,
    #[error("no neighbour commands configured for vendor {0}")]
    UnsupportedVendor(VendorTag),
}

/// Passive capture state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryState {
    Idle,
    Listening,
    Decoding,
    /// Terminal
    Stopped,
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Listening => f.write_str("listening"),
            Self::Decoding => f.write_str("decoding"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Why a listening session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Cancelled,
    EndOfStream,
    DurationElapsed,
}

/// Counters from one listening session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenSummary {
    pub frames_decoded: usize,
    pub decode_errors: usize,
    pub frames_ignored: usize,
    pub neighbors_expired: usize,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Longest single wait for a frame
    pub read_timeout: Duration,
    /// Fixed sweep interval; `None` follows the smallest TTL seen
    pub sweep_interval: Option<Duration>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            sweep_interval: None,
        }
    }
}

/// Owns the neighbour table and runs discovery against it
pub struct NeighborDiscoverer {
    table: SharedNeighborTable,
    state: watch::Sender<DiscoveryState>,
    config: DiscoveryConfig,
}

impl Default for NeighborDiscoverer {
    fn default() -> Self {
        Self::new(DiscoveryConfig::default())
    }
}

impl NeighborDiscoverer {
    pub fn new(config: DiscoveryConfig) -> Self {
        let (state, _) = watch::channel(DiscoveryState::Idle);
        Self {
            table: NeighborTable::shared(),
            state,
            config,
        }
    }

    pub fn state(&self) -> DiscoveryState {
        *self.state.borrow()
    }

    /// Follow state transitions of the passive loop
    pub fn subscribe_state(&self) -> watch::Receiver<DiscoveryState> {
        self.state.subscribe()
    }

    pub fn table(&self) -> SharedNeighborTable {
        Arc::clone(&self.table)
    }

    /// Consistent copy of the table ordered by (interface, chassis)
    pub async fn snapshot(&self) -> Vec<Neighbor> {
        self.table.read().await.snapshot()
    }

    /// Drop neighbours whose TTL has elapsed; returns how many went
    pub async fn sweep(&self) -> usize {
        let now = Instant::now().into_std();
        self.table.write().await.expire(now).len()
    }

    fn set_state(&self, state: DiscoveryState) {
        self.state.send_replace(state);
    }

    async fn sweep_interval(&self) -> Duration {
        let interval = match self.config.sweep_interval {
            Some(interval) => interval,
            None => self
                .table
                .read()
                .await
                .min_ttl()
                .unwrap_or(FALLBACK_SWEEP_INTERVAL),
        };
        interval.max(MIN_SWEEP_INTERVAL)
    }

    /// Listen on `capture` until cancelled, the capture closes, or `limit`
    /// elapses.
    ///
    /// Can run once per discoverer; `Stopped` is terminal.
    pub async fn listen<C: RawInterfaceCapture + ?Sized>(
        &self,
        capture: &mut C,
        limit: Option<Duration>,
        mut cancel: CancelToken,
    ) -> Result<ListenSummary, DiscoveryError> {
        let current = self.state();
        if current != DiscoveryState::Idle {
            return Err(DiscoveryError::NotIdle(current));
        }
        self.set_state(DiscoveryState::Listening);

        let interface = capture.interface_name().to_string();
        info!(interface = %interface, limit_secs = ?limit.map(|d| d.as_secs()), "Listening for LLDP/CDP");

        let deadline = limit.map(|d| Instant::now() + d);
        let mut next_sweep = Instant::now() + self.sweep_interval().await;
        let mut summary = ListenSummary {
            frames_decoded: 0,
            decode_errors: 0,
            frames_ignored: 0,
            neighbors_expired: 0,
            stop_reason: StopReason::Cancelled,
        };

        let result = loop {
            if cancel.is_cancelled() {
                break Ok(StopReason::Cancelled);
            }
            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                break Ok(StopReason::DurationElapsed);
            }
            if now >= next_sweep {
                summary.neighbors_expired += self.sweep().await;
                next_sweep = now + self.sweep_interval().await;
            }

            // Wake up in time for the next sweep or the deadline
            let mut wait = self.config.read_timeout.min(next_sweep - now);
            if let Some(deadline) = deadline {
                wait = wait.min(deadline - now);
            }

            let read = tokio::select! {
                read = capture.next_frame(wait) => read,
                _ = cancel.cancelled() => break Ok(StopReason::Cancelled),
            };

            let raw = match read {
                Ok(raw) => raw,
                Err(CaptureError::Timeout(_)) => continue,
                Err(CaptureError::Closed) => break Ok(StopReason::EndOfStream),
                Err(e) => break Err(e),
            };

            if codec::detect(&raw).is_none() {
                summary.frames_ignored += 1;
                continue;
            }

            self.set_state(DiscoveryState::Decoding);
            match codec::decode(&raw) {
                Ok(frame) => {
                    summary.frames_decoded += 1;
                    trace!(interface = %interface, chassis = %frame.chassis_id, "Decoded frame");
                    let upsert = self
                        .table
                        .write()
                        .await
                        .upsert(&interface, frame, Instant::now().into_std());

                    // A shorter TTL may pull the next sweep forward
                    if upsert != Upsert::Withdrawn {
                        let candidate = Instant::now() + self.sweep_interval().await;
                        next_sweep = next_sweep.min(candidate);
                    }
                }
                Err(e) => {
                    summary.decode_errors += 1;
                    debug!(interface = %interface, error = %e, bytes = raw.len(), "Dropping malformed frame");
                }
            }
            self.set_state(DiscoveryState::Listening);
        };

        self.set_state(DiscoveryState::Stopped);
        match result {
            Ok(reason) => {
                summary.stop_reason = reason;
                info!(
                    interface = %interface,
                    decoded = summary.frames_decoded,
                    errors = summary.decode_errors,
                    expired = summary.neighbors_expired,
                    reason = ?reason,
                    "Stopped listening"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(interface = %interface, error = %e, "Capture failed");
                Err(e.into())
            }
        }
    }

    /// Ask each target for its neighbour table over `retriever`'s shell
    pub async fn retrieve<S: RemoteShell>(
        &self,
        retriever: &RemoteRetriever<S>,
        targets: &[Target],
        credentials: &Credentials,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        retriever.retrieve(&self.table, targets, credentials).await
    }

    /// Report of the current table contents
    pub async fn report(&self, status: RunStatus) -> DiscoveryReport {
        DiscoveryReport {
            neighbors: self.snapshot().await,
            status,
            ..Default::default()
        }
    }
}

/// Active retrieval: vendor commands over a remote shell.
///
/// The scheduler timeout bounds a whole device job (login plus commands);
/// the connect timeout bounds only the login.
pub struct RemoteRetriever<S> {
    shell: Arc<S>,
    commands: VendorCommandTable,
    scheduler: ProbeScheduler,
    port: u16,
    connect_timeout: Duration,
}

impl<S: RemoteShell> RemoteRetriever<S> {
    pub fn new(shell: Arc<S>, commands: VendorCommandTable, scheduler: ProbeScheduler, port: u16) -> Self {
        Self {
            shell,
            commands,
            scheduler,
            port,
            connect_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Limit for establishing and authenticating one session
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    async fn retrieve(
        &self,
        table: &SharedNeighborTable,
        targets: &[Target],
        credentials: &Credentials,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        if targets.is_empty() {
            return Err(DiscoveryError::NoTargets);
        }
        let targets: Vec<Target> = targets.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();

        // Every vendor must be known before any device is contacted
        let mut plans = Vec::with_capacity(targets.len());
        for target in &targets {
            let vendor = target.vendor_or_default();
            let commands = self
                .commands
                .commands(vendor)
                .ok_or(DiscoveryError::UnsupportedVendor(vendor))?;
            plans.push(Arc::new(commands.to_vec()));
        }

        info!(targets = targets.len(), "Retrieving neighbour tables");

        let credentials = Arc::new(credentials.clone());
        let jobs: Vec<_> = targets
            .iter()
            .zip(plans)
            .map(|(target, commands)| {
                let shell = Arc::clone(&self.shell);
                let credentials = Arc::clone(&credentials);
                let table = Arc::clone(table);
                let target = target.clone();
                let port = self.port;
                let limit = self.connect_timeout;
                async move {
                    let started = Instant::now();
                    let addr = target.socket_addr(port);
                    let connect = shell.connect(addr, &credentials, limit);
                    let mut session = match tokio::time::timeout(limit, connect).await {
                        Ok(Ok(session)) => session,
                        Ok(Err(e)) => {
                            debug!(target = %target, error = %e, "Session failed");
                            return classify_session_error(&e);
                        }
                        Err(_) => {
                            debug!(target = %target, timeout = ?limit, "Login timed out");
                            return Ok(ProbeResult::Timeout);
                        }
                    };

                    let outcome = collect_neighbors(&mut session, &target, &commands, &table).await;
                    if let Err(e) = session.close().await {
                        debug!(target = %target, error = %e, "Session close failed");
                    }

                    Ok(match outcome {
                        Err(detail) => ProbeResult::ProtocolError(detail),
                        Ok(found) => ProbeResult::Success(
                            ProbeMetadata::new(started.elapsed()).with_detail(format!("{} neighbours", found)),
                        ),
                    })
                }
            })
            .collect();

        let run = self.scheduler.run(jobs).await;
        let status = run.status();
        let sources = targets
            .into_iter()
            .zip(run.outcomes)
            .filter_map(|(target, outcome)| outcome.map(|result| (target, result)))
            .collect();

        let report = DiscoveryReport {
            neighbors: table.read().await.snapshot(),
            sources,
            status,
        };
        info!(
            neighbors = report.neighbors.len(),
            status = %report.status,
            "Neighbour retrieval finished"
        );
        Ok(report)
    }
}

/// Run each command and upsert what its adapter parses.
///
/// Succeeds with the neighbour count if at least one command produced
/// usable output; a disabled protocol is not a failure.
async fn collect_neighbors<T: Session>(
    session: &mut T,
    target: &Target,
    commands: &[VendorCommand],
    table: &SharedNeighborTable,
) -> Result<usize, String> {
    let mut found = 0;
    let mut answered = false;
    let mut last_error = None;

    for command in commands {
        let output = match session.execute(&command.command).await {
            Ok(output) => output,
            Err(e) => {
                debug!(target = %target, command = %command.command, error = %e, "Command failed");
                last_error = Some(e.to_string());
                continue;
            }
        };

        match text::parse(command.parser, &output) {
            Ok(parsed) => {
                answered = true;
                let now = Instant::now().into_std();
                let mut table = table.write().await;
                for neighbor in parsed {
                    let local = format!(
                        "{}@{}",
                        neighbor.local_interface.as_deref().unwrap_or("unknown"),
                        target.addr
                    );
                    table.upsert(&local, neighbor.frame, now);
                    found += 1;
                }
            }
            Err(TextError::ProtocolDisabled(protocol)) => {
                answered = true;
                info!(target = %target, protocol = %protocol, "Protocol not enabled on device");
            }
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    match last_error {
        Some(detail) if !answered => Err(detail),
        _ => Ok(found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use netst_core::{ChassisId, DiscoveryFrame, DiscoveryProtocol, ParserTag};
    use netst_probe::cancel_pair;
    use netst_shell::SessionError;
    use std::collections::{HashMap, VecDeque};
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use tokio::time::sleep;

    /// Replays scripted frames, then stays silent or closes
    struct ScriptedCapture {
        frames: VecDeque<(Duration, Vec<u8>)>,
        close_when_done: bool,
    }

    impl ScriptedCapture {
        fn new(frames: Vec<(Duration, Vec<u8>)>, close_when_done: bool) -> Self {
            Self {
                frames: frames.into(),
                close_when_done,
            }
        }
    }

    #[async_trait]
    impl RawInterfaceCapture for ScriptedCapture {
        fn interface_name(&self) -> &str {
            "eth0"
        }

        async fn next_frame(&mut self, timeout: Duration) -> Result<Vec<u8>, CaptureError> {
            match self.frames.front() {
                Some((delay, _)) if *delay <= timeout => {
                    let (delay, frame) = self.frames.pop_front().unwrap();
                    sleep(delay).await;
                    Ok(frame)
                }
                Some(_) => {
                    sleep(timeout).await;
                    if let Some((delay, _)) = self.frames.front_mut() {
                        *delay -= timeout;
                    }
                    Err(CaptureError::Timeout(timeout))
                }
                None if self.close_when_done => Err(CaptureError::Closed),
                None => {
                    sleep(timeout).await;
                    Err(CaptureError::Timeout(timeout))
                }
            }
        }
    }

    const MAC: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];

    fn lldp(ttl: u64) -> Vec<u8> {
        let frame = DiscoveryFrame::new(
            DiscoveryProtocol::Lldp,
            ChassisId::Mac(MAC),
            "Gi1/0/3",
            Duration::from_secs(ttl),
        );
        codec::encode(&frame).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_neighbor_expires_after_silence() {
        let discoverer = NeighborDiscoverer::default();
        let mut capture = ScriptedCapture::new(vec![(Duration::ZERO, lldp(5))], false);

        let summary = discoverer
            .listen(&mut capture, Some(Duration::from_secs(20)), CancelToken::never())
            .await
            .unwrap();

        assert_eq!(summary.frames_decoded, 1);
        assert_eq!(summary.neighbors_expired, 1);
        assert_eq!(summary.stop_reason, StopReason::DurationElapsed);
        assert!(discoverer.snapshot().await.is_empty());
        assert_eq!(discoverer.state(), DiscoveryState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_neighbor_kept_while_fresh() {
        let discoverer = NeighborDiscoverer::default();
        let mut capture = ScriptedCapture::new(vec![(Duration::ZERO, lldp(120))], false);

        discoverer
            .listen(&mut capture, Some(Duration::from_secs(3)), CancelToken::never())
            .await
            .unwrap();

        let snapshot = discoverer.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].local_interface, "eth0");
        assert_eq!(snapshot[0].frame.chassis_id, ChassisId::Mac(MAC));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_keeps_neighbor_alive() {
        let discoverer = NeighborDiscoverer::default();
        let frames = (0..6).map(|_| (Duration::from_secs(3), lldp(5))).collect();
        let mut capture = ScriptedCapture::new(frames, false);

        discoverer
            .listen(&mut capture, Some(Duration::from_secs(19)), CancelToken::never())
            .await
            .unwrap();

        assert_eq!(discoverer.snapshot().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_and_foreign_frames() {
        let discoverer = NeighborDiscoverer::default();
        let mut truncated = lldp(120);
        truncated.truncate(20);
        let mut ipv4 = vec![0u8; 60];
        ipv4[12] = 0x08;

        let mut capture = ScriptedCapture::new(
            vec![
                (Duration::ZERO, truncated),
                (Duration::ZERO, ipv4),
                (Duration::ZERO, lldp(120)),
            ],
            true,
        );

        let summary = discoverer
            .listen(&mut capture, None, CancelToken::never())
            .await
            .unwrap();
        assert_eq!(summary.decode_errors, 1);
        assert_eq!(summary.frames_ignored, 1);
        assert_eq!(summary.frames_decoded, 1);
        assert_eq!(summary.stop_reason, StopReason::EndOfStream);
        assert_eq!(discoverer.snapshot().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_withdrawal_frame() {
        let discoverer = NeighborDiscoverer::default();
        let mut capture = ScriptedCapture::new(
            vec![(Duration::ZERO, lldp(120)), (Duration::from_secs(1), lldp(0))],
            true,
        );

        discoverer
            .listen(&mut capture, None, CancelToken::never())
            .await
            .unwrap();
        assert!(discoverer.snapshot().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_and_state_is_terminal() {
        let discoverer = Arc::new(NeighborDiscoverer::default());
        let (handle, token) = cancel_pair();
        let mut states = discoverer.subscribe_state();

        let listener = {
            let discoverer = Arc::clone(&discoverer);
            tokio::spawn(async move {
                let mut capture = ScriptedCapture::new(Vec::new(), false);
                discoverer.listen(&mut capture, None, token).await
            })
        };

        states.wait_for(|s| *s == DiscoveryState::Listening).await.unwrap();
        sleep(Duration::from_secs(5)).await;
        handle.cancel();

        let summary = listener.await.unwrap().unwrap();
        assert_eq!(summary.stop_reason, StopReason::Cancelled);
        assert_eq!(discoverer.state(), DiscoveryState::Stopped);

        let mut capture = ScriptedCapture::new(Vec::new(), true);
        let err = discoverer
            .listen(&mut capture, None, CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::NotIdle(DiscoveryState::Stopped)));
    }

    const CDP_OUTPUT: &str = "\
-------------------------
Device ID: dist-sw2
Entry address(es):
  IP address: 10.0.0.2
Platform: cisco WS-C2960X-48TS-L,  Capabilities: Switch IGMP
Interface: GigabitEthernet1/0/1,  Port ID (outgoing port): GigabitEthernet0/2
Holdtime : 147 sec
";

    const LLDP_OUTPUT: &str = "\
------------------------------------------------
Local Intf: Gi1/0/1
Chassis id: 0050.56bf.1234
Port id: Gi0/2
System Name: dist-sw2
Time remaining: 105 seconds
Management Addresses:
    IP: 10.0.0.2
";

    #[derive(Clone, Copy)]
    enum Device {
        Cisco,
        CdpDisabled,
        WrongPassword,
        Broken,
        /// Accepts TCP but never finishes the login
        Hanging,
    }

    struct FakeShell {
        devices: HashMap<IpAddr, Device>,
    }

    struct FakeSession {
        device: Device,
    }

    #[async_trait]
    impl Session for FakeSession {
        async fn execute(&mut self, command: &str) -> Result<String, SessionError> {
            match (self.device, command) {
                (Device::Broken, _) => Err(SessionError::ExecFailed {
                    command: command.to_string(),
                    reason: "channel closed".to_string(),
                }),
                (Device::CdpDisabled, "show cdp neighbors detail") => {
                    Ok("% CDP is not enabled\r\n".to_string())
                }
                (_, "show cdp neighbors detail") => Ok(CDP_OUTPUT.to_string()),
                (_, "show lldp neighbors detail") => Ok(LLDP_OUTPUT.to_string()),
                (_, other) => Ok(format!("% Invalid input detected: {}", other)),
            }
        }

        async fn close(&mut self) -> Result<(), SessionError> {
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteShell for FakeShell {
        type Session = FakeSession;

        async fn connect(
            &self,
            addr: SocketAddr,
            credentials: &Credentials,
            _timeout: Duration,
        ) -> Result<FakeSession, SessionError> {
            match self.devices.get(&addr.ip()) {
                Some(Device::WrongPassword) => {
                    Err(SessionError::AuthRejected(credentials.username.clone()))
                }
                Some(Device::Hanging) => std::future::pending().await,
                Some(device) => Ok(FakeSession { device: *device }),
                None => Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into()),
            }
        }
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn retriever(devices: impl IntoIterator<Item = (IpAddr, Device)>) -> RemoteRetriever<FakeShell> {
        let shell = FakeShell {
            devices: devices.into_iter().collect(),
        };
        RemoteRetriever::new(
            Arc::new(shell),
            VendorCommandTable::default(),
            ProbeScheduler::default(),
            22,
        )
    }

    #[tokio::test]
    async fn test_retrieve_merges_protocols() {
        let discoverer = NeighborDiscoverer::default();
        let retriever = retriever([(ip(1), Device::Cisco), (ip(2), Device::WrongPassword)]);
        let targets = vec![Target::new(ip(1)), Target::new(ip(2)), Target::new(ip(3))];

        let report = discoverer
            .retrieve(&retriever, &targets, &Credentials::new("admin", "pw"))
            .await
            .unwrap();

        // One CDP and one LLDP entry for the same device
        assert_eq!(report.neighbors.len(), 2);
        let interfaces: BTreeSet<&str> = report
            .neighbors
            .iter()
            .map(|n| n.local_interface.as_str())
            .collect();
        assert!(interfaces.contains("GigabitEthernet1/0/1@10.0.0.1"));
        assert!(interfaces.contains("Gi1/0/1@10.0.0.1"));

        let unique = report.unique_neighbors();
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].hostname, "dist-sw2");

        assert!(report.sources[&targets[0]].is_success());
        assert_eq!(report.sources[&targets[1]], ProbeResult::AuthFailure);
        assert_eq!(report.sources[&targets[2]], ProbeResult::Refused);
        assert_eq!(report.status, RunStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_login_bounded_by_connect_timeout() {
        let shell = FakeShell {
            devices: [(ip(1), Device::Cisco), (ip(2), Device::Hanging)].into_iter().collect(),
        };
        let retriever = RemoteRetriever::new(
            Arc::new(shell),
            VendorCommandTable::default(),
            ProbeScheduler::new(4, Duration::from_secs(60)).unwrap(),
            22,
        )
        .with_connect_timeout(Duration::from_secs(3));
        assert_eq!(retriever.connect_timeout(), Duration::from_secs(3));

        let discoverer = NeighborDiscoverer::default();
        let targets = vec![Target::new(ip(1)), Target::new(ip(2))];
        let started = Instant::now();
        let report = discoverer
            .retrieve(&retriever, &targets, &Credentials::new("admin", "pw"))
            .await
            .unwrap();

        assert!(report.sources[&targets[0]].is_success());
        assert_eq!(report.sources[&targets[1]], ProbeResult::Timeout);
        assert_eq!(report.status, RunStatus::Completed);
        // Ended by the login limit, not the 60 s device budget
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_disabled_protocol_is_skipped() {
        let discoverer = NeighborDiscoverer::default();
        let retriever = retriever([(ip(1), Device::CdpDisabled)]);

        let report = discoverer
            .retrieve(&retriever, &[Target::new(ip(1))], &Credentials::new("admin", "pw"))
            .await
            .unwrap();

        assert_eq!(report.neighbors.len(), 1);
        assert_eq!(report.neighbors[0].frame.protocol, DiscoveryProtocol::Lldp);
        assert!(report.sources[&Target::new(ip(1))].is_success());
    }

    #[tokio::test]
    async fn test_failed_commands_are_protocol_errors() {
        let discoverer = NeighborDiscoverer::default();
        let retriever = retriever([(ip(1), Device::Broken)]);

        let report = discoverer
            .retrieve(&retriever, &[Target::new(ip(1))], &Credentials::new("admin", "pw"))
            .await
            .unwrap();

        assert!(report.neighbors.is_empty());
        assert!(matches!(
            report.sources[&Target::new(ip(1))],
            ProbeResult::ProtocolError(_)
        ));
    }

    #[tokio::test]
    async fn test_unknown_vendor_rejected_up_front() {
        let discoverer = NeighborDiscoverer::default();
        let retriever = retriever([(ip(1), Device::Cisco)]);
        let targets = vec![
            Target::new(ip(1)),
            Target::with_vendor(ip(2), VendorTag::Extreme),
        ];

        let err = discoverer
            .retrieve(&retriever, &targets, &Credentials::new("admin", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::UnsupportedVendor(VendorTag::Extreme)));
        assert!(discoverer.snapshot().await.is_empty());

        let err = discoverer
            .retrieve(&retriever, &[], &Credentials::new("admin", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::NoTargets));
    }

    #[test]
    fn test_linux_vendor_uses_lldpcli() {
        let table = VendorCommandTable::default();
        let commands = table.commands(VendorTag::Linux).unwrap();
        assert_eq!(commands[0].parser, ParserTag::LldpcliKeyvalue);
    }
}
