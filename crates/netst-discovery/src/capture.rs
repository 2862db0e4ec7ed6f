//! Raw frame capture from a network interface

use async_trait::async_trait;
use pnet::datalink::{self, Channel, DataLinkReceiver};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no frame within {0:?}")]
    Timeout(Duration),
    #[error("capture closed")]
    Closed,
    #[error("interface {0} not found")]
    InterfaceNotFound(String),
    #[error("interface {0} does not provide an Ethernet channel")]
    UnsupportedChannel(String),
    #[error("capture I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Source of raw Ethernet frames
#[async_trait]
pub trait RawInterfaceCapture: Send {
    /// Name of the local interface frames are read from
    fn interface_name(&self) -> &str;

    /// Next frame, or [`CaptureError::Timeout`] if none arrived within `timeout`
    async fn next_frame(&mut self, timeout: Duration) -> Result<Vec<u8>, CaptureError>;
}

type PendingRead = JoinHandle<(Box<dyn DataLinkReceiver>, io::Result<Vec<u8>>)>;

/// Capture over `pnet::datalink`.
///
/// The receiver blocks, so reads run on the blocking pool. A read still
/// outstanding when `next_frame` times out is picked up by the next call,
/// which keeps frames from being lost between calls.
pub struct PnetCapture {
    name: String,
    receiver: Option<Box<dyn DataLinkReceiver>>,
    pending: Option<PendingRead>,
}

impl PnetCapture {
    /// Open `interface` for capture. `read_timeout` bounds each blocking read.
    pub fn open(interface: &str, read_timeout: Duration) -> Result<Self, CaptureError> {
        let iface = datalink::interfaces()
            .into_iter()
            .find(|i| i.name == interface)
            .ok_or_else(|| CaptureError::InterfaceNotFound(interface.to_string()))?;

        let config = datalink::Config {
            read_timeout: Some(read_timeout),
            promiscuous: true,
            ..Default::default()
        };
        let receiver = match datalink::channel(&iface, config)? {
            Channel::Ethernet(_tx, rx) => rx,
            _ => return Err(CaptureError::UnsupportedChannel(interface.to_string())),
        };

        info!(interface = %interface, mac = ?iface.mac, "Opened capture");
        Ok(Self {
            name: interface.to_string(),
            receiver: Some(receiver),
            pending: None,
        })
    }

    fn start_read(&mut self) -> Option<PendingRead> {
        let mut receiver = self.receiver.take()?;
        Some(tokio::task::spawn_blocking(move || {
            let frame = receiver.next().map(<[u8]>::to_vec);
            (receiver, frame)
        }))
    }
}

#[async_trait]
impl RawInterfaceCapture for PnetCapture {
    fn interface_name(&self) -> &str {
        &self.name
    }

    async fn next_frame(&mut self, timeout: Duration) -> Result<Vec<u8>, CaptureError> {
        let pending = match self.pending.take() {
            Some(pending) => Some(pending),
            None => self.start_read(),
        };
        let Some(mut pending) = pending else {
            return Err(CaptureError::Closed);
        };

        match tokio::time::timeout(timeout, &mut pending).await {
            Err(_) => {
                self.pending = Some(pending);
                Err(CaptureError::Timeout(timeout))
            }
            // The blocking task panicked; the receiver went with it
            Ok(Err(_join)) => Err(CaptureError::Closed),
            Ok(Ok((receiver, frame))) => {
                self.receiver = Some(receiver);
                match frame {
                    Ok(frame) => Ok(frame),
                    Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                        Err(CaptureError::Timeout(timeout))
                    }
                    Err(e) => Err(CaptureError::Io(e)),
                }
            }
        }
    }
}
