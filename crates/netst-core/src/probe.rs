//! Probe outcomes and port classification

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Extra information attached to a successful probe
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProbeMetadata {
    /// Time from job start until the probe succeeded
    pub elapsed_ms: u64,
    /// Free-form detail (remote prompt, neighbour count, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProbeMetadata {
    pub fn new(elapsed: Duration) -> Self {
        Self {
            elapsed_ms: elapsed.as_millis() as u64,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Outcome of a single probe attempt against a single target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ProbeResult {
    /// Connection or session established
    Success(ProbeMetadata),
    /// No answer within the probe timeout
    Timeout,
    /// Remote actively refused the connection
    Refused,
    /// Remote rejected the credentials
    AuthFailure,
    /// Any other transport or protocol failure
    ProtocolError(String),
    /// Job was still queued when the run was cancelled
    Cancelled,
    /// Job was in flight when resource exhaustion stopped the run
    Aborted,
}

impl ProbeResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short lowercase label used in text output
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Timeout => "timeout",
            Self::Refused => "refused",
            Self::AuthFailure => "auth-failure",
            Self::ProtocolError(_) => "protocol-error",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(meta) => match &meta.detail {
                Some(detail) => write!(f, "success in {}ms ({})", meta.elapsed_ms, detail),
                None => write!(f, "success in {}ms", meta.elapsed_ms),
            },
            Self::ProtocolError(detail) => write!(f, "protocol error: {}", detail),
            other => f.write_str(other.label()),
        }
    }
}

/// Classification of a single TCP port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
}

impl PortState {
    /// Classify a connect probe outcome.
    ///
    /// Returns `None` for a cancelled or aborted probe, which has no classification.
    pub fn from_probe(result: &ProbeResult) -> Option<Self> {
        match result {
            ProbeResult::Success(_) => Some(Self::Open),
            ProbeResult::Refused => Some(Self::Closed),
            ProbeResult::Timeout | ProbeResult::ProtocolError(_) | ProbeResult::AuthFailure => {
                Some(Self::Filtered)
            }
            ProbeResult::Cancelled | ProbeResult::Aborted => None,
        }
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Closed => f.write_str("closed"),
            Self::Filtered => f.write_str("filtered"),
        }
    }
}

/// How a scheduled run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every job produced a result
    Completed,
    /// Cancelled by the caller; `skipped` queued jobs were discarded
    Cancelled { skipped: usize },
    /// Halted by a fatal condition; `unattempted` jobs have no result
    Aborted { reason: String, unattempted: usize },
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Completed
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Cancelled { skipped } => write!(f, "cancelled ({} skipped)", skipped),
            Self::Aborted {
                reason,
                unattempted,
            } => write!(f, "aborted: {} ({} not attempted)", reason, unattempted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_state_classification() {
        let open = ProbeResult::Success(ProbeMetadata::default());
        assert_eq!(PortState::from_probe(&open), Some(PortState::Open));
        assert_eq!(PortState::from_probe(&ProbeResult::Refused), Some(PortState::Closed));
        assert_eq!(PortState::from_probe(&ProbeResult::Timeout), Some(PortState::Filtered));
        assert_eq!(
            PortState::from_probe(&ProbeResult::ProtocolError("unreachable".into())),
            Some(PortState::Filtered)
        );
        assert_eq!(PortState::from_probe(&ProbeResult::Cancelled), None);
        assert_eq!(PortState::from_probe(&ProbeResult::Aborted), None);
    }

    #[test]
    fn test_probe_result_serialization() {
        let json = serde_json::to_string(&ProbeResult::Timeout).unwrap();
        assert_eq!(json, r#"{"outcome":"timeout"}"#);

        let json = serde_json::to_string(&ProbeResult::ProtocolError("eof".into())).unwrap();
        assert_eq!(json, r#"{"outcome":"protocol_error","detail":"eof"}"#);

        let success = ProbeResult::Success(ProbeMetadata::new(Duration::from_millis(42)));
        let json = serde_json::to_string(&success).unwrap();
        assert_eq!(json, r#"{"outcome":"success","detail":{"elapsed_ms":42}}"#);
    }

    #[test]
    fn test_probe_result_display() {
        let success = ProbeResult::Success(
            ProbeMetadata::new(Duration::from_millis(7)).with_detail("core-sw1#"),
        );
        assert_eq!(success.to_string(), "success in 7ms (core-sw1#)");
        assert_eq!(ProbeResult::AuthFailure.to_string(), "auth-failure");
    }
}
