//! Bounded-concurrency probe executor
//!
//! Every concurrent probe in netst (TCP connects, SSH handshakes, neighbour
//! retrieval) runs through [`ProbeScheduler`], which gives all of them the
//! same guarantees:
//! - at most `max_concurrency` jobs in flight, the rest wait in order
//! - each job is bounded by one timeout; an abandoned job's future is dropped,
//!   which releases any socket or session it owned
//! - a failing or panicking job becomes a [`ProbeResult`], siblings carry on
//! - results come back in input order, whatever order jobs finish in
//! - resource exhaustion stops the run early, keeping the results so far;
//!   jobs it stops mid-flight are reported [`ProbeResult::Aborted`]

use futures_util::FutureExt;
use netst_core::{ProbeResult, RunStatus};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use thiserror::Error;
use tokio::task::{self, JoinSet};
use tracing::{debug, trace, warn};

use crate::cancel::CancelToken;

/// Default number of probes in flight
pub const DEFAULT_MAX_CONCURRENCY: usize = 64;

/// Default per-probe timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("max concurrency must be at least 1")]
    InvalidConcurrency,
    #[error("probe timeout must be non-zero")]
    InvalidTimeout,
}

/// Error a probe job can end with instead of a [`ProbeResult`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The host is out of sockets, descriptors or memory; fatal for the run
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// Any other failure, reported as a protocol error for this job only
    #[error("{0}")]
    Failed(String),
}

impl JobError {
    pub fn from_io(err: &io::Error) -> Self {
        if is_resource_exhaustion(err) {
            Self::ResourceExhausted(err.to_string())
        } else {
            Self::Failed(err.to_string())
        }
    }
}

/// Whether an I/O error means the host ran out of descriptors or memory
pub fn is_resource_exhaustion(err: &io::Error) -> bool {
    // ENFILE and EMFILE share their values on Linux and the BSDs
    const ENFILE: i32 = 23;
    const EMFILE: i32 = 24;

    err.kind() == io::ErrorKind::OutOfMemory
        || matches!(err.raw_os_error(), Some(ENFILE) | Some(EMFILE))
}

/// Fatal condition that ended a run early
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerFailure {
    #[error("resource exhausted: {detail} ({unattempted} jobs without a result)")]
    ResourceExhausted { detail: String, unattempted: usize },
}

/// Result of one scheduler run
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerRun {
    /// One slot per job, in input order; `None` when the job was never
    /// attempted (still queued, or it hit resource exhaustion itself)
    pub outcomes: Vec<Option<ProbeResult>>,
    pub failure: Option<SchedulerFailure>,
    pub cancelled: bool,
}

impl SchedulerRun {
    pub fn unattempted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_none()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && !self.cancelled
    }

    pub fn status(&self) -> RunStatus {
        match &self.failure {
            Some(SchedulerFailure::ResourceExhausted {
                detail,
                unattempted,
            }) => RunStatus::Aborted {
                reason: detail.clone(),
                unattempted: *unattempted,
            },
            None if self.cancelled => RunStatus::Cancelled {
                skipped: self
                    .outcomes
                    .iter()
                    .filter(|o| matches!(o, Some(ProbeResult::Cancelled)))
                    .count(),
            },
            None => RunStatus::Completed,
        }
    }
}

/// Bounded-concurrency executor for probe jobs
#[derive(Debug, Clone)]
pub struct ProbeScheduler {
    max_concurrency: usize,
    timeout: Duration,
    cancel: CancelToken,
}

impl Default for ProbeScheduler {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
            cancel: CancelToken::never(),
        }
    }
}

impl ProbeScheduler {
    pub fn new(max_concurrency: usize, timeout: Duration) -> Result<Self, SchedulerError> {
        if max_concurrency == 0 {
            return Err(SchedulerError::InvalidConcurrency);
        }
        if timeout.is_zero() {
            return Err(SchedulerError::InvalidTimeout);
        }
        Ok(Self {
            max_concurrency,
            timeout,
            cancel: CancelToken::never(),
        })
    }

    /// Tie runs of this scheduler to a cancel token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run all jobs, returning their results in input order
    pub async fn run<F>(&self, jobs: Vec<F>) -> SchedulerRun
    where
        F: Future<Output = Result<ProbeResult, JobError>> + Send + 'static,
    {
        let total = jobs.len();
        let mut outcomes: Vec<Option<ProbeResult>> = vec![None; total];
        let mut queue = jobs.into_iter().enumerate();
        let mut in_flight = JoinSet::new();
        // Task id -> job index, for tasks that end without returning one
        let mut running: HashMap<task::Id, usize> = HashMap::new();
        let mut cancel = self.cancel.clone();
        let mut cancelled = false;
        let mut failure: Option<String> = None;

        debug!(
            jobs = total,
            max_concurrency = self.max_concurrency,
            timeout_ms = self.timeout.as_millis() as u64,
            "Starting probe run"
        );

        loop {
            if !cancelled && cancel.is_cancelled() {
                cancelled = true;
            }

            // Admission: top the in-flight set up to the concurrency bound
            if !cancelled && failure.is_none() {
                while in_flight.len() < self.max_concurrency {
                    let Some((index, job)) = queue.next() else {
                        break;
                    };
                    let limit = self.timeout;
                    let handle = in_flight.spawn(supervise(job, limit));
                    running.insert(handle.id(), index);
                }
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                joined = in_flight.join_next_with_id() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    let id = match &joined {
                        Ok((id, _)) => *id,
                        Err(e) => e.id(),
                    };
                    let Some(index) = running.remove(&id) else {
                        continue;
                    };
                    match joined {
                        Ok((_, Ok(result))) => {
                            trace!(job = index, result = %result, "Probe finished");
                            outcomes[index] = Some(result);
                        }
                        Ok((_, Err(detail))) => {
                            warn!(job = index, error = %detail, "Resource exhaustion, aborting probe run");
                            failure.get_or_insert(detail);
                            in_flight.abort_all();
                        }
                        Err(e) if e.is_cancelled() => {
                            debug!(job = index, "Job aborted");
                            outcomes[index] = Some(ProbeResult::Aborted);
                        }
                        Err(e) => {
                            warn!(job = index, error = %e, "Probe task failed");
                            let detail = format!("job task failed: {}", e);
                            outcomes[index] = Some(ProbeResult::ProtocolError(detail));
                        }
                    }
                },
                _ = cancel.cancelled(), if !cancelled => {
                    debug!("Probe run cancelled, discarding queued jobs");
                    cancelled = true;
                }
            }
        }

        if cancelled {
            for (index, _job) in queue {
                outcomes[index] = Some(ProbeResult::Cancelled);
            }
        }

        let mut run = SchedulerRun {
            outcomes,
            failure: None,
            cancelled,
        };
        if let Some(detail) = failure {
            run.failure = Some(SchedulerFailure::ResourceExhausted {
                detail,
                unattempted: run.unattempted(),
            });
        }

        debug!(
            jobs = total,
            unattempted = run.unattempted(),
            cancelled = run.cancelled,
            "Probe run finished"
        );
        run
    }
}

/// Bound one job by the timeout and turn its errors and panics into results.
///
/// `Err` carries the detail of a fatal resource-exhaustion error.
async fn supervise<F>(job: F, limit: Duration) -> Result<ProbeResult, String>
where
    F: Future<Output = Result<ProbeResult, JobError>> + Send,
{
    match tokio::time::timeout(limit, AssertUnwindSafe(job).catch_unwind()).await {
        Err(_) => Ok(ProbeResult::Timeout),
        Ok(Err(_panic)) => Ok(ProbeResult::ProtocolError("probe panicked".to_string())),
        Ok(Ok(Ok(result))) => Ok(result),
        Ok(Ok(Err(JobError::Failed(detail)))) => Ok(ProbeResult::ProtocolError(detail)),
        Ok(Ok(Err(JobError::ResourceExhausted(detail)))) => Err(detail),
    }
}
