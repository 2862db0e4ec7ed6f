//! Probe execution for netst
//!
//! [`ProbeScheduler`] runs independent probe jobs with a concurrency bound
//! and a per-job timeout. [`PortScanner`] and [`ConnectivityChecker`] are
//! built on it.

pub mod cancel;
pub mod connectivity;
pub mod port;
pub mod scheduler;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use connectivity::{classify_session_error, CheckError, ConnectivityChecker, DEFAULT_SHELL_PORT};
pub use port::{PortScanner, ScanError, TcpConnector, TokioConnector};
pub use scheduler::{
    is_resource_exhaustion, JobError, ProbeScheduler, SchedulerError, SchedulerFailure,
    SchedulerRun, DEFAULT_MAX_CONCURRENCY, DEFAULT_TIMEOUT,
};
