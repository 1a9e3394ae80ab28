//! Daemon runtime: reconciliation loop, log file and rotation, signal handling.

mod error;
pub mod log_rotation;
pub mod logging;
pub mod paths;
mod runtime;

pub use error::DaemonError;
pub use logging::{init_tracing, LogFile};
pub use runtime::{reconcile_loop, run, run_once, start_blocking, DaemonSettings};
