//! # beacon-sync
//!
//! Reconciliation engine: reads the cluster manager's topology and the
//! registry's content, diffs them and applies the difference.
//!
//! Call [`pipeline::run_pass`] once per cycle; the daemon crate drives it on a
//! fixed interval.

pub mod diff;
pub mod error;
pub mod fanout;
pub mod http;
pub mod manager;
pub mod mutator;
pub mod pipeline;
pub mod registry;
pub mod snapshot;

#[cfg(test)]
mod test_server;

pub use diff::{plan, to_deregister, to_register, Plan};
pub use error::SyncError;
pub use manager::{AmbariClient, ClusterManager};
pub use mutator::{MutationKind, MutationOutcome};
pub use pipeline::{run_pass, PassSummary, ReconcileContext};
pub use registry::{ConsulClient, ServiceRegistry};
