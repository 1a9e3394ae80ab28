//! Beacon core library: domain types and bootstrap configuration.
//!
//! - [`types`]: components, registry entries, names and the host inventory
//! - [`config`]: bootstrap file paths, waiting and parsing, poll interval
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{BootstrapPaths, Credentials, ManagerConfig};
pub use error::ConfigError;
pub use types::{
    ClusterName, Component, ComponentState, ComponentType, HostInventory, HostName,
    RegistryEntry, ServiceName, MAINTENANCE_STATE, OWNERSHIP_TAG, SERVICE_PORT, UNKNOWN_STATE,
};
