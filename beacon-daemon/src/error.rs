use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime and one-shot passes.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] beacon_core::ConfigError),

    #[error("sync error: {0}")]
    Sync(#[from] beacon_sync::SyncError),

    #[error("bootstrap configuration not available yet (credentials: {credentials}, server: {server})")]
    NotConfigured {
        credentials: PathBuf,
        server: PathBuf,
    },

    #[error("runtime error: {0}")]
    Runtime(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
