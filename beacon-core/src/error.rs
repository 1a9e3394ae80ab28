//! Error types for beacon-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading the bootstrap configuration files.
///
/// Only malformed content is reported: a missing, unreadable or half-written
/// file is waited on.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file content is not valid YAML for the expected layout.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
