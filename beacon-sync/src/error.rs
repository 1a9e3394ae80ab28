//! Error types for beacon-sync.

use thiserror::Error;

/// All errors that can arise while talking to the cluster manager or the
/// registry, or while fanning work out across tasks.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Connection, DNS or timeout failure before a response arrived.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },

    /// The response body could not be read.
    #[error("failed to read response from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// The response body was not the JSON we expected.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// A registry write answered with an error message in its body.
    #[error("registry rejected {operation} of '{id}': {message}")]
    Rejected {
        operation: &'static str,
        id: String,
        message: String,
    },

    /// A fan-out task panicked or was cancelled.
    #[error("task join failure: {0}")]
    Join(String),
}

/// Map a `ureq` error to [`SyncError`], reading the body of status errors.
pub(crate) fn http_err(url: &str, err: ureq::Error) -> SyncError {
    match err {
        ureq::Error::Status(status, response) => SyncError::Status {
            url: url.to_string(),
            status,
            body: response.into_string().unwrap_or_default(),
        },
        other => SyncError::Transport {
            url: url.to_string(),
            source: Box::new(other),
        },
    }
}
