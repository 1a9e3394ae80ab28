//! Shared blocking HTTP plumbing for both clients.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::{http_err, SyncError};

/// Whole-request deadline so one unreachable node cannot stall a pass.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the agent shared read-only by every task of a pass.
pub fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

/// Send `request`, read the body and decode it as JSON.
pub(crate) fn fetch_json<T: DeserializeOwned>(
    url: &str,
    request: ureq::Request,
) -> Result<T, SyncError> {
    let body = fetch_text(url, request)?;
    tracing::debug!(url, body = %body, "response");
    serde_json::from_str(&body).map_err(|source| SyncError::Decode {
        url: url.to_string(),
        source,
    })
}

/// Send `request` and return the raw body.
pub(crate) fn fetch_text(url: &str, request: ureq::Request) -> Result<String, SyncError> {
    request
        .call()
        .map_err(|err| http_err(url, err))?
        .into_string()
        .map_err(|source| SyncError::Body {
            url: url.to_string(),
            source,
        })
}
