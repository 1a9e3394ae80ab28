//! Bootstrap configuration for the cluster-manager connection.
//!
//! # File layout
//!
//! ```text
//! # credentials file (AMBARI_CREDENTIALS_PATH)
//! ambari:
//!   username: admin
//!   password: secret
//!
//! # server file (AMBARI_SERVER_PATH)
//! ambari:
//!   server: ambari.example.com
//! ```
//!
//! Both files are provisioned by an external agent and may appear late or
//! half-written. A missing or unreadable file, an empty file or blank fields
//! are waited on; malformed YAML is fatal.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const ENV_CREDENTIALS_PATH: &str = "AMBARI_CREDENTIALS_PATH";
pub const ENV_SERVER_PATH: &str = "AMBARI_SERVER_PATH";
pub const ENV_POLL_INTERVAL: &str = "SERVICE_CHECK_POLL_INTERVAL";

pub const DEFAULT_CREDENTIALS_PATH: &str = "/srv/pillar/ambari/credentials.sls";
pub const DEFAULT_SERVER_PATH: &str = "/srv/pillar/ambari/server.sls";

/// Pause between reconciliation passes when the env var is absent or invalid.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Pause between two checks of a bootstrap file that is not usable yet.
pub const FILE_WAIT_BACKOFF: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Paths and environment
// ---------------------------------------------------------------------------

/// Locations of the two bootstrap files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPaths {
    pub credentials: PathBuf,
    pub server: PathBuf,
}

impl BootstrapPaths {
    /// Paths from `lookup` (the environment in production), falling back to
    /// the fixed defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };
        Self {
            credentials: pick(ENV_CREDENTIALS_PATH, DEFAULT_CREDENTIALS_PATH),
            server: pick(ENV_SERVER_PATH, DEFAULT_SERVER_PATH),
        }
    }
}

impl Default for BootstrapPaths {
    fn default() -> Self {
        Self {
            credentials: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            server: PathBuf::from(DEFAULT_SERVER_PATH),
        }
    }
}

/// Parse a duration such as `10s` or `1m 30s`. Missing, invalid or zero
/// values fall back to [`DEFAULT_POLL_INTERVAL`].
pub fn parse_poll_interval(raw: Option<&str>) -> Duration {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => DEFAULT_POLL_INTERVAL,
        Some(value) => match humantime::parse_duration(value) {
            Ok(d) if !d.is_zero() => d,
            Ok(_) => DEFAULT_POLL_INTERVAL,
            Err(err) => {
                tracing::warn!(value, error = %err, "invalid poll interval, using default");
                DEFAULT_POLL_INTERVAL
            }
        },
    }
}

// ---------------------------------------------------------------------------
// File content
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct BootstrapFile {
    #[serde(default)]
    ambari: Option<ManagerSection>,
}

/// Values are kept as raw YAML so numeric or boolean scalars (a numeric
/// password) are accepted as text.
#[derive(Debug, Default, Deserialize)]
struct ManagerSection {
    #[serde(default)]
    server: Option<serde_yaml::Value>,
    #[serde(default)]
    username: Option<serde_yaml::Value>,
    #[serde(default)]
    password: Option<serde_yaml::Value>,
}

/// Username and password for the cluster manager.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything needed to talk to the cluster manager.
#[derive(Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Host name or IP of the manager server, without port.
    pub address: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Read the file at `path` and parse its `ambari:` section.
///
/// `Ok(None)` means "not there yet": missing, unreadable or empty file.
/// Only malformed content is an error.
fn read_section_at(path: &Path) -> Result<Option<ManagerSection>, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "bootstrap file not readable yet");
            return Ok(None);
        }
    };
    if contents.trim().is_empty() {
        return Ok(None);
    }
    let parsed: Option<BootstrapFile> =
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(parsed.unwrap_or_default().ambari)
}

fn non_blank(value: Option<serde_yaml::Value>) -> Option<String> {
    let text = match value? {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Credentials from `path`, or `None` while the file or its fields are missing.
pub fn read_credentials_at(path: &Path) -> Result<Option<Credentials>, ConfigError> {
    let Some(section) = read_section_at(path)? else {
        return Ok(None);
    };
    match (non_blank(section.username), non_blank(section.password)) {
        (Some(username), Some(password)) => Ok(Some(Credentials { username, password })),
        _ => Ok(None),
    }
}

/// Manager server address from `path`, or `None` while it is missing.
pub fn read_server_at(path: &Path) -> Result<Option<String>, ConfigError> {
    Ok(read_section_at(path)?.and_then(|section| non_blank(section.server)))
}

/// Both files read once, without waiting. `None` if either is not usable yet.
pub fn read_manager_config(paths: &BootstrapPaths) -> Result<Option<ManagerConfig>, ConfigError> {
    let credentials = read_credentials_at(&paths.credentials)?;
    let address = read_server_at(&paths.server)?;
    Ok(credentials.zip(address).map(|(credentials, address)| ManagerConfig {
        address,
        username: credentials.username,
        password: credentials.password,
    }))
}

// ---------------------------------------------------------------------------
// Waiting
// ---------------------------------------------------------------------------

/// Poll `read` every `backoff` until it yields a value. Parse errors end the wait.
async fn wait_for<T>(
    path: &Path,
    what: &'static str,
    backoff: Duration,
    read: impl Fn(&Path) -> Result<Option<T>, ConfigError>,
) -> Result<T, ConfigError> {
    loop {
        match read(path)? {
            Some(value) => {
                tracing::info!(path = %path.display(), "{what} found");
                return Ok(value);
            }
            None => {
                tracing::info!(
                    path = %path.display(),
                    retry_in_secs = backoff.as_secs(),
                    "{what} not available yet, waiting",
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Block until both bootstrap files are usable and merge them.
pub async fn wait_for_manager_config(
    paths: &BootstrapPaths,
    backoff: Duration,
) -> Result<ManagerConfig, ConfigError> {
    tracing::info!(path = %paths.credentials.display(), "manager credentials path");
    let credentials =
        wait_for(&paths.credentials, "manager credentials", backoff, read_credentials_at).await?;

    tracing::info!(path = %paths.server.display(), "manager server path");
    let address = wait_for(&paths.server, "manager server", backoff, read_server_at).await?;

    Ok(ManagerConfig {
        address,
        username: credentials.username,
        password: credentials.password,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
