use std::path::PathBuf;
use std::time::Duration;

pub const ENV_LOG_FILE: &str = "BEACON_LOG_FILE";
pub const DEFAULT_LOG_FILE: &str = "/var/log/beacon.log";

/// How often the log file size is checked.
pub const ROTATION_CHECK_INTERVAL: Duration = Duration::from_secs(30);

pub fn log_file_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    lookup(ENV_LOG_FILE)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
}
