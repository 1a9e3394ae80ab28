//! Size-based log rotation.
//!
//! `beacon.log` is rotated once it reaches 10 MiB and a single backup is kept:
//!   beacon.log → beacon.log.1
//! Larger `max_files` values shift older copies up (`.1` → `.2` …).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Number of rotated backups to keep.
pub const MAX_ROTATED_FILES: usize = 1;

/// Rotate `log_path` if its size reached `max_bytes`.
///
/// Sequence: drop `<name>.<max_files>`, shift `<name>.<n>` to `<name>.<n+1>`,
/// rename `<name>` to `<name>.1`, then create an empty `<name>`.
///
/// Returns `true` if rotation occurred. A missing file is not an error.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    if size < max_bytes || max_files == 0 {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }

    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }

    fs::rename(log_path, numbered_path(log_path, 1))?;

    fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(log_path)?;

    Ok(true)
}

/// Path of the `n`-th rotated copy of `base` (`beacon.log.1`).
pub fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("beacon.log");
    base.with_file_name(format!("{name}.{n}"))
}
