//! Tracing setup and the log file writer.
//!
//! [`LogFile`] is a `MakeWriter` that appends to one file and falls back to
//! stderr while the file cannot be opened. Rotation goes through the same
//! handle so the subscriber keeps writing to the live file afterwards.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

use crate::log_rotation::rotate_if_needed;

#[derive(Debug, Clone)]
pub struct LogFile {
    path: Option<PathBuf>,
    file: Arc<Mutex<Option<File>>>,
}

impl LogFile {
    /// Append to `path`, creating it (and its directory) if needed.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match open_append(&path) {
            Ok(file) => Some(file),
            Err(err) => {
                eprintln!(
                    "cannot open log file {}: {err}; logging to stderr",
                    path.display()
                );
                None
            }
        };
        Self {
            path: Some(path),
            file: Arc::new(Mutex::new(file)),
        }
    }

    /// Writer with no file behind it.
    pub fn stderr() -> Self {
        Self {
            path: None,
            file: Arc::new(Mutex::new(None)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// True when writes currently land in a file.
    pub fn is_file(&self) -> bool {
        self.lock().is_some()
    }

    /// Rotate the file if it reached `max_bytes`, then reopen the live path.
    pub fn rotate(&self, max_bytes: u64, max_files: usize) -> io::Result<bool> {
        let Some(path) = self.path.as_deref() else {
            return Ok(false);
        };
        let mut guard = self.lock();
        let rotated = rotate_if_needed(path, max_bytes, max_files)?;
        if rotated || guard.is_none() {
            *guard = open_append(path).ok();
        }
        Ok(rotated)
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

pub struct LogWriter<'a> {
    guard: MutexGuard<'a, Option<File>>,
}

impl Write for LogWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.guard.as_mut() {
            Some(file) => file.write(buf),
            None => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.guard.as_mut() {
            Some(file) => file.flush(),
            None => io::stderr().flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter { guard: self.lock() }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info`.
/// ANSI colours are only used when writing to stderr.
pub fn init_tracing(log: LogFile) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let ansi = !log.is_file();
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(ansi)
        .with_writer(log)
        .try_init();
}
