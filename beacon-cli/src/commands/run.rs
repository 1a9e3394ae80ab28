//! `beacon run`: the long-running daemon.

use anyhow::{Context, Result};

use beacon_daemon::{start_blocking, DaemonSettings};

pub fn run() -> Result<()> {
    start_blocking(DaemonSettings::from_env()).context("daemon exited with error")
}
