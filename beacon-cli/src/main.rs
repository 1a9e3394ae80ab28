//! Beacon: keeps the service registry in step with the cluster manager.
//!
//! # Usage
//!
//! ```text
//! beacon [run]                  reconcile forever (default)
//! beacon once [--dry-run] [--json]
//! beacon version | --version | -version
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::once::OnceArgs;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "beacon",
    about = "Register cluster-manager components in the service registry",
    long_about = None,
    disable_version_flag = true,
)]
struct Cli {
    /// Print version and build time.
    #[arg(short = 'V', long = "version")]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reconciliation loop until interrupted.
    Run,

    /// Run a single pass and print what it did.
    Once(OnceArgs),

    /// Print version and build time.
    Version,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

/// Any first argument ending in `version` asks for the version, so the
/// single-dash `-version` spelling keeps working.
fn is_version_request(first: Option<&str>) -> bool {
    first.is_some_and(|arg| arg.ends_with("version"))
}

fn main() -> Result<()> {
    if is_version_request(std::env::args().nth(1).as_deref()) {
        commands::version::run();
        return Ok(());
    }
    let cli = Cli::parse();
    if cli.version {
        commands::version::run();
        return Ok(());
    }
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run::run(),
        Commands::Once(args) => args.run(),
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_spellings() {
        for arg in ["version", "--version", "-version"] {
            assert!(is_version_request(Some(arg)), "{arg}");
        }
        assert!(!is_version_request(Some("-V")));
        assert!(!is_version_request(Some("once")));
        assert!(!is_version_request(None));
    }
}
