//! `beacon once`: one reconciliation pass, logging to stderr.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use beacon_daemon::{init_tracing, run_once, DaemonSettings, LogFile};
use beacon_sync::{MutationKind, MutationOutcome, PassSummary};

/// Arguments for `beacon once`.
#[derive(Args, Debug)]
pub struct OnceArgs {
    /// Compute the plan without touching the registry.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the pass summary as JSON.
    #[arg(long)]
    pub json: bool,
}

impl OnceArgs {
    pub fn run(self) -> Result<()> {
        init_tracing(LogFile::stderr());
        let settings = DaemonSettings::from_env();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start tokio runtime")?;
        let summary = runtime
            .block_on(run_once(&settings, self.dry_run))
            .context("reconciliation pass failed")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("failed to render pass summary")?
            );
        } else {
            print_summary(&summary);
        }
        Ok(())
    }
}

fn print_summary(summary: &PassSummary) {
    let prefix = if summary.dry_run { "[dry-run] " } else { "" };
    let cluster = summary
        .cluster
        .as_ref()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());

    println!(
        "{prefix}cluster {}: {} components, {} registry entries",
        cluster.bold(),
        summary.components,
        summary.registry_entries
    );

    if summary.plan.is_empty() {
        println!("{prefix}{} registry is up to date", "✓".green().bold());
        return;
    }

    for entry in &summary.plan.deregister {
        println!("  {} {} {}", "-".red().bold(), entry.id, entry.address.dimmed());
    }
    for component in &summary.plan.register {
        println!(
            "  {} {} {} ({})",
            "+".green().bold(),
            component.registration_id(),
            component.ip_address.dimmed(),
            component.state_tag()
        );
    }

    for outcome in summary.outcomes.iter().filter(|o| !o.is_ok()) {
        print_failure(outcome);
    }

    if summary.dry_run {
        println!(
            "{prefix}{} to register, {} to deregister",
            summary.plan.register.len(),
            summary.plan.deregister.len()
        );
    } else {
        let failed = summary.failed();
        let failed = if failed > 0 {
            failed.to_string().red().bold().to_string()
        } else {
            failed.to_string()
        };
        println!(
            "{} {} registered, {} deregistered, {failed} failed ({} ms)",
            "✓".green().bold(),
            summary.registered(),
            summary.deregistered(),
            summary.duration_ms
        );
    }
}

fn print_failure(outcome: &MutationOutcome) {
    let verb = match outcome.kind {
        MutationKind::Register => "register",
        MutationKind::Deregister => "deregister",
    };
    println!(
        "  {} {verb} {} at {}: {}",
        "✗".red().bold(),
        outcome.service_id,
        outcome.address,
        outcome.error.as_deref().unwrap_or("unknown error")
    );
}
