use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use beacon_core::config::{self, read_manager_config, wait_for_manager_config, FILE_WAIT_BACKOFF};
use beacon_core::{BootstrapPaths, ManagerConfig};
use beacon_sync::fanout::DEFAULT_CONCURRENCY;
use beacon_sync::http::{build_agent, DEFAULT_REQUEST_TIMEOUT};
use beacon_sync::{
    run_pass, AmbariClient, ClusterManager, ConsulClient, PassSummary, ReconcileContext,
    ServiceRegistry,
};

use crate::error::{io_err, DaemonError};
use crate::log_rotation::{MAX_LOG_BYTES, MAX_ROTATED_FILES};
use crate::logging::{init_tracing, LogFile};
use crate::paths::{log_file_from_lookup, ROTATION_CHECK_INTERVAL};

/// Everything the daemon reads from its environment.
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub paths: BootstrapPaths,
    pub interval: Duration,
    pub log_file: PathBuf,
    pub concurrency: usize,
    pub request_timeout: Duration,
}

impl DaemonSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            paths: BootstrapPaths::from_lookup(&lookup),
            interval: config::parse_poll_interval(lookup(config::ENV_POLL_INTERVAL).as_deref()),
            log_file: log_file_from_lookup(&lookup),
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Start the daemon, logging to the configured file, and block the current
/// thread until it exits.
pub fn start_blocking(settings: DaemonSettings) -> Result<(), DaemonError> {
    let log = LogFile::open(&settings.log_file);
    init_tracing(log.clone());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(settings, log))
}

/// Run the daemon: wait for bootstrap configuration, then reconcile until
/// ctrl-c. `log` is rotated in the background.
pub async fn run(settings: DaemonSettings, log: LogFile) -> Result<(), DaemonError> {
    tracing::info!(
        interval = ?settings.interval,
        concurrency = settings.concurrency,
        "starting beacon daemon",
    );

    let config = tokio::select! {
        config = wait_for_manager_config(&settings.paths, FILE_WAIT_BACKOFF) => config?,
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|err| DaemonError::Runtime(format!("ctrl-c handler failed: {err}")))?;
            tracing::info!("received ctrl-c before configuration was available");
            return Ok(())
        }
    };
    let (manager, registry) = connect(&settings, &config);

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let loop_handle = {
        let shutdown = shutdown_tx.clone();
        let ctx = ReconcileContext {
            concurrency: settings.concurrency,
            ..ReconcileContext::default()
        };
        let interval = settings.interval;
        tokio::spawn(async move {
            let result =
                reconcile_loop(ctx, manager, registry, interval, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(log, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Runtime(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (loop_result, rotation_result, signal_result) =
        tokio::join!(loop_handle, rotation_handle, signal_handle);

    handle_join("reconcile_loop", loop_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("beacon daemon stopped");
    Ok(())
}

/// One pass against the live endpoints, without waiting for configuration.
pub async fn run_once(settings: &DaemonSettings, dry_run: bool) -> Result<PassSummary, DaemonError> {
    let config = read_manager_config(&settings.paths)?.ok_or_else(|| {
        DaemonError::NotConfigured {
            credentials: settings.paths.credentials.clone(),
            server: settings.paths.server.clone(),
        }
    })?;
    let (manager, registry) = connect(settings, &config);
    let mut ctx = ReconcileContext {
        concurrency: settings.concurrency,
        dry_run,
        ..ReconcileContext::default()
    };
    Ok(run_pass(&mut ctx, manager, registry).await?)
}

/// Both clients share one agent and its connection pool.
fn connect(
    settings: &DaemonSettings,
    config: &ManagerConfig,
) -> (Arc<dyn ClusterManager>, Arc<dyn ServiceRegistry>) {
    let agent = build_agent(settings.request_timeout);
    let manager = AmbariClient::new(agent.clone(), config);
    tracing::info!(url = manager.base_url(), "cluster manager endpoint");
    (Arc::new(manager), Arc::new(ConsulClient::new(agent)))
}

/// Pass, log, sleep, repeat until `shutdown_rx` fires. A failed pass is
/// logged and retried on the next tick; it never ends the loop.
pub async fn reconcile_loop(
    mut ctx: ReconcileContext,
    manager: Arc<dyn ClusterManager>,
    registry: Arc<dyn ServiceRegistry>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        match run_pass(&mut ctx, Arc::clone(&manager), Arc::clone(&registry)).await {
            Ok(summary) => log_summary(&summary),
            Err(err) => tracing::error!(error = %err, "reconciliation pass failed"),
        }

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    Ok(())
}

fn log_summary(summary: &PassSummary) {
    tracing::info!(
        cluster = summary.cluster.as_ref().map(|c| c.0.as_str()).unwrap_or("-"),
        components = summary.components,
        registry_entries = summary.registry_entries,
        registered = summary.registered(),
        deregistered = summary.deregistered(),
        failed = summary.failed(),
        duration_ms = summary.duration_ms as u64,
        "reconciliation pass finished",
    );
}

async fn log_rotation_task(
    log: LogFile,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(ROTATION_CHECK_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // first tick is immediate

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let log_path = log.path().map(|p| p.display().to_string());
                let log = log.clone();
                let rotated = tokio::task::spawn_blocking(move || {
                    log.rotate(MAX_LOG_BYTES, MAX_ROTATED_FILES)
                })
                .await
                .map_err(|err| DaemonError::Runtime(format!("log rotation join error: {err}")))?;
                match rotated {
                    Ok(true) => tracing::info!(path = ?log_path, "log file rotated"),
                    Ok(false) => {}
                    Err(err) => tracing::warn!(error = %err, "log rotation failed"),
                }
            }
        }
    }
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Runtime(format!("{task} task join failure: {err}"))),
    }
}
