//! One reconciliation pass, shared by `beacon once` and the daemon loop.
//!
//! resolve cluster (non-fatal) → topology → registry → plan → deregister →
//! register. A failed read aborts the pass before anything is written.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use beacon_core::ClusterName;

use crate::diff::{self, Plan};
use crate::error::SyncError;
use crate::fanout::DEFAULT_CONCURRENCY;
use crate::manager::ClusterManager;
use crate::mutator::{self, MutationKind, MutationOutcome};
use crate::registry::ServiceRegistry;
use crate::snapshot::{self, blocking};

/// State carried from one pass to the next.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    /// Discovered once, then kept for the life of the process.
    pub cluster: Option<ClusterName>,
    /// Cap on concurrent registry calls per phase.
    pub concurrency: usize,
    /// Compute and report the plan without writing anything.
    pub dry_run: bool,
}

impl Default for ReconcileContext {
    fn default() -> Self {
        Self {
            cluster: None,
            concurrency: DEFAULT_CONCURRENCY,
            dry_run: false,
        }
    }
}

/// What one pass saw and did.
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub started_at: DateTime<Utc>,
    pub cluster: Option<ClusterName>,
    pub components: usize,
    pub registry_entries: usize,
    pub dry_run: bool,
    pub plan: Plan,
    pub outcomes: Vec<MutationOutcome>,
    pub duration_ms: u128,
}

impl PassSummary {
    fn count(&self, kind: MutationKind) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.kind == kind && o.is_ok())
            .count()
    }

    pub fn registered(&self) -> usize {
        self.count(MutationKind::Register)
    }

    pub fn deregistered(&self) -> usize {
        self.count(MutationKind::Deregister)
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_ok()).count()
    }
}

/// Look the cluster up if it is not cached yet. Failures only mean
/// cluster-scoped components are skipped this pass.
async fn resolve_cluster(ctx: &mut ReconcileContext, manager: &Arc<dyn ClusterManager>) {
    if ctx.cluster.is_some() {
        return;
    }
    let manager = Arc::clone(manager);
    match blocking(move || manager.cluster_name()).await {
        Ok(Some(cluster)) => ctx.cluster = Some(cluster),
        Ok(None) => tracing::info!("cluster not found yet, skipping cluster components"),
        Err(err) => tracing::warn!(error = %err, "cluster name cannot be determined"),
    }
}

/// Run a single pass.
pub async fn run_pass(
    ctx: &mut ReconcileContext,
    manager: Arc<dyn ClusterManager>,
    registry: Arc<dyn ServiceRegistry>,
) -> Result<PassSummary, SyncError> {
    let started_at = Utc::now();
    let started = Instant::now();

    resolve_cluster(ctx, &manager).await;

    let components = snapshot::build_topology(manager, ctx.cluster.clone()).await?;
    let entries = snapshot::read_registry(Arc::clone(&registry), ctx.concurrency).await?;
    let plan = diff::plan(&components, &entries);

    tracing::info!(
        components = components.len(),
        registry_entries = entries.len(),
        to_register = plan.register.len(),
        to_deregister = plan.deregister.len(),
        dry_run = ctx.dry_run,
        "computed reconciliation plan",
    );

    let mut outcomes = Vec::new();
    if !ctx.dry_run {
        if !plan.deregister.is_empty() {
            outcomes.extend(
                mutator::deregister_all(
                    Arc::clone(&registry),
                    plan.deregister.clone(),
                    ctx.concurrency,
                )
                .await?,
            );
        }
        if !plan.register.is_empty() {
            outcomes.extend(
                mutator::register_all(registry, plan.register.clone(), ctx.concurrency).await?,
            );
        }
    }

    Ok(PassSummary {
        started_at,
        cluster: ctx.cluster.clone(),
        components: components.len(),
        registry_entries: entries.len(),
        dry_run: ctx.dry_run,
        plan,
        outcomes,
        duration_ms: started.elapsed().as_millis(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use beacon_core::{Component, HostInventory, RegistryEntry, ServiceName, OWNERSHIP_TAG};

    use super::*;
    use crate::manager::{HostRole, RootServiceComponent};
    use crate::registry::InMemoryRegistry;

    /// Topology that tests can rewrite between passes.
    #[derive(Default)]
    struct ScriptedManager {
        cluster: Mutex<Option<&'static str>>,
        cluster_lookups: Mutex<usize>,
        hosts: Vec<(&'static str, &'static str)>,
        roles: Mutex<Vec<HostRole>>,
        roots: Vec<RootServiceComponent>,
        hosts_down: Mutex<bool>,
    }

    impl ScriptedManager {
        fn set_roles(&self, roles: Vec<HostRole>) {
            *self.roles.lock().expect("lock") = roles;
        }
    }

    impl ClusterManager for ScriptedManager {
        fn cluster_name(&self) -> Result<Option<ClusterName>, SyncError> {
            *self.cluster_lookups.lock().expect("lock") += 1;
            Ok(self.cluster.lock().expect("lock").map(ClusterName::from))
        }

        fn hosts(&self) -> Result<HostInventory, SyncError> {
            if *self.hosts_down.lock().expect("lock") {
                return Err(SyncError::Join("manager unreachable".into()));
            }
            Ok(self.hosts.iter().copied().collect())
        }

        fn host_components(&self, _cluster: &ClusterName) -> Result<Vec<HostRole>, SyncError> {
            Ok(self.roles.lock().expect("lock").clone())
        }

        fn root_components(&self) -> Result<Vec<RootServiceComponent>, SyncError> {
            Ok(self.roots.clone())
        }
    }

    fn role(name: &str, host: &str, state: &str) -> HostRole {
        HostRole {
            component_name: name.into(),
            host_name: host.into(),
            state: state.into(),
            maintenance_state: "OFF".into(),
        }
    }

    fn cluster_manager() -> Arc<ScriptedManager> {
        Arc::new(ScriptedManager {
            cluster: Mutex::new(Some("c1")),
            hosts: vec![("h1.dom", "10.0.0.1"), ("h2.dom", "10.0.0.2")],
            roles: Mutex::new(vec![
                role("NAMENODE", "h1.dom", "STARTED"),
                role("DATANODE", "h2.dom", "STARTED"),
            ]),
            ..ScriptedManager::default()
        })
    }

    fn foreign_entry() -> RegistryEntry {
        RegistryEntry {
            id: "consul".into(),
            service_name: ServiceName("consul".into()),
            address: "10.0.0.9".into(),
            tags: vec![],
            port: 8300,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn first_pass_registers_everything_second_is_a_no_op() {
        let manager = cluster_manager();
        let registry = Arc::new(InMemoryRegistry::with_entries([foreign_entry()]));
        let mut ctx = ReconcileContext::default();

        let first = run_pass(&mut ctx, manager.clone(), registry.clone())
            .await
            .expect("first pass");
        assert_eq!(first.registered(), 2);
        assert_eq!(first.failed(), 0);
        assert_eq!(ctx.cluster, Some(ClusterName::from("c1")));

        let second = run_pass(&mut ctx, manager.clone(), registry.clone())
            .await
            .expect("second pass");
        assert!(second.plan.is_empty(), "converged registry needs no changes");
        assert_eq!(*manager.cluster_lookups.lock().expect("lock"), 1, "cluster is cached");
        assert_eq!(registry.entries().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn state_change_replaces_tag_and_removal_drains() {
        let manager = cluster_manager();
        let registry = Arc::new(InMemoryRegistry::new());
        let mut ctx = ReconcileContext::default();
        run_pass(&mut ctx, manager.clone(), registry.clone()).await.expect("seed");

        manager.set_roles(vec![
            role("NAMENODE", "h1.dom", "INSTALLED"),
            role("DATANODE", "h2.dom", "STARTED"),
        ]);
        let changed = run_pass(&mut ctx, manager.clone(), registry.clone())
            .await
            .expect("state change");
        assert_eq!(changed.plan.register.len(), 1);
        assert!(changed.plan.deregister.is_empty());
        let namenode = registry
            .entries()
            .into_iter()
            .find(|e| e.id == "namenode.h1")
            .expect("namenode entry");
        assert_eq!(namenode.tags, vec!["installed".to_string(), OWNERSHIP_TAG.to_string()]);

        manager.set_roles(vec![]);
        let drained = run_pass(&mut ctx, manager.clone(), registry.clone())
            .await
            .expect("drain");
        assert_eq!(drained.deregistered(), 2);
        assert!(registry.entries().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_topology_read_writes_nothing() {
        let manager = cluster_manager();
        *manager.hosts_down.lock().expect("lock") = true;
        let seeded = RegistryEntry::for_component(&Component::new(
            "NAMENODE", "h1.dom", "10.0.0.1", "STARTED",
        ));
        let registry = Arc::new(InMemoryRegistry::with_entries([seeded.clone()]));
        let mut ctx = ReconcileContext::default();

        assert!(run_pass(&mut ctx, manager, registry.clone()).await.is_err());
        assert_eq!(registry.entries(), vec![seeded]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_cluster_still_reconciles_root_components() {
        let manager = Arc::new(ScriptedManager {
            hosts: vec![("m.dom", "10.0.0.5")],
            roots: vec![RootServiceComponent {
                component_name: "AMBARI_SERVER".into(),
                host_name: "m.dom".into(),
                state: "STARTED".into(),
            }],
            ..ScriptedManager::default()
        });
        let registry = Arc::new(InMemoryRegistry::new());
        let mut ctx = ReconcileContext::default();

        let summary = run_pass(&mut ctx, manager, registry.clone()).await.expect("pass");
        assert!(ctx.cluster.is_none());
        assert_eq!(summary.registered(), 1);
        assert_eq!(registry.entries()[0].id, "ambari-server.m");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dry_run_leaves_registry_untouched() {
        let manager = cluster_manager();
        let registry = Arc::new(InMemoryRegistry::new());
        let mut ctx = ReconcileContext {
            dry_run: true,
            ..ReconcileContext::default()
        };

        let summary = run_pass(&mut ctx, manager, registry.clone()).await.expect("pass");
        assert_eq!(summary.plan.register.len(), 2);
        assert!(summary.outcomes.is_empty());
        assert!(registry.entries().is_empty());
    }
}
