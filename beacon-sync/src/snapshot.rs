//! Per-pass snapshots of both sides: discovered topology and registry content.

use std::collections::HashMap;
use std::sync::Arc;

use beacon_core::{ClusterName, Component, ComponentState, RegistryEntry, ServiceName};

use crate::error::SyncError;
use crate::fanout::fan_out;
use crate::manager::{ClusterManager, HostRole, RootServiceComponent};
use crate::registry::ServiceRegistry;

/// Run one blocking closure on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, SyncError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SyncError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| SyncError::Join(err.to_string()))?
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

/// Discover every component: platform-wide ones always, cluster-scoped ones
/// only when `cluster` is known. Any failed query fails the whole snapshot.
pub async fn build_topology(
    manager: Arc<dyn ClusterManager>,
    cluster: Option<ClusterName>,
) -> Result<Vec<Component>, SyncError> {
    blocking(move || collect_topology(manager.as_ref(), cluster.as_ref())).await
}

/// Blocking body of [`build_topology`].
pub fn collect_topology(
    manager: &dyn ClusterManager,
    cluster: Option<&ClusterName>,
) -> Result<Vec<Component>, SyncError> {
    let hosts = manager.hosts()?;
    if hosts.is_empty() {
        tracing::info!("no hosts reported yet");
    }

    let mut components: Vec<Component> = manager
        .root_components()?
        .into_iter()
        .map(|root| root_component(root, |host| hosts.ip_for(host).to_string()))
        .collect();
    tracing::debug!(count = components.len(), "root components");

    if let Some(cluster) = cluster {
        let roles = manager.host_components(cluster)?;
        tracing::debug!(cluster = %cluster, count = roles.len(), "cluster components");
        components.extend(
            roles
                .into_iter()
                .map(|role| host_component(role, |host| hosts.ip_for(host).to_string())),
        );
    }

    Ok(dedupe_components(components))
}

fn root_component(root: RootServiceComponent, ip_for: impl Fn(&str) -> String) -> Component {
    let ip = ip_for(&root.host_name);
    Component::new(root.component_name, root.host_name, ip, root.state)
}

fn host_component(role: HostRole, ip_for: impl Fn(&str) -> String) -> Component {
    let state = if role.in_maintenance() {
        ComponentState::maintenance()
    } else {
        ComponentState::from(role.state)
    };
    let ip = ip_for(&role.host_name);
    Component::new(role.component_name, role.host_name, ip, state)
}

/// Keep one component per `(service, address)`: the last one seen wins, in
/// the position where that key first appeared.
pub fn dedupe_components(components: Vec<Component>) -> Vec<Component> {
    let mut positions: HashMap<(ServiceName, String), usize> = HashMap::new();
    let mut unique: Vec<Component> = Vec::with_capacity(components.len());

    for component in components {
        let key = (component.service_name(), component.ip_address.clone());
        match positions.get(&key) {
            Some(&index) => {
                tracing::debug!(
                    service = %key.0,
                    address = %key.1,
                    "duplicate component, keeping the later one",
                );
                unique[index] = component;
            }
            None => {
                positions.insert(key, unique.len());
                unique.push(component);
            }
        }
    }
    unique
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// List service names, then fetch every service's entries concurrently (at
/// most `limit` at a time). One failed fetch fails the whole read: a partial
/// view would cause false registrations.
pub async fn read_registry(
    registry: Arc<dyn ServiceRegistry>,
    limit: usize,
) -> Result<Vec<RegistryEntry>, SyncError> {
    let names = {
        let registry = Arc::clone(&registry);
        blocking(move || registry.service_names()).await?
    };
    tracing::debug!(services = names.len(), "registry catalog");

    let results = fan_out(names, limit, move |name: ServiceName| {
        tracing::debug!(service = %name, "reading service registrations");
        registry.service_entries(&name)
    })
    .await?;

    let mut entries = Vec::new();
    for result in results {
        entries.extend(result?);
    }
    Ok(entries)
}
