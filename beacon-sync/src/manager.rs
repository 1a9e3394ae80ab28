//! Cluster-manager client.
//!
//! [`ClusterManager`] is the seam the pipeline talks to; [`AmbariClient`] is
//! the HTTP implementation. Calls are blocking and run on tokio's blocking
//! pool when the pipeline fans them out.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;

use beacon_core::{ClusterName, HostInventory, ManagerConfig};

use crate::error::SyncError;
use crate::http::fetch_json;

pub const MANAGER_PORT: u16 = 8080;
const REQUESTED_BY_HEADER: &str = "X-Requested-By";
const REQUESTED_BY_VALUE: &str = "ambari";

const CLUSTERS_PATH: &str = "/clusters";
const HOSTS_PATH: &str = "/hosts?fields=Hosts/ip";
const HOST_COMPONENT_FIELDS: &str =
    "fields=host_components/HostRoles/state/*,host_components/HostRoles/maintenance_state";
const ROOT_COMPONENTS_PATH: &str = "/services/?fields=components/hostComponents/RootServiceHostComponents/service_name,components/hostComponents/RootServiceHostComponents/component_state";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A cluster-scoped component as reported on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRole {
    pub component_name: String,
    pub host_name: String,
    pub state: String,
    pub maintenance_state: String,
}

impl HostRole {
    /// Any maintenance value other than `OFF` (or nothing) counts as active:
    /// `ON`, `IMPLIED_FROM_SERVICE`, `IMPLIED_FROM_HOST`,
    /// `IMPLIED_FROM_SERVICE_AND_HOST`.
    pub fn in_maintenance(&self) -> bool {
        let flag = self.maintenance_state.trim();
        !flag.is_empty() && !flag.eq_ignore_ascii_case("OFF")
    }
}

/// A platform-wide component, not tied to a cluster (the manager's own agents).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootServiceComponent {
    pub component_name: String,
    pub host_name: String,
    pub state: String,
}

/// Read-only view of the cluster manager's topology.
pub trait ClusterManager: Send + Sync {
    /// Name of the first cluster, or `None` if no cluster exists yet.
    fn cluster_name(&self) -> Result<Option<ClusterName>, SyncError>;

    fn hosts(&self) -> Result<HostInventory, SyncError>;

    fn host_components(&self, cluster: &ClusterName) -> Result<Vec<HostRole>, SyncError>;

    fn root_components(&self) -> Result<Vec<RootServiceComponent>, SyncError>;
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Items<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ClusterItem {
    #[serde(rename = "Clusters", default)]
    cluster: ClusterInfo,
}

#[derive(Debug, Default, Deserialize)]
struct ClusterInfo {
    #[serde(default)]
    cluster_name: String,
}

#[derive(Debug, Deserialize)]
struct HostItem {
    #[serde(rename = "Hosts", default)]
    host: HostInfo,
}

#[derive(Debug, Default, Deserialize)]
struct HostInfo {
    #[serde(default)]
    host_name: String,
    #[serde(default)]
    ip: String,
}

#[derive(Debug, Deserialize)]
struct HostComponentsItem {
    #[serde(rename = "Hosts", default)]
    host: HostInfo,
    #[serde(default)]
    host_components: Vec<HostComponentEntry>,
}

#[derive(Debug, Deserialize)]
struct HostComponentEntry {
    #[serde(rename = "HostRoles", default)]
    role: HostRoleInfo,
}

#[derive(Debug, Default, Deserialize)]
struct HostRoleInfo {
    #[serde(default)]
    component_name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    maintenance_state: String,
}

#[derive(Debug, Deserialize)]
struct RootServiceItem {
    #[serde(default)]
    components: Vec<RootComponentGroup>,
}

#[derive(Debug, Deserialize)]
struct RootComponentGroup {
    #[serde(rename = "hostComponents", default)]
    host_components: Vec<RootHostComponentEntry>,
}

#[derive(Debug, Deserialize)]
struct RootHostComponentEntry {
    #[serde(rename = "RootServiceHostComponents", default)]
    component: RootHostComponentInfo,
}

#[derive(Debug, Default, Deserialize)]
struct RootHostComponentInfo {
    #[serde(default)]
    component_name: String,
    #[serde(default)]
    component_state: String,
    #[serde(default)]
    host_name: String,
}

fn first_cluster(response: Items<ClusterItem>) -> Option<ClusterName> {
    response
        .items
        .into_iter()
        .map(|item| item.cluster.cluster_name)
        .find(|name| !name.is_empty())
        .map(ClusterName::from)
}

fn inventory(response: Items<HostItem>) -> HostInventory {
    response
        .items
        .into_iter()
        .map(|item| (item.host.host_name, item.host.ip))
        .collect()
}

fn host_roles(response: Items<HostComponentsItem>) -> Vec<HostRole> {
    response
        .items
        .into_iter()
        .flat_map(|item| {
            let host_name = item.host.host_name;
            item.host_components.into_iter().map(move |entry| HostRole {
                component_name: entry.role.component_name,
                host_name: host_name.clone(),
                state: entry.role.state,
                maintenance_state: entry.role.maintenance_state,
            })
        })
        .collect()
}

fn root_components(response: Items<RootServiceItem>) -> Vec<RootServiceComponent> {
    response
        .items
        .into_iter()
        .flat_map(|item| item.components)
        .flat_map(|group| group.host_components)
        .map(|entry| RootServiceComponent {
            component_name: entry.component.component_name,
            host_name: entry.component.host_name,
            state: entry.component.component_state,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// [`ClusterManager`] over the manager's REST API (`/api/v1`).
#[derive(Clone)]
pub struct AmbariClient {
    agent: ureq::Agent,
    base_url: String,
    authorization: String,
}

impl AmbariClient {
    pub fn new(agent: ureq::Agent, config: &ManagerConfig) -> Self {
        let token = BASE64.encode(format!("{}:{}", config.username, config.password));
        Self {
            agent,
            base_url: format!("http://{}:{MANAGER_PORT}/api/v1", config.address),
            authorization: format!("Basic {token}"),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let url = format!("{}{path}", self.base_url);
        let request = self
            .agent
            .get(&url)
            .set(REQUESTED_BY_HEADER, REQUESTED_BY_VALUE)
            .set("Authorization", &self.authorization);
        fetch_json(&url, request)
    }
}

impl ClusterManager for AmbariClient {
    fn cluster_name(&self) -> Result<Option<ClusterName>, SyncError> {
        let cluster = first_cluster(self.get(CLUSTERS_PATH)?);
        match &cluster {
            Some(name) => tracing::info!(cluster = %name, "found cluster"),
            None => tracing::info!("no cluster defined yet"),
        }
        Ok(cluster)
    }

    fn hosts(&self) -> Result<HostInventory, SyncError> {
        let hosts = inventory(self.get(HOSTS_PATH)?);
        tracing::debug!(hosts = hosts.len(), "fetched host inventory");
        Ok(hosts)
    }

    fn host_components(&self, cluster: &ClusterName) -> Result<Vec<HostRole>, SyncError> {
        let path = format!("/clusters/{cluster}/hosts?{HOST_COMPONENT_FIELDS}");
        Ok(host_roles(self.get(&path)?))
    }

    fn root_components(&self) -> Result<Vec<RootServiceComponent>, SyncError> {
        Ok(root_components(self.get(ROOT_COMPONENTS_PATH)?))
    }
}
