//! Service-registry client.
//!
//! Reads go to the local agent's catalog; writes go to the agent running on
//! the node that owns the entry, since every node runs its own agent.
//!
//! # Contract
//!
//! [`ServiceRegistry::register`] is an upsert keyed by the entry id: it must
//! replace the previous address and tag set of that id, never merge or append.
//! State transitions converge only because of this.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use beacon_core::{RegistryEntry, ServiceName};

use crate::error::{http_err, SyncError};
use crate::http::fetch_json;

pub const REGISTRY_PORT: u16 = 8500;
pub const DEFAULT_CATALOG_URL: &str = "http://localhost:8500";

/// Blocking access to the service registry.
pub trait ServiceRegistry: Send + Sync {
    /// Every distinct service name known to the catalog.
    fn service_names(&self) -> Result<Vec<ServiceName>, SyncError>;

    /// All entries registered under `service`.
    fn service_entries(&self, service: &ServiceName) -> Result<Vec<RegistryEntry>, SyncError>;

    /// Upsert `entry` on the node at `entry.address`.
    fn register(&self, entry: &RegistryEntry) -> Result<(), SyncError>;

    /// Remove `entry.id` from the node at `entry.address`.
    fn deregister(&self, entry: &RegistryEntry) -> Result<(), SyncError>;
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogService {
    #[serde(rename = "ServiceID", default)]
    service_id: String,
    #[serde(default)]
    service_name: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    service_tags: Option<Vec<String>>,
    #[serde(default)]
    service_port: u16,
}

impl From<CatalogService> for RegistryEntry {
    fn from(s: CatalogService) -> Self {
        RegistryEntry {
            id: s.service_id,
            service_name: ServiceName(s.service_name),
            address: s.address,
            tags: s.service_tags.unwrap_or_default(),
            port: s.service_port,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    address: &'a str,
    port: u16,
    tags: &'a [String],
}

impl<'a> From<&'a RegistryEntry> for AgentRegistration<'a> {
    fn from(entry: &'a RegistryEntry) -> Self {
        Self {
            id: &entry.id,
            name: entry.service_name.as_str(),
            address: &entry.address,
            port: entry.port,
            tags: &entry.tags,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// [`ServiceRegistry`] over the Consul HTTP API.
#[derive(Clone)]
pub struct ConsulClient {
    agent: ureq::Agent,
    catalog_url: String,
    agent_port: u16,
}

impl ConsulClient {
    pub fn new(agent: ureq::Agent) -> Self {
        Self {
            agent,
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            agent_port: REGISTRY_PORT,
        }
    }

    fn node_url(&self, address: &str, path: &str) -> String {
        format!("http://{address}:{}{path}", self.agent_port)
    }

    /// Check a write response: the agent answers success with an empty body.
    fn expect_empty(
        operation: &'static str,
        id: &str,
        url: &str,
        result: Result<ureq::Response, ureq::Error>,
    ) -> Result<(), SyncError> {
        let body = result
            .map_err(|err| http_err(url, err))?
            .into_string()
            .map_err(|source| SyncError::Body {
                url: url.to_string(),
                source,
            })?;
        if body.trim().is_empty() {
            Ok(())
        } else {
            Err(SyncError::Rejected {
                operation,
                id: id.to_string(),
                message: body.trim().to_string(),
            })
        }
    }
}

impl ServiceRegistry for ConsulClient {
    fn service_names(&self) -> Result<Vec<ServiceName>, SyncError> {
        let url = format!("{}/v1/catalog/services", self.catalog_url);
        let catalog: HashMap<String, serde_json::Value> =
            fetch_json(&url, self.agent.get(&url))?;
        let mut names: Vec<ServiceName> = catalog.into_keys().map(ServiceName).collect();
        names.sort();
        Ok(names)
    }

    fn service_entries(&self, service: &ServiceName) -> Result<Vec<RegistryEntry>, SyncError> {
        let url = format!("{}/v1/catalog/service/{service}", self.catalog_url);
        let services: Option<Vec<CatalogService>> = fetch_json(&url, self.agent.get(&url))?;
        Ok(services
            .unwrap_or_default()
            .into_iter()
            .map(RegistryEntry::from)
            .collect())
    }

    fn register(&self, entry: &RegistryEntry) -> Result<(), SyncError> {
        let url = self.node_url(&entry.address, "/v1/agent/service/register");
        tracing::info!(
            id = %entry.id,
            address = %entry.address,
            tags = ?entry.tags,
            "registering service",
        );
        let result = self.agent.put(&url).send_json(AgentRegistration::from(entry));
        Self::expect_empty("register", &entry.id, &url, result)
    }

    fn deregister(&self, entry: &RegistryEntry) -> Result<(), SyncError> {
        let url = self.node_url(
            &entry.address,
            &format!("/v1/agent/service/deregister/{}", entry.id),
        );
        tracing::info!(id = %entry.id, address = %entry.address, "deregistering service");
        let result = self.agent.put(&url).call();
        Self::expect_empty("deregister", &entry.id, &url, result)
    }
}

// ---------------------------------------------------------------------------
// In-memory registry
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryRegistry;

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::collections::{BTreeMap, HashSet};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    use beacon_core::{RegistryEntry, ServiceName};

    use super::ServiceRegistry;
    use crate::error::SyncError;

    #[derive(Default)]
    struct State {
        /// Keyed by `(address, id)`: one agent per node, ids unique per agent.
        entries: BTreeMap<(String, String), RegistryEntry>,
        failing_reads: HashSet<ServiceName>,
        rejected_ids: HashSet<String>,
    }

    /// Registry with upsert-by-id semantics, for tests.
    #[derive(Default)]
    pub struct InMemoryRegistry {
        state: Mutex<State>,
    }

    impl InMemoryRegistry {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_entries(entries: impl IntoIterator<Item = RegistryEntry>) -> Self {
            let registry = Self::new();
            for entry in entries {
                registry.insert(entry);
            }
            registry
        }

        fn lock(&self) -> MutexGuard<'_, State> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Store `entry` directly, as if another actor registered it.
        pub fn insert(&self, entry: RegistryEntry) {
            let mut state = self.lock();
            state
                .entries
                .insert((entry.address.clone(), entry.id.clone()), entry);
        }

        /// Snapshot sorted by `(address, id)`.
        pub fn entries(&self) -> Vec<RegistryEntry> {
            let state = self.lock();
            state.entries.values().cloned().collect()
        }

        /// Make `service_entries(service)` fail from now on.
        pub fn fail_reads_for(&self, service: impl Into<String>) {
            let mut state = self.lock();
            state.failing_reads.insert(ServiceName(service.into()));
        }

        /// Make writes touching `id` fail from now on.
        pub fn reject_writes_for(&self, id: impl Into<String>) {
            let mut state = self.lock();
            state.rejected_ids.insert(id.into());
        }

        fn check_write(state: &State, operation: &'static str, id: &str) -> Result<(), SyncError> {
            if state.rejected_ids.contains(id) {
                return Err(SyncError::Rejected {
                    operation,
                    id: id.to_string(),
                    message: "rejected by test registry".to_string(),
                });
            }
            Ok(())
        }
    }

    impl ServiceRegistry for InMemoryRegistry {
        fn service_names(&self) -> Result<Vec<ServiceName>, SyncError> {
            let state = self.lock();
            let mut names: Vec<ServiceName> = state
                .entries
                .values()
                .map(|e| e.service_name.clone())
                .collect();
            names.sort();
            names.dedup();
            Ok(names)
        }

        fn service_entries(&self, service: &ServiceName) -> Result<Vec<RegistryEntry>, SyncError> {
            let state = self.lock();
            if state.failing_reads.contains(service) {
                return Err(SyncError::Rejected {
                    operation: "read",
                    id: service.to_string(),
                    message: "read failure injected by test registry".to_string(),
                });
            }
            Ok(state
                .entries
                .values()
                .filter(|e| &e.service_name == service)
                .cloned()
                .collect())
        }

        fn register(&self, entry: &RegistryEntry) -> Result<(), SyncError> {
            let mut state = self.lock();
            Self::check_write(&state, "register", &entry.id)?;
            state
                .entries
                .insert((entry.address.clone(), entry.id.clone()), entry.clone());
            Ok(())
        }

        fn deregister(&self, entry: &RegistryEntry) -> Result<(), SyncError> {
            let mut state = self.lock();
            Self::check_write(&state, "deregister", &entry.id)?;
            state
                .entries
                .remove(&(entry.address.clone(), entry.id.clone()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::Component;

    #[test]
    fn catalog_entry_maps_service_fields() {
        let json = r#"[{
            "ID": "node-uuid",
            "Node": "h1",
            "Address": "10.0.0.1",
            "ServiceID": "namenode.h1",
            "ServiceName": "namenode",
            "ServiceTags": ["started", "ambari"],
            "ServicePort": 1080
        }]"#;
        let services: Vec<CatalogService> = serde_json::from_str(json).expect("decode");
        let entry = RegistryEntry::from(services.into_iter().next().expect("one entry"));
        assert_eq!(entry.id, "namenode.h1");
        assert_eq!(entry.service_name.as_str(), "namenode");
        assert_eq!(entry.address, "10.0.0.1");
        assert_eq!(entry.state_tag(), Some("started"));
        assert!(entry.is_owned());
    }

    #[test]
    fn null_tags_become_empty() {
        let json = r#"{"ServiceID":"consul","ServiceName":"consul","Address":"10.0.0.9","ServiceTags":null}"#;
        let service: CatalogService = serde_json::from_str(json).expect("decode");
        let entry = RegistryEntry::from(service);
        assert!(entry.tags.is_empty());
        assert!(!entry.is_owned());
    }

    #[test]
    fn registration_body_uses_agent_field_names() {
        let component = Component::new("NAMENODE", "h1.dom", "10.0.0.1", "STARTED");
        let entry = RegistryEntry::for_component(&component);
        let body = serde_json::to_value(AgentRegistration::from(&entry)).expect("encode");
        assert_eq!(
            body,
            serde_json::json!({
                "ID": "namenode.h1",
                "Name": "namenode",
                "Address": "10.0.0.1",
                "Port": 1080,
                "Tags": ["started", "ambari"],
            })
        );
    }

    #[test]
    fn writes_target_owning_node() {
        let client = ConsulClient::new(ureq::agent());
        assert_eq!(
            client.node_url("10.0.0.7", "/v1/agent/service/register"),
            "http://10.0.0.7:8500/v1/agent/service/register"
        );
    }

    #[test]
    fn in_memory_register_replaces_tags_under_same_id() {
        let registry = InMemoryRegistry::new();
        let started = Component::new("NAMENODE", "h1.dom", "10.0.0.1", "STARTED");
        let installed = Component::new("NAMENODE", "h1.dom", "10.0.0.1", "INSTALLED");

        registry.register(&RegistryEntry::for_component(&started)).expect("register");
        registry.register(&RegistryEntry::for_component(&installed)).expect("re-register");

        let entries = registry.entries();
        assert_eq!(entries.len(), 1, "upsert must not duplicate");
        assert_eq!(entries[0].state_tag(), Some("installed"));
    }

    // -----------------------------------------------------------------------
    // Against a live HTTP endpoint
    // -----------------------------------------------------------------------

    use crate::test_server::OneShotServer;

    fn client_for(server: &OneShotServer) -> ConsulClient {
        ConsulClient {
            agent: ureq::agent(),
            catalog_url: server.url(),
            agent_port: server.port(),
        }
    }

    fn local_entry(state: &str) -> RegistryEntry {
        RegistryEntry::for_component(&Component::new("NAMENODE", "h1.dom", "127.0.0.1", state))
    }

    #[test]
    fn register_puts_json_to_owning_node() {
        let server = OneShotServer::respond(200, "");
        let client = client_for(&server);

        client.register(&local_entry("STARTED")).expect("register");

        let request = server.captured();
        assert_eq!(request.method, "PUT");
        assert_eq!(request.path, "/v1/agent/service/register");
        let body: serde_json::Value = serde_json::from_str(&request.body).expect("json body");
        assert_eq!(body["ID"], "namenode.h1");
        assert_eq!(body["Address"], "127.0.0.1");
        assert_eq!(body["Tags"], serde_json::json!(["started", "ambari"]));
    }

    #[test]
    fn reregister_sends_full_replacement_tags() {
        let server = OneShotServer::respond(200, "");
        let client = client_for(&server);

        client.register(&local_entry("INSTALLED")).expect("register");

        let body: serde_json::Value =
            serde_json::from_str(&server.captured().body).expect("json body");
        assert_eq!(body["ID"], "namenode.h1");
        assert_eq!(body["Tags"], serde_json::json!(["installed", "ambari"]));
    }

    #[test]
    fn deregister_puts_to_id_path() {
        let server = OneShotServer::respond(200, "");
        let client = client_for(&server);

        client.deregister(&local_entry("STARTED")).expect("deregister");

        let request = server.captured();
        assert_eq!(request.method, "PUT");
        assert_eq!(request.path, "/v1/agent/service/deregister/namenode.h1");
    }

    #[test]
    fn write_with_non_empty_body_is_rejected() {
        let server = OneShotServer::respond(200, "Unknown service ID");
        let client = client_for(&server);

        let err = client.deregister(&local_entry("STARTED")).unwrap_err();
        server.captured();
        match err {
            SyncError::Rejected { operation, id, message } => {
                assert_eq!(operation, "deregister");
                assert_eq!(id, "namenode.h1");
                assert_eq!(message, "Unknown service ID");
            }
            other => panic!("expected Rejected, got {other}"),
        }
    }

    #[test]
    fn write_with_server_error_reports_status() {
        let server = OneShotServer::respond(500, "agent unavailable");
        let client = client_for(&server);

        let err = client.register(&local_entry("STARTED")).unwrap_err();
        server.captured();
        match err {
            SyncError::Status { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "agent unavailable");
            }
            other => panic!("expected Status, got {other}"),
        }
    }

    #[test]
    fn null_catalog_body_means_no_entries() {
        let server = OneShotServer::respond(200, "null");
        let client = client_for(&server);

        let entries = client
            .service_entries(&ServiceName("namenode".to_string()))
            .expect("entries");
        assert!(entries.is_empty());
        let request = server.captured();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/v1/catalog/service/namenode");
    }

    #[test]
    fn service_names_are_sorted_keys() {
        let server = OneShotServer::respond(200, r#"{"zookeeper":["ambari"],"consul":[],"datanode":[]}"#);
        let client = client_for(&server);

        let names = client.service_names().expect("names");
        assert_eq!(server.captured().path, "/v1/catalog/services");
        let names: Vec<&str> = names.iter().map(ServiceName::as_str).collect();
        assert_eq!(names, ["consul", "datanode", "zookeeper"]);
    }
}
