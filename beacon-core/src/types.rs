//! Domain types for the topology → registry reconciler.
//!
//! Everything here is rebuilt on every reconciliation pass except
//! [`ClusterName`], which the loop discovers once and carries forward.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag that marks a registry entry as created by this reconciler.
/// Only entries carrying it are ever deregistered.
pub const OWNERSHIP_TAG: &str = "ambari";

/// Port advertised for every registered entry.
pub const SERVICE_PORT: u16 = 1080;

/// Lowercase state tag meaning "no information"; such components are ignored.
pub const UNKNOWN_STATE: &str = "unknown";

/// Synthetic state used when the manager reports an active maintenance flag.
pub const MAINTENANCE_STATE: &str = "maintenance";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Raw component identifier as reported by the cluster manager (`NAMENODE`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentType(pub String);

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ComponentType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ComponentType {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// DNS-ready service name: lowercase, underscores replaced by hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceName(pub String);

impl ServiceName {
    /// `lower(replace(raw, "_", "-"))`. Applying it twice changes nothing.
    pub fn normalize(raw: &str) -> Self {
        Self(raw.to_lowercase().replace('_', "-"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&ComponentType> for ServiceName {
    fn from(component: &ComponentType) -> Self {
        Self::normalize(&component.0)
    }
}

/// Fully-qualified host name as reported by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostName(pub String);

impl HostName {
    /// Host name up to the first `.`; the whole name when there is no dot.
    pub fn short(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for HostName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for HostName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for HostName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Name of the managed cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterName(pub String);

impl fmt::Display for ClusterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ClusterName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClusterName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Operational state in the manager's own vocabulary (`STARTED`, `INSTALLED`, …).
///
/// The vocabulary is open-ended, so the raw string is kept and only its
/// lowercase tag is compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentState(pub String);

impl ComponentState {
    pub fn maintenance() -> Self {
        Self(MAINTENANCE_STATE.to_string())
    }

    /// Lowercased state, as stored in `tags[0]` of a registry entry.
    pub fn tag(&self) -> String {
        self.0.to_lowercase()
    }

    pub fn is_unknown(&self) -> bool {
        self.0.eq_ignore_ascii_case(UNKNOWN_STATE)
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ComponentState {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ComponentState {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// One running instance of a component on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub component_type: ComponentType,
    pub host_name: HostName,
    /// Empty when the host is missing from the [`HostInventory`].
    pub ip_address: String,
    pub state: ComponentState,
}

impl Component {
    pub fn new(
        component_type: impl Into<ComponentType>,
        host_name: impl Into<HostName>,
        ip_address: impl Into<String>,
        state: impl Into<ComponentState>,
    ) -> Self {
        Self {
            component_type: component_type.into(),
            host_name: host_name.into(),
            ip_address: ip_address.into(),
            state: state.into(),
        }
    }

    pub fn service_name(&self) -> ServiceName {
        ServiceName::from(&self.component_type)
    }

    pub fn state_tag(&self) -> String {
        self.state.tag()
    }

    /// Reconciliation identity: `(serviceName, address)`. Host name and state
    /// are not part of it.
    pub fn key(&self) -> (ServiceName, &str) {
        (self.service_name(), self.ip_address.as_str())
    }

    /// `<service>.<short host>`, with every `_` in the short host replaced by `-`.
    pub fn registration_id(&self) -> String {
        format!(
            "{}.{}",
            self.service_name(),
            self.host_name.short().replace('_', "-")
        )
    }
}

// ---------------------------------------------------------------------------
// Registry entry
// ---------------------------------------------------------------------------

/// A service entry as seen in (or written to) the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: String,
    pub service_name: ServiceName,
    pub address: String,
    /// By convention `tags[0]` is the lowercased state.
    #[serde(default)]
    pub tags: Vec<String>,
    pub port: u16,
}

impl RegistryEntry {
    /// Entry that registers `component` under its derived id, owned by us.
    pub fn for_component(component: &Component) -> Self {
        Self {
            id: component.registration_id(),
            service_name: component.service_name(),
            address: component.ip_address.clone(),
            tags: vec![component.state_tag(), OWNERSHIP_TAG.to_string()],
            port: SERVICE_PORT,
        }
    }

    pub fn state_tag(&self) -> Option<&str> {
        self.tags.first().map(String::as_str)
    }

    pub fn is_owned(&self) -> bool {
        self.tags.iter().any(|t| t == OWNERSHIP_TAG)
    }
}

// ---------------------------------------------------------------------------
// Host inventory
// ---------------------------------------------------------------------------

/// Host name → IP mapping, rebuilt every pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostInventory(HashMap<String, String>);

impl HostInventory {
    /// IP for `host`, or `""` when the host is unknown to the inventory.
    pub fn ip_for(&self, host: &str) -> &str {
        self.0.get(host).map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HostInventory {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
