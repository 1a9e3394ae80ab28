//! Diff engine: what to register and what to deregister.
//!
//! Pure functions over one pass's snapshots. The two directions are computed
//! independently:
//!
//! - [`to_register`] matches on `(service, address, state tag)`, so a state
//!   change re-registers the component under the same id with the new tag.
//! - [`to_deregister`] matches on `(service, address)` only, and only looks at
//!   entries carrying the ownership tag, so a state change never removes the
//!   entry it is about to overwrite.

use std::collections::HashSet;

use serde::Serialize;

use beacon_core::{Component, RegistryEntry, ServiceName};

/// Both halves of one pass's diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub register: Vec<Component>,
    pub deregister: Vec<RegistryEntry>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.register.is_empty() && self.deregister.is_empty()
    }
}

/// Compute both halves at once.
pub fn plan(components: &[Component], entries: &[RegistryEntry]) -> Plan {
    Plan {
        register: to_register(components, entries),
        deregister: to_deregister(components, entries),
    }
}

/// Components with a known state that have no entry with the same service,
/// address and state tag.
pub fn to_register(components: &[Component], entries: &[RegistryEntry]) -> Vec<Component> {
    let satisfied: HashSet<(&str, &str, &str)> = entries
        .iter()
        .filter_map(|e| {
            e.state_tag()
                .map(|tag| (e.service_name.as_str(), e.address.as_str(), tag))
        })
        .collect();

    components
        .iter()
        .filter(|component| {
            let service = component.service_name();
            if component.state.is_unknown() {
                tracing::debug!(service = %service, host = %component.host_name, "state unknown, skipped");
                return false;
            }
            let tag = component.state_tag();
            let registered =
                satisfied.contains(&(service.as_str(), component.ip_address.as_str(), tag.as_str()));
            if registered {
                tracing::debug!(
                    service = %service,
                    address = %component.ip_address,
                    state = %tag,
                    "already registered",
                );
            }
            !registered
        })
        .cloned()
        .collect()
}

/// Owned entries whose `(service, address)` matches no discovered component,
/// whatever that component's state.
pub fn to_deregister(components: &[Component], entries: &[RegistryEntry]) -> Vec<RegistryEntry> {
    let active: HashSet<(ServiceName, &str)> = components.iter().map(Component::key).collect();

    entries
        .iter()
        .filter(|entry| entry.is_owned())
        .filter(|entry| !active.contains(&(entry.service_name.clone(), entry.address.as_str())))
        .cloned()
        .collect()
}
