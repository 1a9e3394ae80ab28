//! Applies a [`Plan`](crate::diff::Plan) to the registry.
//!
//! Every call is independent and best-effort: a failure is logged and
//! reported in the outcome list, and the next pass retries it naturally
//! because the diff recomputes the same missing or stale entry. A write that
//! panics is reported the same way, so the rest of the pass is kept.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;

use beacon_core::{Component, RegistryEntry};

use crate::error::SyncError;
use crate::fanout::fan_out;
use crate::registry::ServiceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Register,
    Deregister,
}

/// Result of one registry write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    pub kind: MutationKind,
    pub service_id: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MutationOutcome {
    fn from_result(kind: MutationKind, entry: &RegistryEntry, result: Result<(), SyncError>) -> Self {
        let error = match result {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(
                    kind = ?kind,
                    id = %entry.id,
                    address = %entry.address,
                    error = %err,
                    "registry write failed",
                );
                Some(err.to_string())
            }
        };
        Self {
            kind,
            service_id: entry.id.clone(),
            address: entry.address.clone(),
            error,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one write, turning a panic into an error.
fn guarded(write: impl FnOnce() -> Result<(), SyncError>) -> Result<(), SyncError> {
    panic::catch_unwind(AssertUnwindSafe(write)).unwrap_or_else(|payload| {
        Err(SyncError::Join(format!(
            "registry write panicked: {}",
            panic_message(payload)
        )))
    })
}

/// Register every component, one task each, at most `limit` in flight.
pub async fn register_all(
    registry: Arc<dyn ServiceRegistry>,
    components: Vec<Component>,
    limit: usize,
) -> Result<Vec<MutationOutcome>, SyncError> {
    let entries: Vec<RegistryEntry> = components.iter().map(RegistryEntry::for_component).collect();
    fan_out(entries, limit, move |entry| {
        let result = guarded(|| registry.register(&entry));
        MutationOutcome::from_result(MutationKind::Register, &entry, result)
    })
    .await
}

/// Deregister every entry from its own node, one task each, joined.
pub async fn deregister_all(
    registry: Arc<dyn ServiceRegistry>,
    entries: Vec<RegistryEntry>,
    limit: usize,
) -> Result<Vec<MutationOutcome>, SyncError> {
    fan_out(entries, limit, move |entry| {
        let result = guarded(|| registry.deregister(&entry));
        MutationOutcome::from_result(MutationKind::Deregister, &entry, result)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn one_rejected_write_does_not_block_siblings() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.reject_writes_for("datanode.h2");

        let components = vec![
            Component::new("NAMENODE", "h1.dom", "10.0.0.1", "STARTED"),
            Component::new("DATANODE", "h2.dom", "10.0.0.2", "STARTED"),
            Component::new("DATANODE", "h3.dom", "10.0.0.3", "STARTED"),
        ];
        let outcomes = register_all(registry.clone(), components, 2)
            .await
            .expect("register");

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_ok());
        assert!(!outcomes[1].is_ok());
        assert_eq!(outcomes[1].service_id, "datanode.h2");
        assert!(outcomes[2].is_ok());
        assert_eq!(registry.entries().len(), 2);
    }

    /// Panics on writes to one id, delegates everything else.
    struct PanicsOn {
        id: &'static str,
        inner: InMemoryRegistry,
    }

    impl ServiceRegistry for PanicsOn {
        fn service_names(&self) -> Result<Vec<beacon_core::ServiceName>, SyncError> {
            self.inner.service_names()
        }

        fn service_entries(
            &self,
            service: &beacon_core::ServiceName,
        ) -> Result<Vec<RegistryEntry>, SyncError> {
            self.inner.service_entries(service)
        }

        fn register(&self, entry: &RegistryEntry) -> Result<(), SyncError> {
            if entry.id == self.id {
                panic!("agent client bug");
            }
            self.inner.register(entry)
        }

        fn deregister(&self, entry: &RegistryEntry) -> Result<(), SyncError> {
            if entry.id == self.id {
                panic!("agent client bug");
            }
            self.inner.deregister(entry)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_write_becomes_a_failed_outcome() {
        let registry = Arc::new(PanicsOn {
            id: "datanode.h2",
            inner: InMemoryRegistry::new(),
        });

        let components = vec![
            Component::new("NAMENODE", "h1.dom", "10.0.0.1", "STARTED"),
            Component::new("DATANODE", "h2.dom", "10.0.0.2", "STARTED"),
            Component::new("DATANODE", "h3.dom", "10.0.0.3", "STARTED"),
        ];
        let outcomes = register_all(registry.clone(), components, 2)
            .await
            .expect("register");

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_ok());
        assert_eq!(outcomes[1].service_id, "datanode.h2");
        let error = outcomes[1].error.as_deref().expect("failed outcome");
        assert!(error.contains("agent client bug"), "{error}");
        assert!(outcomes[2].is_ok());
        assert_eq!(registry.inner.entries().len(), 2);

        let stale = RegistryEntry::for_component(&Component::new(
            "DATANODE", "h2.dom", "10.0.0.2", "STARTED",
        ));
        let outcomes = deregister_all(registry, vec![stale], 1)
            .await
            .expect("deregister");
        assert_eq!(outcomes[0].kind, MutationKind::Deregister);
        assert!(!outcomes[0].is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deregister_removes_from_owning_node() {
        let started = Component::new("NAMENODE", "h1.dom", "10.0.0.1", "STARTED");
        let entry = RegistryEntry::for_component(&started);
        let registry = Arc::new(InMemoryRegistry::with_entries([entry.clone()]));

        let outcomes = deregister_all(registry.clone(), vec![entry], 4)
            .await
            .expect("deregister");

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].kind, MutationKind::Deregister);
        assert!(outcomes[0].is_ok());
        assert!(registry.entries().is_empty());
    }
}
