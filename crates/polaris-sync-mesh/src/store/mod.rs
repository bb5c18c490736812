//! Mesh configuration store
//!
//! The bridge reads and writes ServiceEntry objects through [`ServiceEntryStore`].
//! Two implementations are provided:
//! - `kubernetes` - Istio CRDs on a Kubernetes API server
//! - `memory` - process-local store with the same versioning rules

pub mod kubernetes;
pub mod memory;

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::ServiceEntry;

pub use kubernetes::KubeServiceEntryStore;
pub use memory::InMemoryServiceEntryStore;

pub type Result<T> = std::result::Result<T, StoreError>;

/// CRUD access to ServiceEntry objects with optimistic versioning
#[async_trait]
pub trait ServiceEntryStore: Send + Sync + 'static {
    /// List the entries of `namespace` carrying every label in `labels`
    async fn list(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ServiceEntry>>;

    /// Fetch one entry; `StoreError::NotFound` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<ServiceEntry>;

    /// Store a new entry; fails with `StoreError::Conflict` if the name is taken
    async fn create(&self, entry: ServiceEntry) -> Result<ServiceEntry>;

    /// Replace an entry. `entry.metadata.resource_version` must match the
    /// stored version, otherwise `StoreError::Conflict`.
    async fn update(&self, entry: ServiceEntry) -> Result<ServiceEntry>;
}

/// Render labels as a Kubernetes equality selector, e.g. `manager=aeraki,registry=polaris`
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Bound a store call by `timeout`
pub async fn with_timeout<T>(
    operation: &'static str,
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout { operation, timeout }),
    }
}
