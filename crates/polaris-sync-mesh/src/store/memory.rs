//! In-memory ServiceEntry store

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Result, ServiceEntryStore};
use crate::error::StoreError;
use crate::types::ServiceEntry;

/// Process-local store with Kubernetes-like resource versions
///
/// Every successful write bumps a store-wide version counter and counts
/// toward [`InMemoryServiceEntryStore::writes`].
#[derive(Default)]
pub struct InMemoryServiceEntryStore {
    entries: RwLock<BTreeMap<(String, String), ServiceEntry>>,
    version: AtomicU64,
    writes: AtomicUsize,
    /// Names whose next update is rejected as a conflict
    conflicts: RwLock<HashSet<String>>,
}

impl InMemoryServiceEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful creates and updates
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Reject the next update of `name` with a conflict, as if someone else wrote it first
    pub fn fail_next_update(&self, name: &str) {
        self.conflicts.write().insert(name.to_string());
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

fn entry_key(entry: &ServiceEntry) -> (String, String) {
    (
        entry.metadata.namespace.clone(),
        entry.metadata.name.clone(),
    )
}

#[async_trait]
impl ServiceEntryStore for InMemoryServiceEntryStore {
    async fn list(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ServiceEntry>> {
        Ok(self
            .entries
            .read()
            .values()
            .filter(|e| e.metadata.namespace == namespace && e.matches_labels(labels))
            .cloned()
            .collect())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<ServiceEntry> {
        self.entries
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn create(&self, mut entry: ServiceEntry) -> Result<ServiceEntry> {
        let key = entry_key(&entry);
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return Err(StoreError::Conflict {
                namespace: key.0,
                name: key.1,
            });
        }

        entry.metadata.resource_version = self.next_version();
        entries.insert(key, entry.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(entry)
    }

    async fn update(&self, mut entry: ServiceEntry) -> Result<ServiceEntry> {
        let key = entry_key(&entry);
        let mut entries = self.entries.write();
        let Some(current) = entries.get(&key) else {
            return Err(StoreError::NotFound {
                namespace: key.0,
                name: key.1,
            });
        };

        let injected = self.conflicts.write().remove(&key.1);
        if injected || current.metadata.resource_version != entry.metadata.resource_version {
            return Err(StoreError::Conflict {
                namespace: key.0,
                name: key.1,
            });
        }

        entry.metadata.resource_version = self.next_version();
        entries.insert(key, entry.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(entry)
    }
}
