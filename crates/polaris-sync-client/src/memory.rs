//! In-memory registry backend
//!
//! Keeps instance sets in process and pushes notifications to open watches.
//! Used by tests and local demos in place of a real registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::api::{EventStream, RegistryApi};
use crate::error::{ClientError, Result};
use crate::model::{ChangeKind, ChangeNotification, InstanceSet, RegistryKey};

/// Process-local registry
#[derive(Default)]
pub struct InMemoryRegistry {
    services: RwLock<HashMap<RegistryKey, InstanceSet>>,
    watchers: Mutex<HashMap<RegistryKey, Vec<mpsc::UnboundedSender<ChangeNotification>>>>,
    fail_lists: AtomicBool,
    fail_watches: AtomicBool,
    list_calls: AtomicUsize,
    watch_calls: AtomicUsize,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a service's instance set and notify its watchers
    pub fn upsert(&self, set: InstanceSet) {
        let key = set.key.clone();
        let ids = set.instances.iter().map(|i| i.identity()).collect();
        let previous = self.services.write().insert(key.clone(), set);
        let kind = if previous.is_some() {
            ChangeKind::Updated
        } else {
            ChangeKind::Added
        };
        self.notify(&key, kind, ids);
    }

    /// Remove a service and notify its watchers
    pub fn remove(&self, key: &RegistryKey) {
        if self.services.write().remove(key).is_some() {
            self.notify(key, ChangeKind::Removed, Vec::new());
        }
    }

    /// Deliver a notification to every open watch of `key`
    pub fn notify(&self, key: &RegistryKey, kind: ChangeKind, instance_ids: Vec<String>) {
        let mut watchers = self.watchers.lock();
        if let Some(senders) = watchers.get_mut(key) {
            let event = ChangeNotification::new(key.clone(), kind, instance_ids);
            senders.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    /// End every open watch of `key`, as a registry-initiated termination
    pub fn close_watches(&self, key: &RegistryKey) {
        self.watchers.lock().remove(key);
    }

    /// Number of watches of `key` whose consumer is still alive
    pub fn open_watches(&self, key: &RegistryKey) -> usize {
        self.watchers
            .lock()
            .get(key)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Make subsequent list calls fail
    pub fn set_list_failure(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent watch calls fail
    pub fn set_watch_failure(&self, fail: bool) {
        self.fail_watches.store(fail, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryApi for InMemoryRegistry {
    async fn list_all_instances(&self, key: &RegistryKey) -> Result<InstanceSet> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(ClientError::Unavailable("list failure injected".to_string()));
        }
        self.services
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ClientError::ServiceNotFound(key.clone()))
    }

    async fn watch(&self, key: &RegistryKey) -> Result<EventStream> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_watches.load(Ordering::SeqCst) {
            return Err(ClientError::Unavailable("watch failure injected".to_string()));
        }
        if !self.services.read().contains_key(key) {
            return Err(ClientError::ServiceNotFound(key.clone()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.lock().entry(key.clone()).or_default().push(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InstanceRecord;

    fn demo_set(revision: &str) -> InstanceSet {
        InstanceSet::new(
            RegistryKey::new("Test", "demo"),
            vec![InstanceRecord::new("10.0.0.1", 8080, "http")],
            revision,
        )
    }

    #[tokio::test]
    async fn test_list_returns_latest_set() {
        let registry = InMemoryRegistry::new();
        registry.upsert(demo_set("r1"));
        registry.upsert(demo_set("r2"));

        let set = registry
            .list_all_instances(&RegistryKey::new("Test", "demo"))
            .await
            .unwrap();
        assert_eq!(set.revision, "r2");
        assert_eq!(registry.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_list_unknown_service() {
        let registry = InMemoryRegistry::new();
        let result = registry
            .list_all_instances(&RegistryKey::new("Test", "missing"))
            .await;
        assert!(matches!(result, Err(ClientError::ServiceNotFound(_))));
    }

    #[tokio::test]
    async fn test_watch_receives_updates_and_termination() {
        let registry = InMemoryRegistry::new();
        let key = RegistryKey::new("Test", "demo");
        registry.upsert(demo_set("r1"));

        let mut stream = registry.watch(&key).await.unwrap();
        registry.upsert(demo_set("r2"));

        let event = stream.next().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Updated);
        assert_eq!(event.key, key);

        registry.close_watches(&key);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let registry = InMemoryRegistry::new();
        let key = RegistryKey::new("Test", "demo");
        registry.upsert(demo_set("r1"));

        registry.set_list_failure(true);
        assert!(registry.list_all_instances(&key).await.is_err());
        registry.set_list_failure(false);
        assert!(registry.list_all_instances(&key).await.is_ok());

        registry.set_watch_failure(true);
        assert!(registry.watch(&key).await.is_err());
        assert_eq!(registry.watch_calls(), 1);
    }
}
