//! Deduplicated registry subscriptions
//!
//! `RegistryClient` wraps a [`RegistryApi`] backend and keeps the set of keys
//! with a live subscription. For each subscription it spawns a forwarder task
//! that relays backend notifications into a bounded per-key channel, so the
//! consumer runs on its own task instead of inside the backend's callback.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::StreamExt;
use polaris_sync_common::ShutdownSignal;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::api::{EventStream, RegistryApi};
use crate::config::RegistryClientConfig;
use crate::error::{ClientError, Result};
use crate::model::{ChangeNotification, InstanceSet, RegistryKey};

/// Registry state of one subscribed key
struct SubscriptionSlot {
    generation: u64,
    /// Set once the forwarder task is running
    forwarder: Option<AbortHandle>,
}

impl SubscriptionSlot {
    fn pending(generation: u64) -> Self {
        Self {
            generation,
            forwarder: None,
        }
    }
}

/// Receiving side of one key's subscription
pub struct Subscription {
    key: RegistryKey,
    generation: u64,
    events: mpsc::Receiver<ChangeNotification>,
}

impl Subscription {
    pub fn key(&self) -> &RegistryKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Next notification; `None` once the subscription has ended
    pub async fn recv(&mut self) -> Option<ChangeNotification> {
        self.events.recv().await
    }
}

/// Registry client shared by the scanner and the reconciler
pub struct RegistryClient {
    api: Arc<dyn RegistryApi>,
    config: RegistryClientConfig,
    /// Keys with a subscription. Entries are only replaced (forced
    /// re-subscription) or rolled back when establishing the watch fails.
    subscriptions: DashMap<RegistryKey, SubscriptionSlot>,
    next_generation: AtomicU64,
}

impl RegistryClient {
    pub fn new(api: Arc<dyn RegistryApi>, config: RegistryClientConfig) -> Self {
        Self {
            api,
            config,
            subscriptions: DashMap::new(),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RegistryClientConfig {
        &self.config
    }

    /// Query all instances of a service
    pub async fn list_instances(&self, key: &RegistryKey) -> Result<InstanceSet> {
        self.with_deadline("list instances", self.api.list_all_instances(key))
            .await
    }

    /// Subscribe to change notifications of a service.
    ///
    /// Returns `Ok(None)` when the key is already subscribed and `force` is
    /// false. With `force`, any existing subscription for the key is stopped
    /// and replaced, so a key never has two live forwarders.
    pub async fn subscribe(
        &self,
        key: &RegistryKey,
        force: bool,
        shutdown: &ShutdownSignal,
    ) -> Result<Option<Subscription>> {
        if shutdown.is_shutdown() {
            return Err(ClientError::ShuttingDown);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;

        // Check-and-insert under the shard lock; released before any await.
        match self.subscriptions.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                if !force {
                    debug!(key = %key, "Registry service already subscribed");
                    return Ok(None);
                }
                let previous =
                    std::mem::replace(slot.get_mut(), SubscriptionSlot::pending(generation));
                if let Some(forwarder) = previous.forwarder {
                    forwarder.abort();
                }
                info!(key = %key, "Forcing re-subscription of registry service");
            }
            Entry::Vacant(slot) => {
                slot.insert(SubscriptionSlot::pending(generation));
            }
        }

        let stream = match self.with_deadline("subscribe", self.api.watch(key)).await {
            Ok(stream) => stream,
            Err(e) => {
                // Roll back so that the next scan retries this key
                self.subscriptions
                    .remove_if(key, |_, slot| slot.generation == generation);
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(self.config.event_buffer);
        let handle = tokio::spawn(forward_events(key.clone(), stream, tx, shutdown.clone()));

        let installed = match self.subscriptions.get_mut(key) {
            Some(mut slot) if slot.generation == generation => {
                slot.forwarder = Some(handle.abort_handle());
                true
            }
            _ => false,
        };
        if !installed {
            // A forced re-subscription replaced ours while the watch was opening
            debug!(key = %key, generation, "Subscription superseded before start");
            handle.abort();
            return Ok(None);
        }

        info!(key = %key, generation, "Subscribed to registry service");
        Ok(Some(Subscription {
            key: key.clone(),
            generation,
            events: rx,
        }))
    }

    /// Whether `key` currently has a subscription
    pub fn is_subscribed(&self, key: &RegistryKey) -> bool {
        self.subscriptions.contains_key(key)
    }

    /// Number of subscribed keys
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    async fn with_deadline<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout { operation, timeout }),
        }
    }
}

/// Relay backend notifications to the subscription channel until shutdown,
/// registry termination, or the consumer going away.
async fn forward_events(
    key: RegistryKey,
    mut stream: EventStream,
    tx: mpsc::Sender<ChangeNotification>,
    shutdown: ShutdownSignal,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(key = %key, "Stopping registry subscription");
                return;
            }
            event = stream.next() => {
                let Some(event) = event else {
                    warn!(key = %key, "Registry subscription stream terminated");
                    return;
                };
                debug!(key = %key, kind = %event.kind, "Received registry change");
                if tx.send(event).await.is_err() {
                    debug!(key = %key, "Subscription consumer dropped");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::memory::InMemoryRegistry;
    use crate::model::{ChangeKind, InstanceRecord};

    fn registry_with_demo() -> (Arc<InMemoryRegistry>, RegistryKey) {
        let registry = Arc::new(InMemoryRegistry::new());
        let key = RegistryKey::new("Test", "demo");
        registry.upsert(InstanceSet::new(
            key.clone(),
            vec![InstanceRecord::new("10.0.0.1", 8080, "http")],
            "r1",
        ));
        (registry, key)
    }

    fn client(registry: Arc<InMemoryRegistry>) -> RegistryClient {
        RegistryClient::new(registry, RegistryClientConfig::default())
    }

    #[tokio::test]
    async fn test_subscribe_once_then_noop() {
        let (registry, key) = registry_with_demo();
        let client = client(registry.clone());
        let shutdown = ShutdownSignal::new();

        let first = client.subscribe(&key, false, &shutdown).await.unwrap();
        assert!(first.is_some());
        let second = client.subscribe(&key, false, &shutdown).await.unwrap();
        assert!(second.is_none());

        assert_eq!(registry.watch_calls(), 1);
        assert!(client.is_subscribed(&key));
        assert_eq!(client.subscription_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribe_dedup() {
        let (registry, key) = registry_with_demo();
        let client = Arc::new(client(registry.clone()));
        let shutdown = ShutdownSignal::new();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let client = client.clone();
            let key = key.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                client.subscribe(&key, false, &shutdown).await
            }));
        }

        let mut subscriptions = Vec::new();
        for handle in handles {
            if let Some(subscription) = handle.await.unwrap().unwrap() {
                subscriptions.push(subscription);
            }
        }

        assert_eq!(subscriptions.len(), 1);
        assert_eq!(registry.watch_calls(), 1);
        assert_eq!(registry.open_watches(&key), 1);
    }

    #[tokio::test]
    async fn test_notifications_are_relayed_in_order() {
        let (registry, key) = registry_with_demo();
        let client = client(registry.clone());
        let shutdown = ShutdownSignal::new();

        let mut subscription = client.subscribe(&key, false, &shutdown).await.unwrap().unwrap();
        registry.notify(&key, ChangeKind::Added, vec!["a".to_string()]);
        registry.notify(&key, ChangeKind::Removed, vec!["a".to_string()]);

        let first = subscription.recv().await.unwrap();
        let second = subscription.recv().await.unwrap();
        assert_eq!(first.kind, ChangeKind::Added);
        assert_eq!(second.kind, ChangeKind::Removed);
    }

    #[tokio::test]
    async fn test_forced_resubscribe_replaces_previous() {
        let (registry, key) = registry_with_demo();
        let client = client(registry.clone());
        let shutdown = ShutdownSignal::new();

        let mut old = client.subscribe(&key, false, &shutdown).await.unwrap().unwrap();
        let new = client.subscribe(&key, true, &shutdown).await.unwrap().unwrap();

        assert!(new.generation() > old.generation());
        assert_eq!(registry.watch_calls(), 2);
        assert_eq!(client.subscription_count(), 1);

        // The previous forwarder was aborted, so its channel closes
        let closed = tokio::time::timeout(Duration::from_secs(1), old.recv()).await;
        assert!(matches!(closed, Ok(None)));
    }

    #[tokio::test]
    async fn test_failed_watch_is_rolled_back() {
        let (registry, key) = registry_with_demo();
        let client = client(registry.clone());
        let shutdown = ShutdownSignal::new();

        registry.set_watch_failure(true);
        assert!(client.subscribe(&key, false, &shutdown).await.is_err());
        assert!(!client.is_subscribed(&key));

        registry.set_watch_failure(false);
        assert!(client.subscribe(&key, false, &shutdown).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stream_termination_ends_subscription() {
        let (registry, key) = registry_with_demo();
        let client = client(registry.clone());
        let shutdown = ShutdownSignal::new();

        let mut subscription = client.subscribe(&key, false, &shutdown).await.unwrap().unwrap();
        registry.close_watches(&key);

        let result = tokio::time::timeout(Duration::from_secs(1), subscription.recv()).await;
        assert!(matches!(result, Ok(None)));
        // No automatic restart and the key stays registered
        assert_eq!(registry.watch_calls(), 1);
        assert!(client.is_subscribed(&key));
    }

    #[tokio::test]
    async fn test_shutdown_stops_forwarder() {
        let (registry, key) = registry_with_demo();
        let client = client(registry.clone());
        let shutdown = ShutdownSignal::new();

        let mut subscription = client.subscribe(&key, false, &shutdown).await.unwrap().unwrap();
        shutdown.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(1), subscription.recv()).await;
        assert!(matches!(result, Ok(None)));

        let refused = client.subscribe(&RegistryKey::new("Test", "other"), false, &shutdown).await;
        assert!(matches!(refused, Err(ClientError::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_list_instances_deadline() {
        struct SlowRegistry;

        #[async_trait::async_trait]
        impl RegistryApi for SlowRegistry {
            async fn list_all_instances(&self, _key: &RegistryKey) -> Result<InstanceSet> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(InstanceSet::default())
            }

            async fn watch(&self, _key: &RegistryKey) -> Result<EventStream> {
                Ok(futures::stream::pending().boxed())
            }
        }

        let client = RegistryClient::new(
            Arc::new(SlowRegistry),
            RegistryClientConfig::default().with_request_timeout(Duration::from_millis(20)),
        );
        let result = client.list_instances(&RegistryKey::new("Test", "slow")).await;
        assert!(matches!(result, Err(ClientError::Timeout { .. })));
    }
}
