//! Wiring of registry client, reconciler and scanner into one running bridge

use std::sync::Arc;

use anyhow::Context;
use polaris_sync_client::{PolarisHttpClient, RegistryApi, RegistryClient};
use polaris_sync_common::ShutdownSignal;
use polaris_sync_mesh::{
    DiscoveryScanner, KubeServiceEntryStore, Reconciler, ScanLoop, ServiceEntryStore,
};
use tracing::info;

use crate::model::config::Configuration;

/// Assembled sync bridge
pub struct Bridge {
    registry: Arc<RegistryClient>,
    scan_loop: ScanLoop,
}

impl Bridge {
    /// Build the bridge over the given registry backend and ServiceEntry store.
    pub fn assemble(
        configuration: &Configuration,
        api: Arc<dyn RegistryApi>,
        store: Arc<dyn ServiceEntryStore>,
    ) -> Self {
        let registry = Arc::new(RegistryClient::new(
            api,
            configuration.registry_client_config(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            registry.clone(),
            store.clone(),
            configuration.reconciler_config(),
        ));
        let scanner = Arc::new(DiscoveryScanner::new(registry.clone(), store, reconciler));
        let scan_loop = ScanLoop::new(scanner, configuration.scan_interval());

        Self {
            registry,
            scan_loop,
        }
    }

    /// Build the bridge against the configured Polaris server and the
    /// in-cluster (or kubeconfig) Kubernetes API.
    pub async fn connect(configuration: &Configuration) -> anyhow::Result<Self> {
        let client_config = configuration.polaris_client_config();
        info!(address = %client_config.base_url(), "Connecting to Polaris");
        let api = PolarisHttpClient::new(client_config)
            .context("Failed to create Polaris client")?;

        let store = KubeServiceEntryStore::try_default()
            .await
            .context("Failed to create Kubernetes client")?;

        Ok(Self::assemble(configuration, Arc::new(api), Arc::new(store)))
    }

    pub fn registry(&self) -> &Arc<RegistryClient> {
        &self.registry
    }

    /// Scan until `shutdown` fires.
    pub async fn run(&self, shutdown: ShutdownSignal) {
        self.scan_loop.run(shutdown).await;
        info!(
            subscriptions = self.registry.subscription_count(),
            "Sync bridge stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use polaris_sync_client::{InMemoryRegistry, InstanceRecord, InstanceSet, RegistryKey};
    use polaris_sync_mesh::conversion::{
        ANNOTATION_NAMESPACE, ANNOTATION_REVISION, ANNOTATION_SERVICE, managed_labels,
    };
    use polaris_sync_mesh::types::ResourceMetadata;
    use polaris_sync_mesh::{InMemoryServiceEntryStore, ServiceEntry};

    use super::*;

    #[tokio::test]
    async fn test_assembled_bridge_publishes_into_configured_namespace() {
        let configuration = Configuration::from_args([
            "polaris-sync",
            "--config",
            "does/not/exist.yml",
            "--config-root-ns",
            "istio-config",
        ])
        .unwrap();

        let registry = Arc::new(InMemoryRegistry::new());
        registry.upsert(InstanceSet::new(
            RegistryKey::new("Test", "ratings"),
            vec![InstanceRecord::new("10.0.0.1", 9080, "http")],
            "r1",
        ));

        let store = Arc::new(InMemoryServiceEntryStore::new());
        let mut metadata = ResourceMetadata::new("istio-config", "test.polaris-ratings");
        metadata.labels = managed_labels();
        metadata.annotations = BTreeMap::from([
            (ANNOTATION_NAMESPACE.to_string(), "Test".to_string()),
            (ANNOTATION_SERVICE.to_string(), "ratings".to_string()),
        ]);
        store
            .create(ServiceEntry::new(metadata, Default::default()))
            .await
            .unwrap();

        let bridge = Bridge::assemble(&configuration, registry.clone(), store.clone());
        let shutdown = ShutdownSignal::new();
        let handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                bridge.run(shutdown).await;
                bridge
            }
        });

        let mut published = false;
        for _ in 0..200 {
            let entry = store
                .get("istio-config", "test.polaris-ratings")
                .await
                .unwrap();
            if entry.annotation(ANNOTATION_REVISION) == Some("r1") {
                assert_eq!(entry.spec.hosts, vec!["test.polaris-ratings.polaris"]);
                published = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(published);

        shutdown.shutdown();
        let bridge = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bridge.registry().subscription_count(), 1);
    }
}
