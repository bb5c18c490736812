//! Registry to mesh reconciler
//!
//! A sync re-reads the full instance list of one registry service, converts
//! it and replaces the published ServiceEntry when the registry revision
//! differs from the one recorded on the object.

use std::sync::Arc;
use std::time::Duration;

use polaris_sync_client::{RegistryClient, Subscription};
use polaris_sync_common::{DEFAULT_CONFIG_ROOT_NS, ShutdownSignal};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::conversion::{
    ANNOTATION_EXTERNAL, ANNOTATION_REVISION, RegistryInfo, convert_service_entry, managed_labels, service_entry_name,
};
use crate::error::{StoreError, SyncError};
use crate::store::{ServiceEntryStore, with_timeout};
use crate::types::{ResourceMetadata, ServiceEntry};

/// Configuration shared by the reconciler and the scanner
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Namespace holding the published ServiceEntries
    pub config_root_ns: String,
    /// Deadline of each mesh store call
    pub store_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            config_root_ns: DEFAULT_CONFIG_ROOT_NS.to_string(),
            store_timeout: Duration::from_secs(10),
        }
    }
}

impl ReconcilerConfig {
    pub fn with_config_root_ns(mut self, namespace: impl Into<String>) -> Self {
        self.config_root_ns = namespace.into();
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }
}

/// What a completed sync did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The published object was replaced
    Updated { revision: String },
    /// The published object already carried the registry revision
    Unchanged,
}

pub struct Reconciler {
    registry: Arc<RegistryClient>,
    store: Arc<dyn ServiceEntryStore>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        registry: Arc<RegistryClient>,
        store: Arc<dyn ServiceEntryStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Bring the published object of one registry service up to date.
    ///
    /// The object must already exist; a missing object is reported as
    /// `StoreError::NotFound` and nothing is created. The routing hint
    /// recorded on the object wins over the one in `info`. Conflicts are not
    /// retried here.
    pub async fn sync(&self, info: &RegistryInfo) -> Result<SyncOutcome, SyncError> {
        let key = &info.key;
        let set = self.registry.list_instances(key).await?;

        let namespace = &self.config.config_root_ns;
        let name = service_entry_name(&key.namespace, &key.service);
        let existing = with_timeout(
            "get",
            self.config.store_timeout,
            self.store.get(namespace, &name),
        )
        .await?;

        // Only objects still naming a registry service are written
        RegistryInfo::from_annotations(&existing.metadata.annotations)?;

        // The published object is authoritative for its routing hint
        let info = match existing.annotation(ANNOTATION_EXTERNAL) {
            Some(external) if external != info.external => {
                debug!(name = %name, external, "Using routing hint of the published object");
                info.clone().with_external(external)
            }
            _ => info.clone(),
        };
        let (spec, annotations) = convert_service_entry(&set, &info);

        let current = existing
            .metadata
            .annotations
            .get(ANNOTATION_REVISION)
            .cloned();
        if current.is_some() && current.as_ref() == annotations.get(ANNOTATION_REVISION) {
            debug!(name = %name, revision = %set.revision, "ServiceEntry unchanged");
            return Ok(SyncOutcome::Unchanged);
        }

        let entry = ServiceEntry::new(
            ResourceMetadata {
                name: name.clone(),
                namespace: namespace.clone(),
                labels: managed_labels(),
                annotations,
                resource_version: existing.metadata.resource_version,
            },
            spec,
        );
        let updated = with_timeout("update", self.config.store_timeout, self.store.update(entry))
            .await?;

        info!(
            name = %name,
            old_revision = current.as_deref().unwrap_or(""),
            new_revision = %set.revision,
            endpoints = updated.spec.endpoints.len(),
            "Updated ServiceEntry"
        );
        Ok(SyncOutcome::Updated {
            revision: set.revision,
        })
    }

    /// Run [`Reconciler::sync`] and log the failure, if any
    pub async fn sync_logged(&self, info: &RegistryInfo) -> Option<SyncOutcome> {
        match self.sync(info).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log_sync_error(info, &e);
                None
            }
        }
    }

    /// Spawn the task re-syncing `info` for every notification of `subscription`.
    ///
    /// Notifications are handled one at a time in arrival order. The task
    /// exits on shutdown or once the subscription ends.
    pub fn spawn_listener(
        self: &Arc<Self>,
        info: RegistryInfo,
        mut subscription: Subscription,
        shutdown: ShutdownSignal,
    ) -> JoinHandle<()> {
        let reconciler = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!(key = %info.key, "Listener stopping on shutdown");
                        break;
                    }
                    event = subscription.recv() => {
                        let Some(event) = event else {
                            info!(key = %info.key, "Registry subscription ended, listener exiting");
                            break;
                        };
                        debug!(key = %info.key, kind = %event.kind, "Re-syncing on registry change");
                        reconciler.sync_logged(&info).await;
                    }
                }
            }
        })
    }
}

fn log_sync_error(info: &RegistryInfo, error: &SyncError) {
    match error {
        SyncError::Store(StoreError::NotFound { namespace, name }) => {
            info!(
                key = %info.key,
                namespace = %namespace,
                name = %name,
                "No ServiceEntry to update, skipping"
            );
        }
        SyncError::Store(StoreError::Conflict { name, .. }) => {
            warn!(
                key = %info.key,
                name = %name,
                "ServiceEntry modified concurrently, waiting for the next change"
            );
        }
        SyncError::Parse(e) => {
            warn!(
                key = %info.key,
                error = %e,
                "Published ServiceEntry no longer names its registry service, skipping"
            );
        }
        SyncError::Registry(e) => {
            warn!(key = %info.key, error = %e, "Failed to query registry instances");
        }
        other => {
            error!(key = %info.key, error = %other, "Failed to sync ServiceEntry");
        }
    }
}
