//! Discovery scanner
//!
//! Finds the registry services to track by looking at the ServiceEntries this
//! bridge manages, and makes sure each one has a live subscription.

use std::sync::Arc;

use polaris_sync_client::{ClientError, RegistryClient};
use polaris_sync_common::ShutdownSignal;
use tracing::{debug, error, info, warn};

use crate::conversion::{ANNOTATION_REVISION, RegistryInfo, managed_labels};
use crate::reconciler::Reconciler;
use crate::store::{ServiceEntryStore, with_timeout};

/// Tally of one scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Managed ServiceEntries found in the store
    pub listed: usize,
    /// New subscriptions started by this scan
    pub subscribed: usize,
    /// Keys that already had a subscription
    pub already_subscribed: usize,
    /// Entries without usable registry annotations
    pub skipped: usize,
    /// Keys whose subscription could not be established
    pub failed: usize,
}

pub struct DiscoveryScanner {
    registry: Arc<RegistryClient>,
    store: Arc<dyn ServiceEntryStore>,
    reconciler: Arc<Reconciler>,
}

impl DiscoveryScanner {
    pub fn new(
        registry: Arc<RegistryClient>,
        store: Arc<dyn ServiceEntryStore>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            registry,
            store,
            reconciler,
        }
    }

    /// Subscribe to every registry service referenced by a managed ServiceEntry.
    ///
    /// Entries that were never synced (no revision annotation) force a fresh
    /// subscription. Every new subscription gets one immediate sync before its
    /// listener task takes over. Failures are logged per entry and never stop
    /// the scan.
    pub async fn scan(&self, shutdown: &ShutdownSignal) -> ScanReport {
        let mut report = ScanReport::default();
        let config = self.reconciler.config();
        let labels = managed_labels();

        let entries = match with_timeout(
            "list",
            config.store_timeout,
            self.store.list(&config.config_root_ns, &labels),
        )
        .await
        {
            Ok(entries) => entries,
            Err(e) => {
                error!(namespace = %config.config_root_ns, error = %e, "Failed to list ServiceEntries");
                return report;
            }
        };
        report.listed = entries.len();

        for entry in entries {
            debug!(
                name = %entry.metadata.name,
                hosts = ?entry.spec.hosts,
                endpoints = entry.spec.endpoints.len(),
                "Inspecting ServiceEntry"
            );

            let info = match RegistryInfo::from_annotations(&entry.metadata.annotations) {
                Ok(info) => info,
                Err(e) => {
                    warn!(name = %entry.metadata.name, error = %e, "Skipping ServiceEntry");
                    report.skipped += 1;
                    continue;
                }
            };

            let force = !entry.metadata.annotations.contains_key(ANNOTATION_REVISION);
            match self.registry.subscribe(&info.key, force, shutdown).await {
                Ok(Some(subscription)) => {
                    report.subscribed += 1;
                    self.reconciler.sync_logged(&info).await;
                    self.reconciler
                        .spawn_listener(info, subscription, shutdown.clone());
                }
                Ok(None) => report.already_subscribed += 1,
                Err(ClientError::ShuttingDown) => {
                    debug!("Shutdown requested, abandoning scan");
                    break;
                }
                Err(e) => {
                    error!(key = %info.key, force, error = %e, "Failed to watch registry service");
                    report.failed += 1;
                }
            }
        }

        info!(
            listed = report.listed,
            subscribed = report.subscribed,
            already_subscribed = report.already_subscribed,
            skipped = report.skipped,
            failed = report.failed,
            "Scan finished"
        );
        report
    }
}
