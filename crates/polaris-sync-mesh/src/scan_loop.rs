//! Periodic discovery

use std::sync::Arc;
use std::time::Duration;

use polaris_sync_common::ShutdownSignal;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::scanner::DiscoveryScanner;

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(10);

/// Drives the [`DiscoveryScanner`] on a fixed interval
pub struct ScanLoop {
    scanner: Arc<DiscoveryScanner>,
    interval: Duration,
}

impl ScanLoop {
    pub fn new(scanner: Arc<DiscoveryScanner>, interval: Duration) -> Self {
        Self { scanner, interval }
    }

    /// Scan immediately, then once per interval until `shutdown` fires.
    ///
    /// Each scan runs on its own task; the loop never waits for one to finish.
    pub async fn run(&self, shutdown: ShutdownSignal) {
        info!(interval_ms = self.interval.as_millis() as u64, "Starting scan loop");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Scan loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    debug!("Scanning for managed ServiceEntries");
                    let scanner = Arc::clone(&self.scanner);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        scanner.scan(&shutdown).await;
                    });
                }
            }
        }
    }
}
