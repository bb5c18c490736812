//! Process signal handling

use polaris_sync_common::ShutdownSignal;
use tracing::{error, info};

/// Wait for Ctrl+C or SIGTERM in the background.
///
/// Returns the signal that fires when either arrives. A handler that fails
/// to install is logged and never fires.
pub async fn wait_for_shutdown_signal() -> ShutdownSignal {
    let shutdown = ShutdownSignal::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, stopping sync");
            }
            _ = terminate => {
                info!("Received SIGTERM, stopping sync");
            }
        }

        shutdown_clone.shutdown();
    });

    shutdown
}
