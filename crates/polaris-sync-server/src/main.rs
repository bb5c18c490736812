use polaris_sync_server::model::config::Configuration;
use polaris_sync_server::startup::{Bridge, init_logging, wait_for_shutdown_signal};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new()?;

    let _logging_guard = init_logging(&configuration.logging_config())?;

    configuration.validate()?;

    info!(
        polaris_address = %configuration.polaris_address(),
        mode = configuration.sync_mode(),
        config_root_ns = %configuration.config_root_ns(),
        "Starting Polaris to Istio sync"
    );

    let shutdown = wait_for_shutdown_signal().await;
    let bridge = Bridge::connect(&configuration).await?;
    bridge.run(shutdown).await;

    Ok(())
}
