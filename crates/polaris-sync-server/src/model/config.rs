//! Configuration management for the sync server
//!
//! Values come from, in increasing priority: built-in defaults,
//! `conf/application.yml` (optional), `POLARIS_SYNC_*` environment variables
//! (`__` separates key segments, e.g. `POLARIS_SYNC_POLARIS__ADDRESS`) and
//! command line flags.

use std::ffi::OsString;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use config::{Config, Environment, File};
use polaris_sync_client::{PolarisClientConfig, RegistryClientConfig};
use polaris_sync_common::DEFAULT_CONFIG_ROOT_NS;
use polaris_sync_mesh::ReconcilerConfig;

use super::constants::{
    DEFAULT_CONFIG_FILE, DEFAULT_EVENT_BUFFER, DEFAULT_LOGGING_LEVEL, DEFAULT_POLARIS_ADDRESS,
    DEFAULT_POLARIS_TIMEOUT_MS, DEFAULT_POLARIS_WATCH_INTERVAL_MS, DEFAULT_SCAN_INTERVAL_SECS,
    DEFAULT_STORE_TIMEOUT_MS, ENV_PREFIX, LOGGING_CONSOLE, LOGGING_DIR, LOGGING_FILE,
    LOGGING_LEVEL, LOGGING_ROTATION, MODE_MATCHED_SERVICE_ENTRY, POLARIS_ADDRESS, POLARIS_TIMEOUT_MS, POLARIS_TOKEN,
    POLARIS_WATCH_INTERVAL_MS, SYNC_CONFIG_ROOT_NS, SYNC_EVENT_BUFFER, SYNC_MODE,
    SYNC_SCAN_INTERVAL_SECS, SYNC_STORE_TIMEOUT_MS,
};
use crate::startup::{LogRotation, LoggingConfig};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "polaris-sync", version, about)]
struct Cli {
    /// Polaris server address
    #[arg(long = "polaris-address", env = "POLARIS_ADDRESS")]
    polaris_address: Option<String>,
    /// Polaris access token
    #[arg(long = "polaris-token", env = "POLARIS_TOKEN")]
    polaris_token: Option<String>,
    /// Registry method (1 = matched ServiceEntry)
    #[arg(short = 'm', long = "mode")]
    mode: Option<u32>,
    /// Namespace holding the published ServiceEntries
    #[arg(long = "config-root-ns")]
    config_root_ns: Option<String>,
    /// Configuration file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    config_file: String,
}

/// Application configuration loaded from config files, environment and flags
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load from the process arguments
    pub fn new() -> anyhow::Result<Self> {
        Self::from_args(std::env::args_os())
    }

    /// Load from an explicit argument list (first item is the program name)
    pub fn from_args<I, T>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = Cli::try_parse_from(args)?;

        let mut builder = Config::builder()
            .add_source(File::with_name(&args.config_file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = args.polaris_address {
            builder = builder.set_override(POLARIS_ADDRESS, v)?;
        }
        if let Some(v) = args.polaris_token {
            builder = builder.set_override(POLARIS_TOKEN, v)?;
        }
        if let Some(v) = args.mode {
            builder = builder.set_override(SYNC_MODE, i64::from(v))?;
        }
        if let Some(v) = args.config_root_ns {
            builder = builder.set_override(SYNC_CONFIG_ROOT_NS, v)?;
        }

        let config = builder
            .build()
            .with_context(|| format!("Failed to build configuration from {}", args.config_file))?;

        Ok(Configuration { config })
    }

    /// Reject settings the bridge cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        let mode = self.sync_mode();
        if mode != MODE_MATCHED_SERVICE_ENTRY {
            bail!(
                "unsupported registry mode {}, only {} (matched ServiceEntry) is available",
                mode,
                MODE_MATCHED_SERVICE_ENTRY
            );
        }
        if self.config_root_ns().is_empty() {
            bail!("{} must not be empty", SYNC_CONFIG_ROOT_NS);
        }
        Ok(())
    }

    // ========================================================================
    // Registry Configuration
    // ========================================================================

    pub fn polaris_address(&self) -> String {
        self.config
            .get_string(POLARIS_ADDRESS)
            .unwrap_or(DEFAULT_POLARIS_ADDRESS.to_string())
    }

    pub fn polaris_token(&self) -> Option<String> {
        self.config
            .get_string(POLARIS_TOKEN)
            .ok()
            .filter(|t| !t.is_empty())
    }

    pub fn polaris_timeout(&self) -> Duration {
        Duration::from_millis(self.get_u64(POLARIS_TIMEOUT_MS, DEFAULT_POLARIS_TIMEOUT_MS))
    }

    pub fn polaris_watch_interval_ms(&self) -> u64 {
        self.get_u64(POLARIS_WATCH_INTERVAL_MS, DEFAULT_POLARIS_WATCH_INTERVAL_MS)
    }

    // ========================================================================
    // Sync Configuration
    // ========================================================================

    pub fn sync_mode(&self) -> u32 {
        self.config
            .get_int(SYNC_MODE)
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(MODE_MATCHED_SERVICE_ENTRY)
    }

    pub fn config_root_ns(&self) -> String {
        self.config
            .get_string(SYNC_CONFIG_ROOT_NS)
            .unwrap_or(DEFAULT_CONFIG_ROOT_NS.to_string())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.get_u64(SYNC_SCAN_INTERVAL_SECS, DEFAULT_SCAN_INTERVAL_SECS))
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.get_u64(SYNC_STORE_TIMEOUT_MS, DEFAULT_STORE_TIMEOUT_MS))
    }

    pub fn event_buffer(&self) -> usize {
        self.config
            .get_int(SYNC_EVENT_BUFFER)
            .ok()
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(DEFAULT_EVENT_BUFFER)
    }

    // ========================================================================
    // Component Configuration
    // ========================================================================

    pub fn polaris_client_config(&self) -> PolarisClientConfig {
        let config = PolarisClientConfig::new(&self.polaris_address())
            .with_watch_interval(self.polaris_watch_interval_ms());
        match self.polaris_token() {
            Some(token) => config.with_token(&token),
            None => config,
        }
    }

    pub fn registry_client_config(&self) -> RegistryClientConfig {
        RegistryClientConfig::default()
            .with_request_timeout(self.polaris_timeout())
            .with_event_buffer(self.event_buffer())
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig::default()
            .with_config_root_ns(self.config_root_ns())
            .with_store_timeout(self.store_timeout())
    }

    pub fn logging_config(&self) -> LoggingConfig {
        let config = LoggingConfig::from_config(
            self.config.get_string(LOGGING_DIR).ok(),
            self.config.get_bool(LOGGING_CONSOLE).unwrap_or(true),
            self.config.get_bool(LOGGING_FILE).unwrap_or(true),
            self.config
                .get_string(LOGGING_LEVEL)
                .unwrap_or(DEFAULT_LOGGING_LEVEL.to_string()),
        );
        match self
            .config
            .get_string(LOGGING_ROTATION)
            .ok()
            .and_then(|v| LogRotation::parse(&v))
        {
            Some(rotation) => config.with_rotation(rotation),
            None => config,
        }
    }

    fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.config
            .get_int(key)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(default)
    }
}
