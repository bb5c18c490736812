// Configuration keys and their defaults

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const ENV_PREFIX: &str = "POLARIS_SYNC";

// Registry
pub const POLARIS_ADDRESS: &str = "polaris.address";
pub const POLARIS_TOKEN: &str = "polaris.token";
pub const POLARIS_TIMEOUT_MS: &str = "polaris.timeout_ms";
pub const POLARIS_WATCH_INTERVAL_MS: &str = "polaris.watch_interval_ms";

pub const DEFAULT_POLARIS_ADDRESS: &str = "127.0.0.1:8090";
pub const DEFAULT_POLARIS_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_POLARIS_WATCH_INTERVAL_MS: u64 = 2000;

// Sync
pub const SYNC_MODE: &str = "sync.mode";
pub const SYNC_CONFIG_ROOT_NS: &str = "sync.config_root_ns";
pub const SYNC_SCAN_INTERVAL_SECS: &str = "sync.scan_interval_secs";
pub const SYNC_STORE_TIMEOUT_MS: &str = "sync.store_timeout_ms";
pub const SYNC_EVENT_BUFFER: &str = "sync.event_buffer";

/// Discover services through ServiceEntries carrying registry annotations
pub const MODE_MATCHED_SERVICE_ENTRY: u32 = 1;
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 10000;
pub const DEFAULT_EVENT_BUFFER: usize = 64;

// Logging
pub const LOGGING_DIR: &str = "logging.dir";
pub const LOGGING_CONSOLE: &str = "logging.console";
pub const LOGGING_FILE: &str = "logging.file";
pub const LOGGING_LEVEL: &str = "logging.level";
pub const LOGGING_ROTATION: &str = "logging.rotation";

pub const DEFAULT_LOGGING_LEVEL: &str = "info";
