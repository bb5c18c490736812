//! Configuration for registry clients

use std::time::Duration;

/// Configuration for the Polaris HTTP backend
#[derive(Clone, Debug)]
pub struct PolarisClientConfig {
    /// Server address, e.g. "127.0.0.1:8090" or "http://polaris:8090"
    pub server_addr: String,
    /// Optional access token sent as `X-Polaris-Token`
    pub token: Option<String>,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Poll period of the subscription transport in milliseconds
    pub watch_interval_ms: u64,
}

impl Default for PolarisClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8090".to_string(),
            token: None,
            connect_timeout_ms: 5000,
            read_timeout_ms: 30000,
            watch_interval_ms: 2000,
        }
    }
}

impl PolarisClientConfig {
    /// Create a new config with a server address
    pub fn new(server_addr: &str) -> Self {
        Self {
            server_addr: server_addr.to_string(),
            ..Default::default()
        }
    }

    /// Set the access token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Set timeouts
    pub fn with_timeouts(mut self, connect_ms: u64, read_ms: u64) -> Self {
        self.connect_timeout_ms = connect_ms;
        self.read_timeout_ms = read_ms;
        self
    }

    /// Set the subscription poll period
    pub fn with_watch_interval(mut self, interval_ms: u64) -> Self {
        self.watch_interval_ms = interval_ms;
        self
    }

    /// Base URL with scheme and without a trailing slash
    pub fn base_url(&self) -> String {
        let addr = self.server_addr.trim_end_matches('/');
        if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{}", addr)
        }
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }
}

/// Configuration for [`crate::RegistryClient`]
#[derive(Clone, Debug)]
pub struct RegistryClientConfig {
    /// Deadline applied to every registry call made through the client
    pub request_timeout: Duration,
    /// Capacity of each per-key notification channel
    pub event_buffer: usize,
}

impl Default for RegistryClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            event_buffer: 64,
        }
    }
}

impl RegistryClientConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }
}
