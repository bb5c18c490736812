//! Client error types for the registry side

use std::time::Duration;

use crate::model::RegistryKey;

/// Error type for registry operations
///
/// Every variant is an upstream failure from the bridge's point of view: the
/// operation is abandoned for this cycle and retried only by the next scan
/// tick or change notification.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("server returned error: code={code}, info={info}")]
    ServerError { code: u32, info: String },

    #[error("service not found: {0}")]
    ServiceNotFound(RegistryKey),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, ClientError>;
