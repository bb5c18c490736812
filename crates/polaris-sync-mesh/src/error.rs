//! Error types for the mesh side of the bridge

use std::time::Duration;

use polaris_sync_client::ClientError;

/// A published object lacks the annotations naming its registry origin
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("registry info should have [annotation]: {0}")]
    MissingAnnotation(&'static str),
}

/// Error type for mesh store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("ServiceEntry {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("ServiceEntry {namespace}/{name} was modified concurrently")]
    Conflict { namespace: String, name: String },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Why a single sync of one registry service did not complete
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("registry query failed: {0}")]
    Registry(#[from] ClientError),

    #[error("invalid registry info: {0}")]
    Parse(#[from] ParseError),

    #[error("mesh store operation failed: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_names_missing_key() {
        let err = ParseError::MissingAnnotation("aeraki.net/polarisService");
        assert_eq!(
            err.to_string(),
            "registry info should have [annotation]: aeraki.net/polarisService"
        );
    }

    #[test]
    fn test_store_error_predicates() {
        let err = StoreError::NotFound {
            namespace: "polaris".to_string(),
            name: "test.polaris-demo".to_string(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
        assert_eq!(
            err.to_string(),
            "ServiceEntry polaris/test.polaris-demo not found"
        );

        let err: SyncError = StoreError::Conflict {
            namespace: "polaris".to_string(),
            name: "test.polaris-demo".to_string(),
        }
        .into();
        assert!(matches!(err, SyncError::Store(ref e) if e.is_conflict()));
    }
}
