//! Polaris Sync Mesh - Istio side of the bridge
//!
//! This crate projects Polaris registry services into Istio ServiceEntry
//! objects and keeps them in step with the registry:
//! - `types` - ServiceEntry object model
//! - `conversion` - instance list to ServiceEntry conversion
//! - `store` - mesh configuration store (Kubernetes and in-memory)
//! - `reconciler` - revision-guarded update of one published object
//! - `scanner` - discovery of the services to watch
//! - `scan_loop` - periodic discovery

pub mod conversion;
pub mod error;
pub mod reconciler;
pub mod scan_loop;
pub mod scanner;
pub mod store;
pub mod types;

pub use conversion::{RegistryInfo, convert_service_entry, service_entry_name, service_hostname};
pub use error::{ParseError, StoreError, SyncError};
pub use reconciler::{Reconciler, ReconcilerConfig, SyncOutcome};
pub use scan_loop::{DEFAULT_SCAN_INTERVAL, ScanLoop};
pub use scanner::{DiscoveryScanner, ScanReport};
pub use store::{InMemoryServiceEntryStore, KubeServiceEntryStore, ServiceEntryStore};
pub use types::ServiceEntry;
