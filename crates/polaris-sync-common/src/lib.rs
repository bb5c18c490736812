//! Polaris Sync Common - Shared types used across all polaris-sync components
//!
//! This crate provides:
//! - `ShutdownSignal`: the process-wide cooperative cancellation signal
//! - Common constants shared by the registry and mesh sides

pub mod shutdown;

pub use shutdown::ShutdownSignal;

/// Field manager recorded on every object this bridge writes
pub const FIELD_MANAGER: &str = "aeraki";

/// Registry type marker placed on published objects
pub const REGISTRY_TYPE: &str = "polaris";

/// Default namespace for published objects
pub const DEFAULT_CONFIG_ROOT_NS: &str = "polaris";
