//! Polaris Sync Client - registry side of the bridge
//!
//! This crate provides:
//! - Model types for registry responses (`RegistryKey`, `InstanceRecord`, `InstanceSet`)
//! - The `RegistryApi` trait describing what a registry backend must offer
//! - `PolarisHttpClient`, a backend speaking the Polaris open API
//! - `InMemoryRegistry`, a process-local backend for tests and demos
//! - `RegistryClient`, which deduplicates subscriptions per key and relays
//!   change notifications to a per-key channel

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod memory;
pub mod model;
pub mod subscription;

pub use api::{EventStream, RegistryApi};
pub use config::{PolarisClientConfig, RegistryClientConfig};
pub use error::{ClientError, Result};
pub use http::PolarisHttpClient;
pub use memory::InMemoryRegistry;
pub use model::*;
pub use subscription::{RegistryClient, Subscription};
