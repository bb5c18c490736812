//! Polaris Sync Server - process entry for the registry to mesh bridge
//!
//! - `model` - layered configuration (file, environment, command line)
//! - `startup` - logging, signal handling and bridge assembly

pub mod model;
pub mod startup;
