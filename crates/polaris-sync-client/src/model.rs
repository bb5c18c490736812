//! Model types for registry data
//!
//! These are the bridge's own view of the registry; wire formats of concrete
//! backends are converted into them at the backend boundary.

use std::collections::HashMap;
use std::fmt;

/// Identifies one logical service inside the registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryKey {
    /// Registry namespace
    pub namespace: String,
    /// Service name within the namespace
    pub service: String,
}

impl RegistryKey {
    pub fn new(namespace: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            service: service.into(),
        }
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.service)
    }
}

/// One endpoint reported by the registry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceRecord {
    /// Instance ID assigned by the registry (may be empty)
    pub id: String,
    /// IP address or hostname
    pub host: String,
    /// Port
    pub port: u32,
    /// Named protocol, e.g. "http" or "grpc" (may be empty)
    pub protocol: String,
    /// Load balancing weight
    pub weight: u32,
    /// Whether the registry considers the instance healthy
    pub healthy: bool,
    /// Whether the instance is isolated from traffic
    pub isolate: bool,
    /// Opaque per-instance revision
    pub revision: String,
    /// Metadata
    pub metadata: HashMap<String, String>,
}

impl InstanceRecord {
    pub fn new(host: impl Into<String>, port: u32, protocol: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: protocol.into(),
            weight: 100,
            healthy: true,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    /// Stable identity used to diff snapshots; falls back to `host:port`
    /// when the registry did not assign an ID.
    pub fn identity(&self) -> String {
        if self.id.is_empty() {
            format!("{}:{}", self.host, self.port)
        } else {
            self.id.clone()
        }
    }
}

/// The full instance list of one service, as returned by a single query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceSet {
    pub key: RegistryKey,
    pub instances: Vec<InstanceRecord>,
    /// Service-level revision; changes whenever the instance list changes
    pub revision: String,
}

impl InstanceSet {
    pub fn new(
        key: RegistryKey,
        instances: Vec<InstanceRecord>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            key,
            instances,
            revision: revision.into(),
        }
    }
}

/// Kind of change carried by a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Updated => "updated",
            ChangeKind::Removed => "removed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something changed for a subscribed service
///
/// Consumers are expected to re-read the full instance list rather than apply
/// the notification incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub key: RegistryKey,
    pub kind: ChangeKind,
    /// Identities of the instances involved, when the backend knows them
    pub instance_ids: Vec<String>,
}

impl ChangeNotification {
    pub fn new(key: RegistryKey, kind: ChangeKind, instance_ids: Vec<String>) -> Self {
        Self {
            key,
            kind,
            instance_ids,
        }
    }
}
