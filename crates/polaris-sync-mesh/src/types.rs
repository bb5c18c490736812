//! Istio ServiceEntry object model
//!
//! Only the parts of `networking.istio.io/v1alpha3` ServiceEntry this bridge
//! reads or writes. Label and annotation maps are ordered so that two
//! conversions of the same input serialize identically.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// API group of Istio networking resources
pub const ISTIO_NETWORKING_GROUP: &str = "networking.istio.io";
/// API version of the ServiceEntry resource this bridge manages
pub const SERVICE_ENTRY_VERSION: &str = "v1alpha3";
/// Kind of the ServiceEntry resource
pub const SERVICE_ENTRY_KIND: &str = "ServiceEntry";
/// Plural resource name of ServiceEntry
pub const SERVICE_ENTRY_PLURAL: &str = "serviceentries";

/// Istio ServiceEntry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Resource metadata
    pub metadata: ResourceMetadata,
    /// ServiceEntry spec
    pub spec: ServiceEntrySpec,
}

impl ServiceEntry {
    pub fn new(metadata: ResourceMetadata, spec: ServiceEntrySpec) -> Self {
        Self { metadata, spec }
    }

    /// Whether every `selector` label is present on this entry with the same value
    pub fn matches_labels(&self, selector: &BTreeMap<String, String>) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.metadata.labels.get(k) == Some(v))
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }
}

/// Resource metadata (Kubernetes-style)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    /// Resource name
    pub name: String,
    /// Namespace
    pub namespace: String,
    /// Labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Concurrency token of the stored object; empty for objects not yet stored
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
}

impl ResourceMetadata {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }
}

/// ServiceEntry specification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceEntrySpec {
    /// Hosts associated with the service
    pub hosts: Vec<String>,
    /// Addresses (virtual IPs) for the service
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    /// Ports exposed by the service
    pub ports: Vec<Port>,
    /// Service location (internal or external to mesh)
    pub location: Location,
    /// Service discovery mode
    pub resolution: Resolution,
    /// Endpoints for the service (when resolution is STATIC)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<WorkloadEntry>,
    /// Export configuration
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub export_to: Vec<String>,
}

/// Service port definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    /// Port number
    pub number: u32,
    /// Port name
    #[serde(default)]
    pub name: String,
    /// Protocol (HTTP, HTTPS, GRPC, TCP, etc.)
    #[serde(default)]
    pub protocol: Protocol,
    /// Target port (if different from number)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u32>,
}

/// Protocol type, written in Istio's canonical spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    Http,
    Https,
    Grpc,
    GrpcWeb,
    Http2,
    HttpProxy,
    #[default]
    Tcp,
    Tls,
    Udp,
    Mongo,
    Mysql,
    Redis,
}

impl Protocol {
    const ALL: [Protocol; 12] = [
        Protocol::Http,
        Protocol::Https,
        Protocol::Grpc,
        Protocol::GrpcWeb,
        Protocol::Http2,
        Protocol::HttpProxy,
        Protocol::Tcp,
        Protocol::Tls,
        Protocol::Udp,
        Protocol::Mongo,
        Protocol::Mysql,
        Protocol::Redis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
            Protocol::Grpc => "GRPC",
            Protocol::GrpcWeb => "GRPC-Web",
            Protocol::Http2 => "HTTP2",
            Protocol::HttpProxy => "HTTP_PROXY",
            Protocol::Tcp => "TCP",
            Protocol::Tls => "TLS",
            Protocol::Udp => "UDP",
            Protocol::Mongo => "Mongo",
            Protocol::Mysql => "MySQL",
            Protocol::Redis => "Redis",
        }
    }

    /// Parse a protocol name case-insensitively; `None` if Istio does not know it
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Protocol::parse(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown protocol: {}", name)))
    }
}

/// Service discovery resolution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    /// No resolution (passthrough)
    #[default]
    None,
    /// Use STATIC endpoints
    Static,
    /// Use DNS resolution
    Dns,
    /// Use DNS round-robin resolution
    DnsRoundRobin,
}

/// Service location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Location {
    /// Service is outside the mesh
    #[default]
    MeshExternal,
    /// Service is inside the mesh
    MeshInternal,
}

/// Workload entry (endpoint) for ServiceEntry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkloadEntry {
    /// IP address or hostname of the endpoint
    #[serde(skip_serializing_if = "String::is_empty")]
    pub address: String,
    /// Port name -> port number
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub ports: BTreeMap<String, u32>,
    /// Labels for the endpoint
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Weight (for load balancing)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse_is_case_insensitive() {
        assert_eq!(Protocol::parse("http"), Some(Protocol::Http));
        assert_eq!(Protocol::parse("GRPC"), Some(Protocol::Grpc));
        assert_eq!(Protocol::parse("grpc-web"), Some(Protocol::GrpcWeb));
        assert_eq!(Protocol::parse("mysql"), Some(Protocol::Mysql));
        assert_eq!(Protocol::parse("http_proxy"), Some(Protocol::HttpProxy));
        assert_eq!(Protocol::parse("dubbo"), None);
        assert_eq!(Protocol::parse(""), None);
    }

    #[test]
    fn test_spec_serialization() {
        let spec = ServiceEntrySpec {
            hosts: vec!["test.polaris-demo.polaris".to_string()],
            ports: vec![Port {
                number: 8080,
                name: "http".to_string(),
                protocol: Protocol::Http,
                target_port: Some(8080),
            }],
            location: Location::MeshInternal,
            resolution: Resolution::Static,
            endpoints: vec![WorkloadEntry {
                address: "10.0.0.1".to_string(),
                ports: BTreeMap::from([("http".to_string(), 8080)]),
                weight: Some(100),
                ..Default::default()
            }],
            ..Default::default()
        };

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["location"], "MESH_INTERNAL");
        assert_eq!(json["resolution"], "STATIC");
        assert_eq!(json["ports"][0]["protocol"], "HTTP");
        assert_eq!(json["ports"][0]["targetPort"], 8080);
        assert_eq!(json["endpoints"][0]["ports"]["http"], 8080);
        assert!(json.get("addresses").is_none());

        let back: ServiceEntrySpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_spec_tolerates_foreign_fields() {
        let spec: ServiceEntrySpec = serde_json::from_value(serde_json::json!({
            "hosts": ["a.example.com"],
            "ports": [{"number": 80, "name": "http", "protocol": "http"}],
            "resolution": "DNS",
            "workloadSelector": {"labels": {"app": "a"}}
        }))
        .unwrap();
        assert_eq!(spec.ports[0].protocol, Protocol::Http);
        assert_eq!(spec.resolution, Resolution::Dns);
        assert_eq!(spec.location, Location::MeshExternal);
    }

    #[test]
    fn test_matches_labels() {
        let mut entry = ServiceEntry::default();
        entry.metadata.labels.insert("manager".into(), "aeraki".into());
        entry.metadata.labels.insert("registry".into(), "polaris".into());

        let selector = BTreeMap::from([("registry".to_string(), "polaris".to_string())]);
        assert!(entry.matches_labels(&selector));

        let selector = BTreeMap::from([("registry".to_string(), "nacos".to_string())]);
        assert!(!entry.matches_labels(&selector));
    }
}
