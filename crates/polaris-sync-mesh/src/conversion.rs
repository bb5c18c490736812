//! Polaris to ServiceEntry conversion
//!
//! Pure functions turning one registry instance list into the spec and
//! annotations of the ServiceEntry that represents it in the mesh.

use std::collections::BTreeMap;

use polaris_sync_client::{InstanceRecord, InstanceSet, RegistryKey};
use polaris_sync_common::{FIELD_MANAGER, REGISTRY_TYPE};
use tracing::{debug, warn};

use crate::error::ParseError;
use crate::types::{Location, Port, Protocol, Resolution, ServiceEntrySpec, WorkloadEntry};

/// Registry namespace of the origin service
pub const ANNOTATION_NAMESPACE: &str = "aeraki.net/polarisNamespace";
/// Registry name of the origin service
pub const ANNOTATION_SERVICE: &str = "aeraki.net/polarisService";
/// Revision of the instance list the object was built from
pub const ANNOTATION_REVISION: &str = "aeraki.net/revision";
/// Routing hint; "false" places the service inside the mesh
pub const ANNOTATION_EXTERNAL: &str = "aeraki.net/external";

/// Label naming the controller that owns the object
pub const LABEL_MANAGER: &str = "manager";
/// Label naming the registry the object was projected from
pub const LABEL_REGISTRY: &str = "registry";

const DEFAULT_PORT_NAME: &str = "tcp";
const DEFAULT_EXTERNAL: &str = "true";

/// Lower-case and replace `_` and `:` with `-`
pub fn normalize(s: &str) -> String {
    s.replace(['_', ':'], "-").to_lowercase()
}

/// Mesh hostname of a registry service
pub fn service_hostname(namespace: &str, service: &str) -> String {
    format!("{}.polaris-{}.polaris", normalize(namespace), normalize(service))
}

/// Object name of the ServiceEntry representing a registry service
pub fn service_entry_name(namespace: &str, service: &str) -> String {
    format!("{}.polaris-{}", normalize(namespace), normalize(service))
}

/// Labels marking an object as managed by this bridge
pub fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_MANAGER.to_string(), FIELD_MANAGER.to_string()),
        (LABEL_REGISTRY.to_string(), REGISTRY_TYPE.to_string()),
    ])
}

/// Registry origin of a published object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryInfo {
    pub key: RegistryKey,
    /// Raw routing hint, "true" unless the object says otherwise
    pub external: String,
}

impl RegistryInfo {
    pub fn new(key: RegistryKey) -> Self {
        Self {
            key,
            external: DEFAULT_EXTERNAL.to_string(),
        }
    }

    pub fn with_external(mut self, external: impl Into<String>) -> Self {
        self.external = external.into();
        self
    }

    /// Read the registry origin from an object's annotations
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Result<Self, ParseError> {
        let service = annotations
            .get(ANNOTATION_SERVICE)
            .ok_or(ParseError::MissingAnnotation(ANNOTATION_SERVICE))?;
        let namespace = annotations
            .get(ANNOTATION_NAMESPACE)
            .ok_or(ParseError::MissingAnnotation(ANNOTATION_NAMESPACE))?;
        let external = annotations
            .get(ANNOTATION_EXTERNAL)
            .map(String::as_str)
            .unwrap_or(DEFAULT_EXTERNAL);

        Ok(Self {
            key: RegistryKey::new(namespace.as_str(), service.as_str()),
            external: external.to_string(),
        })
    }

    pub fn location(&self) -> Location {
        if self.external == "false" {
            Location::MeshInternal
        } else {
            Location::MeshExternal
        }
    }
}

/// Build the ServiceEntry spec and annotations for one instance list
///
/// Never fails: instances without a protocol get a `tcp` port, unknown
/// protocols are published as TCP, and when two instances share a port
/// number the first-seen protocol wins. Endpoints keep the input order.
pub fn convert_service_entry(
    set: &InstanceSet,
    info: &RegistryInfo,
) -> (ServiceEntrySpec, BTreeMap<String, String>) {
    let key = &set.key;
    debug!(
        namespace = %key.namespace,
        service = %key.service,
        instances = set.instances.len(),
        revision = %set.revision,
        "Converting registry service to ServiceEntry"
    );

    let mut ports: Vec<Port> = Vec::new();
    let mut endpoints = Vec::with_capacity(set.instances.len());

    for instance in &set.instances {
        let port = convert_port(instance);

        match ports.iter().find(|p| p.number == port.number) {
            Some(existing) if existing.protocol != port.protocol => {
                warn!(
                    service = %key.service,
                    port = port.number,
                    kept = %existing.protocol,
                    ignored = %port.protocol,
                    "Service has two instances on the same port with different protocols"
                );
            }
            Some(_) => {}
            None => ports.push(port.clone()),
        }

        endpoints.push(WorkloadEntry {
            address: instance.host.clone(),
            ports: BTreeMap::from([(port.name, port.number)]),
            weight: Some(instance.weight),
            ..Default::default()
        });
    }

    let spec = ServiceEntrySpec {
        hosts: vec![service_hostname(&key.namespace, &key.service)],
        ports,
        location: info.location(),
        resolution: Resolution::Static,
        endpoints,
        ..Default::default()
    };

    let annotations = BTreeMap::from([
        (ANNOTATION_NAMESPACE.to_string(), key.namespace.clone()),
        (ANNOTATION_SERVICE.to_string(), key.service.clone()),
        (ANNOTATION_REVISION.to_string(), set.revision.clone()),
        (ANNOTATION_EXTERNAL.to_string(), info.external.clone()),
    ]);

    (spec, annotations)
}

fn convert_port(instance: &InstanceRecord) -> Port {
    let name = if instance.protocol.is_empty() {
        DEFAULT_PORT_NAME
    } else {
        instance.protocol.as_str()
    };

    Port {
        number: instance.port,
        name: name.to_string(),
        protocol: convert_protocol(name),
        target_port: Some(instance.port),
    }
}

fn convert_protocol(name: &str) -> Protocol {
    Protocol::parse(name).unwrap_or_else(|| {
        warn!(protocol = %name, "Unsupported protocol, publishing as TCP");
        Protocol::Tcp
    })
}
