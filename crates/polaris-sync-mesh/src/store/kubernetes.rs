//! Kubernetes-backed ServiceEntry store
//!
//! Talks to the API server through the `kube` dynamic API, so no generated
//! Istio client types are needed.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ApiResource, DynamicObject, ListParams, PostParams};
use kube::core::GroupVersionKind;
use kube::Client;
use polaris_sync_common::FIELD_MANAGER;
use tracing::{debug, warn};

use super::{Result, ServiceEntryStore, label_selector};
use crate::error::StoreError;
use crate::types::{
    ISTIO_NETWORKING_GROUP, ResourceMetadata, SERVICE_ENTRY_KIND, SERVICE_ENTRY_PLURAL,
    SERVICE_ENTRY_VERSION, ServiceEntry, ServiceEntrySpec,
};

/// `networking.istio.io/v1alpha3` ServiceEntry
pub fn service_entry_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk(
        ISTIO_NETWORKING_GROUP,
        SERVICE_ENTRY_VERSION,
        SERVICE_ENTRY_KIND,
    );
    ApiResource::from_gvk_with_plural(&gvk, SERVICE_ENTRY_PLURAL)
}

/// ServiceEntry store on a Kubernetes API server
#[derive(Clone)]
pub struct KubeServiceEntryStore {
    client: Client,
    resource: ApiResource,
}

impl KubeServiceEntryStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resource: service_entry_resource(),
        }
    }

    /// Connect using the in-cluster config or the local kubeconfig
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ServiceEntryStore for KubeServiceEntryStore {
    async fn list(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ServiceEntry>> {
        let params = ListParams::default().labels(&label_selector(labels));
        let objects = self.api(namespace).list(&params).await?;

        let mut entries = Vec::with_capacity(objects.items.len());
        for object in objects.items {
            let name = object.metadata.name.clone().unwrap_or_default();
            match from_dynamic(object) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(
                        namespace = %namespace,
                        name = %name,
                        error = %e,
                        "Skipping undecodable ServiceEntry"
                    );
                }
            }
        }

        debug!(namespace = %namespace, count = entries.len(), "Listed ServiceEntries");
        Ok(entries)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<ServiceEntry> {
        let object = self
            .api(namespace)
            .get(name)
            .await
            .map_err(|e| map_kube_error(e, namespace, name))?;
        from_dynamic(object)
    }

    async fn create(&self, entry: ServiceEntry) -> Result<ServiceEntry> {
        let namespace = entry.metadata.namespace.clone();
        let name = entry.metadata.name.clone();
        let object = to_dynamic(&entry, &self.resource)?;

        let created = self
            .api(&namespace)
            .create(&Self::post_params(), &object)
            .await
            .map_err(|e| map_kube_error(e, &namespace, &name))?;
        from_dynamic(created)
    }

    async fn update(&self, entry: ServiceEntry) -> Result<ServiceEntry> {
        let namespace = entry.metadata.namespace.clone();
        let name = entry.metadata.name.clone();
        let object = to_dynamic(&entry, &self.resource)?;

        let replaced = self
            .api(&namespace)
            .replace(&name, &Self::post_params(), &object)
            .await
            .map_err(|e| map_kube_error(e, &namespace, &name))?;
        from_dynamic(replaced)
    }
}

fn map_kube_error(error: kube::Error, namespace: &str, name: &str) -> StoreError {
    match error {
        kube::Error::Api(response) if response.code == 404 => StoreError::NotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(response) if response.code == 409 => StoreError::Conflict {
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        other => StoreError::Kube(other),
    }
}

pub(crate) fn to_dynamic(entry: &ServiceEntry, resource: &ApiResource) -> Result<DynamicObject> {
    let metadata = &entry.metadata;
    let mut object = DynamicObject::new(&metadata.name, resource).within(&metadata.namespace);
    object.metadata = ObjectMeta {
        name: Some(metadata.name.clone()),
        namespace: Some(metadata.namespace.clone()),
        labels: Some(metadata.labels.clone()),
        annotations: Some(metadata.annotations.clone()),
        resource_version: (!metadata.resource_version.is_empty())
            .then(|| metadata.resource_version.clone()),
        ..Default::default()
    };
    object.data = serde_json::json!({ "spec": serde_json::to_value(&entry.spec)? });
    Ok(object)
}

pub(crate) fn from_dynamic(object: DynamicObject) -> Result<ServiceEntry> {
    let meta = object.metadata;
    let spec = match object.data.get("spec") {
        Some(spec) => serde_json::from_value::<ServiceEntrySpec>(spec.clone())?,
        None => ServiceEntrySpec::default(),
    };

    Ok(ServiceEntry {
        metadata: ResourceMetadata {
            name: meta.name.unwrap_or_default(),
            namespace: meta.namespace.unwrap_or_default(),
            labels: meta.labels.unwrap_or_default(),
            annotations: meta.annotations.unwrap_or_default(),
            resource_version: meta.resource_version.unwrap_or_default(),
        },
        spec,
    })
}
