//! Polaris HTTP backend
//!
//! Queries instances through the Polaris open API (`POST /v1/Discover`).
//! Subscriptions are implemented as revision-aware polling: each poll sends
//! the last seen service revision, and the server answers "no change" until
//! the instance list moves.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{EventStream, RegistryApi};
use crate::config::PolarisClientConfig;
use crate::error::{ClientError, Result};
use crate::model::{ChangeKind, ChangeNotification, InstanceRecord, InstanceSet, RegistryKey};

const DISCOVER_PATH: &str = "/v1/Discover";
const TOKEN_HEADER: &str = "X-Polaris-Token";
const DISCOVER_TYPE_INSTANCE: &str = "INSTANCE";

/// Response codes of the Polaris open API
pub mod codes {
    pub const EXECUTE_SUCCESS: u32 = 200000;
    pub const DATA_NO_CHANGE: u32 = 200001;
    pub const NOT_FOUND_SERVICE: u32 = 400301;
}

#[derive(Debug, Serialize)]
struct DiscoverRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    service: ServiceRef<'a>,
}

#[derive(Debug, Serialize)]
struct ServiceRef<'a> {
    name: &'a str,
    namespace: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    revision: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DiscoverResponse {
    code: u32,
    info: String,
    service: Option<WireService>,
    instances: Vec<WireInstance>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireService {
    revision: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireInstance {
    id: String,
    host: String,
    port: u32,
    protocol: String,
    weight: u32,
    healthy: bool,
    isolate: bool,
    revision: String,
    metadata: HashMap<String, String>,
}

impl From<WireInstance> for InstanceRecord {
    fn from(wire: WireInstance) -> Self {
        InstanceRecord {
            id: wire.id,
            host: wire.host,
            port: wire.port,
            protocol: wire.protocol,
            weight: wire.weight,
            healthy: wire.healthy,
            isolate: wire.isolate,
            revision: wire.revision,
            metadata: wire.metadata,
        }
    }
}

/// Result of a single discover call
#[derive(Debug)]
enum DiscoverOutcome {
    Changed(InstanceSet),
    Unchanged,
    NotFound,
}

/// Registry backend speaking the Polaris open API
#[derive(Clone)]
pub struct PolarisHttpClient {
    client: Client,
    config: PolarisClientConfig,
}

impl PolarisHttpClient {
    /// Create a new client
    pub fn new(config: PolarisClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &PolarisClientConfig {
        &self.config
    }

    async fn discover(&self, key: &RegistryKey, revision: &str) -> Result<DiscoverOutcome> {
        let url = format!("{}{}", self.config.base_url(), DISCOVER_PATH);
        let request = DiscoverRequest {
            kind: DISCOVER_TYPE_INSTANCE,
            service: ServiceRef {
                name: &key.service,
                namespace: &key.namespace,
                revision,
            },
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(token) = &self.config.token {
            builder = builder.header(TOKEN_HEADER, token);
        }

        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        let body: DiscoverResponse = match serde_json::from_slice(&bytes) {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(ClientError::ServerError {
                    code: u32::from(status.as_u16()),
                    info: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        match body.code {
            codes::EXECUTE_SUCCESS => {
                let revision = body.service.map(|s| s.revision).unwrap_or_default();
                let instances = body.instances.into_iter().map(Into::into).collect();
                Ok(DiscoverOutcome::Changed(InstanceSet::new(
                    key.clone(),
                    instances,
                    revision,
                )))
            }
            codes::DATA_NO_CHANGE => Ok(DiscoverOutcome::Unchanged),
            codes::NOT_FOUND_SERVICE => Ok(DiscoverOutcome::NotFound),
            code => Err(ClientError::ServerError {
                code,
                info: body.info,
            }),
        }
    }
}

#[async_trait]
impl RegistryApi for PolarisHttpClient {
    async fn list_all_instances(&self, key: &RegistryKey) -> Result<InstanceSet> {
        match self.discover(key, "").await? {
            DiscoverOutcome::Changed(set) => {
                debug!(
                    namespace = %key.namespace,
                    service = %key.service,
                    instances = set.instances.len(),
                    revision = %set.revision,
                    "Queried registry instances"
                );
                Ok(set)
            }
            DiscoverOutcome::NotFound => Err(ClientError::ServiceNotFound(key.clone())),
            DiscoverOutcome::Unchanged => Err(ClientError::ServerError {
                code: codes::DATA_NO_CHANGE,
                info: "unexpected no-change answer to an unconditional query".to_string(),
            }),
        }
    }

    async fn watch(&self, key: &RegistryKey) -> Result<EventStream> {
        let baseline = self.list_all_instances(key).await?;
        let state = PollState {
            client: self.clone(),
            key: key.clone(),
            revision: baseline.revision.clone(),
            snapshot: snapshot_of(&baseline),
            interval: self.config.watch_interval(),
        };

        info!(
            namespace = %key.namespace,
            service = %key.service,
            revision = %state.revision,
            interval_ms = state.interval.as_millis() as u64,
            "Watching registry service"
        );

        let stream = futures::stream::unfold(state, poll_changes).flat_map(futures::stream::iter);
        Ok(stream.boxed())
    }
}

/// Polling state carried between iterations of a watch stream
struct PollState {
    client: PolarisHttpClient,
    key: RegistryKey,
    revision: String,
    snapshot: BTreeMap<String, String>,
    interval: Duration,
}

/// Poll until the service moves, then yield the notifications describing the
/// move. Returns `None` once the registry reports the service as gone.
async fn poll_changes(
    mut state: PollState,
) -> Option<(Vec<ChangeNotification>, PollState)> {
    loop {
        tokio::time::sleep(state.interval).await;

        match state.client.discover(&state.key, &state.revision).await {
            Ok(DiscoverOutcome::Unchanged) => continue,
            Ok(DiscoverOutcome::NotFound) => {
                info!(key = %state.key, "Service no longer exists in registry, ending watch");
                return None;
            }
            Ok(DiscoverOutcome::Changed(set)) => {
                if set.revision == state.revision {
                    continue;
                }
                let next = snapshot_of(&set);
                let mut events = diff_snapshots(&state.key, &state.snapshot, &next);
                if events.is_empty() {
                    // Revision moved without instance changes (e.g. service metadata)
                    events.push(ChangeNotification::new(
                        state.key.clone(),
                        ChangeKind::Updated,
                        Vec::new(),
                    ));
                }
                debug!(
                    key = %state.key,
                    old_revision = %state.revision,
                    new_revision = %set.revision,
                    events = events.len(),
                    "Registry service changed"
                );
                state.revision = set.revision;
                state.snapshot = next;
                return Some((events, state));
            }
            Err(e) => {
                warn!(key = %state.key, error = %e, "Failed to poll registry service");
            }
        }
    }
}

/// Instance identity -> instance revision
fn snapshot_of(set: &InstanceSet) -> BTreeMap<String, String> {
    set.instances
        .iter()
        .map(|instance| (instance.identity(), instance.revision.clone()))
        .collect()
}

/// Compare two snapshots and produce at most one notification per change kind
pub(crate) fn diff_snapshots(
    key: &RegistryKey,
    previous: &BTreeMap<String, String>,
    next: &BTreeMap<String, String>,
) -> Vec<ChangeNotification> {
    let mut added = Vec::new();
    let mut updated = Vec::new();
    let mut removed = Vec::new();

    for (id, revision) in next {
        match previous.get(id) {
            None => added.push(id.clone()),
            Some(old) if old != revision => updated.push(id.clone()),
            Some(_) => {}
        }
    }
    for id in previous.keys() {
        if !next.contains_key(id) {
            removed.push(id.clone());
        }
    }

    [
        (ChangeKind::Added, added),
        (ChangeKind::Updated, updated),
        (ChangeKind::Removed, removed),
    ]
    .into_iter()
    .filter(|(_, ids)| !ids.is_empty())
    .map(|(kind, ids)| ChangeNotification::new(key.clone(), kind, ids))
    .collect()
}
