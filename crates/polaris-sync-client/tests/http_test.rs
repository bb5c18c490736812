//! Polaris HTTP backend tests
//!
//! Run against a wiremock server standing in for the Polaris open API.

use std::time::Duration;

use futures::StreamExt;
use polaris_sync_client::{
    ChangeKind, ClientError, PolarisClientConfig, PolarisHttpClient, RegistryApi, RegistryKey,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn discover_body(revision: &str, instances: serde_json::Value) -> serde_json::Value {
    json!({
        "code": 200000,
        "info": "execute success",
        "type": "INSTANCE",
        "service": {"name": "demo", "namespace": "Testns", "revision": revision},
        "instances": instances
    })
}

fn three_instances() -> serde_json::Value {
    json!([
        {"id": "i1", "host": "10.0.0.1", "port": 8080, "protocol": "http", "weight": 100, "healthy": true, "revision": "a"},
        {"id": "i2", "host": "10.0.0.2", "port": 8080, "protocol": "http", "weight": 100, "healthy": true, "revision": "a"},
        {"id": "i3", "host": "10.0.0.3", "port": 9090, "protocol": "grpc", "weight": 50, "healthy": true, "revision": "a"}
    ])
}

fn client_for(server: &MockServer) -> PolarisHttpClient {
    let config = PolarisClientConfig::new(&server.uri()).with_watch_interval(20);
    PolarisHttpClient::new(config).unwrap()
}

#[tokio::test]
async fn test_list_all_instances() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/Discover"))
        .and(body_partial_json(json!({
            "type": "INSTANCE",
            "service": {"name": "demo", "namespace": "Testns"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(discover_body("rev-1", three_instances())))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let set = client
        .list_all_instances(&RegistryKey::new("Testns", "demo"))
        .await
        .unwrap();

    assert_eq!(set.revision, "rev-1");
    assert_eq!(set.instances.len(), 3);
    assert_eq!(set.instances[2].protocol, "grpc");
    assert_eq!(set.instances[2].weight, 50);
    assert_eq!(set.key, RegistryKey::new("Testns", "demo"));
}

#[tokio::test]
async fn test_token_header_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/Discover"))
        .and(header("X-Polaris-Token", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(discover_body("rev-1", json!([]))))
        .mount(&server)
        .await;

    let config = PolarisClientConfig::new(&server.uri()).with_token("secret");
    let client = PolarisHttpClient::new(config).unwrap();
    let set = client
        .list_all_instances(&RegistryKey::new("Testns", "demo"))
        .await
        .unwrap();
    assert!(set.instances.is_empty());
}

#[tokio::test]
async fn test_service_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/Discover"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": 400301,
            "info": "not found service"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client
        .list_all_instances(&RegistryKey::new("Testns", "missing"))
        .await;
    assert!(matches!(result, Err(ClientError::ServiceNotFound(_))));
}

#[tokio::test]
async fn test_server_error_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/Discover"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client
        .list_all_instances(&RegistryKey::new("Testns", "demo"))
        .await;
    match result {
        Err(ClientError::ServerError { code, info }) => {
            assert_eq!(code, 500);
            assert_eq!(info, "internal error");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_watch_emits_diff_and_ends_when_service_disappears() {
    let server = MockServer::start().await;

    // Unconditional query establishes the baseline
    Mock::given(method("POST"))
        .and(path("/v1/Discover"))
        .respond_with(ResponseTemplate::new(200).set_body_json(discover_body("rev-1", three_instances())))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    // First poll: one instance removed
    Mock::given(method("POST"))
        .and(path("/v1/Discover"))
        .and(body_partial_json(json!({"service": {"revision": "rev-1"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(discover_body(
            "rev-2",
            json!([
                {"id": "i1", "host": "10.0.0.1", "port": 8080, "protocol": "http", "weight": 100, "revision": "a"},
                {"id": "i3", "host": "10.0.0.3", "port": 9090, "protocol": "grpc", "weight": 50, "revision": "a"}
            ]),
        )))
        .with_priority(2)
        .mount(&server)
        .await;

    // Afterwards the service is gone
    Mock::given(method("POST"))
        .and(path("/v1/Discover"))
        .and(body_partial_json(json!({"service": {"revision": "rev-2"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 400301,
            "info": "not found service"
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut stream = client
        .watch(&RegistryKey::new("Testns", "demo"))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.kind, ChangeKind::Removed);
    assert_eq!(event.instance_ids, vec!["i2".to_string()]);

    let end = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap();
    assert!(end.is_none());
}

#[tokio::test]
async fn test_watch_survives_unchanged_and_failed_polls() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/Discover"))
        .respond_with(ResponseTemplate::new(200).set_body_json(discover_body("rev-1", three_instances())))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    // First poll: nothing changed since rev-1
    Mock::given(method("POST"))
        .and(path("/v1/Discover"))
        .and(body_partial_json(json!({"service": {"revision": "rev-1"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200001,
            "info": "data is no change"
        })))
        .up_to_n_times(1)
        .with_priority(2)
        .mount(&server)
        .await;

    // Second poll: registry hiccup
    Mock::given(method("POST"))
        .and(path("/v1/Discover"))
        .and(body_partial_json(json!({"service": {"revision": "rev-1"}})))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .up_to_n_times(1)
        .with_priority(3)
        .mount(&server)
        .await;

    // Third poll: a new instance shows up
    let mut instances = three_instances();
    if let Some(list) = instances.as_array_mut() {
        list.push(json!({"id": "i4", "host": "10.0.0.4", "port": 8080, "protocol": "http", "weight": 100, "revision": "a"}));
    }
    Mock::given(method("POST"))
        .and(path("/v1/Discover"))
        .and(body_partial_json(json!({"service": {"revision": "rev-1"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(discover_body("rev-2", instances)))
        .with_priority(4)
        .mount(&server)
        .await;

    // Quiet afterwards
    Mock::given(method("POST"))
        .and(path("/v1/Discover"))
        .and(body_partial_json(json!({"service": {"revision": "rev-2"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200001,
            "info": "data is no change"
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut stream = client
        .watch(&RegistryKey::new("Testns", "demo"))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.kind, ChangeKind::Added);
    assert_eq!(event.instance_ids, vec!["i4".to_string()]);

    // Baseline plus the unchanged, failed and changed polls
    let requests = server.received_requests().await.unwrap();
    assert!(requests.len() >= 4);

    // Still open while the registry keeps answering "unchanged"
    let pending = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
    assert!(pending.is_err());
}
