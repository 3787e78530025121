//! End-to-end tests of the registry HTTP surface, driven through the axum
//! router without binding a socket.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use mesh_registry::{RegistryServer, RegistryServerConfig, RegistryStorage, RegistryStore};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

async fn test_app() -> (Router, Arc<RegistryStorage>) {
    let store = RegistryStore::open_in_memory().await.unwrap();
    let storage = Arc::new(RegistryStorage::new(store));
    storage.initialize().await.unwrap();
    let server = RegistryServer::new(RegistryServerConfig::default(), storage.clone());
    (server.build_app().unwrap(), storage)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn post_json(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

async fn register_hello(app: &Router) -> Value {
    let (status, body) = send(
        app,
        post_json(
            "/agents/register_with_metadata",
            json!({
                "agent_id": "hello",
                "metadata": {
                    "name": "Hello_World",
                    "agent_type": "mesh_agent",
                    "capabilities": [{"name": "greeting", "version": "1.0.0"}],
                },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

#[tokio::test]
async fn register_then_discover() {
    let (app, _storage) = test_app().await;

    let body = register_hello(&app).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["agent_id"], "hello");
    assert!(body["resource_version"].as_str().unwrap().len() >= 13);

    let (status, body) = send(&app, get("/agents?capability=greeting")).await;
    assert_eq!(status, StatusCode::OK);
    let agents = body["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0]["name"], "hello-world");
    assert_eq!(agents[0]["status"], "pending");
}

#[tokio::test]
async fn heartbeat_drives_healthy() {
    let (app, _storage) = test_app().await;
    register_hello(&app).await;

    let (status, body) = send(&app, post_json("/heartbeat", json!({"agent_id": "hello"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (status, body) = send(&app, get("/health/hello")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["time_since_heartbeat"].as_f64().unwrap() < 5.0);
}

#[tokio::test]
async fn heartbeat_for_unknown_agent_is_404() {
    let (app, _storage) = test_app().await;
    let (status, _body) = send(&app, post_json("/heartbeat", json!({"agent_id": "ghost"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn capability_version_constraint_selects_exactly_one() {
    let (app, _storage) = test_app().await;

    for (id, version) in [("a1", "1.0.0"), ("a2", "1.5.2"), ("a3", "2.1.0")] {
        let (status, _) = send(
            &app,
            post_json(
                "/agents/register_with_metadata",
                json!({
                    "agent_id": id,
                    "metadata": {
                        "name": id,
                        "capabilities": [{"name": "x", "version": version}],
                    },
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        send(&app, post_json("/heartbeat", json!({"agent_id": id}))).await;
    }

    let (status, body) = send(&app, get("/capabilities?name=x&version_constraint=%3E%3D2.0.0")).await;
    assert_eq!(status, StatusCode::OK);
    let caps = body["capabilities"].as_array().unwrap();
    assert_eq!(caps.len(), 1);
    assert_eq!(caps[0]["version"], "2.1.0");
    assert_eq!(caps[0]["agent_id"], "a3");
}

#[tokio::test]
async fn fuzzy_capability_discovery_finds_file_agents() {
    let (app, _storage) = test_app().await;

    for (id, cap) in [("reader", "read_file"), ("writer", "write_file"), ("exec", "execute_command")] {
        send(
            &app,
            post_json(
                "/agents/register_with_metadata",
                json!({
                    "agent_id": id,
                    "metadata": {"name": id, "capabilities": [{"name": cap}]},
                }),
            ),
        )
        .await;
    }

    let (status, body) = send(&app, get("/agents?capability=file&fuzzy_match=true")).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["agents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["reader", "writer"]);
}

#[tokio::test]
async fn label_selector_filters_and_validates() {
    let (app, _storage) = test_app().await;
    send(
        &app,
        post_json(
            "/agents/register_with_metadata",
            json!({
                "agent_id": "tagged",
                "metadata": {"name": "tagged", "tags": {"env": "prod"}},
            }),
        ),
    )
    .await;

    let (status, body) = send(&app, get("/agents?label_selector=env%3Dprod")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, body) = send(&app, get("/agents?label_selector=env%3Dstaging")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    let (status, _body) = send(&app, get("/agents?label_selector=bogus")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn high_security_registration_requires_audit_capabilities() {
    let (app, _storage) = test_app().await;
    let (status, body) = send(
        &app,
        post_json(
            "/agents/register_with_metadata",
            json!({
                "agent_id": "secure",
                "metadata": {
                    "name": "secure",
                    "security_context": "high_security",
                    "capabilities": [{"name": "authentication"}],
                },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "SECURITY_VALIDATION");
}

#[tokio::test]
async fn capabilities_for_missing_agent_is_404() {
    let (app, _storage) = test_app().await;
    let (status, _body) = send(&app, get("/capabilities?agent_id=ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn identical_reads_within_ttl_are_byte_identical() {
    let (app, _storage) = test_app().await;
    register_hello(&app).await;

    let first = app.clone().oneshot(get("/agents?capability=greeting")).await.unwrap();
    let first = first.into_body().collect().await.unwrap().to_bytes();
    let second = app.clone().oneshot(get("/agents?capability=greeting")).await.unwrap();
    let second = second.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(first, second);

    // A mutation invalidates the whole cache; the next read is fresh.
    send(&app, post_json("/heartbeat", json!({"agent_id": "hello"}))).await;
    let third = app.clone().oneshot(get("/agents?capability=greeting")).await.unwrap();
    let third = third.into_body().collect().await.unwrap().to_bytes();
    assert_ne!(first, third);
}

#[tokio::test]
async fn reregistration_bumps_resource_version() {
    let (app, _storage) = test_app().await;
    let first = register_hello(&app).await;
    let second = register_hello(&app).await;
    assert!(
        second["resource_version"].as_str().unwrap() > first["resource_version"].as_str().unwrap()
    );

    let (_, body) = send(&app, get("/agents")).await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn metrics_and_prometheus_endpoints_respond() {
    let (app, _storage) = test_app().await;
    register_hello(&app).await;

    let (status, body) = send(&app, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_agents"], 1);

    let response = app.clone().oneshot(get("/metrics/prometheus")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(text.to_vec()).unwrap();
    assert!(text.contains("mcp_registry_agents_total 1"));
}

#[tokio::test]
async fn service_health_reports_healthy() {
    let (app, _storage) = test_app().await;
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "mcp-mesh-registry");
}

#[tokio::test]
async fn mcp_rpc_mirrors_http_operations() {
    let (app, _storage) = test_app().await;

    let (status, body) = send(
        &app,
        post_json(
            "/mcp",
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "register_agent",
                "params": {
                    "agent_id": "hello",
                    "metadata": {
                        "name": "Hello_World",
                        "capabilities": [{"name": "greeting"}],
                    },
                },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["status"], "success");

    let (_, body) = send(
        &app,
        post_json(
            "/mcp",
            json!({"jsonrpc": "2.0", "id": 2, "method": "heartbeat", "params": {"agent_id": "hello"}}),
        ),
    )
    .await;
    assert_eq!(body["result"]["status"], "success");

    let (_, body) = send(
        &app,
        post_json(
            "/mcp",
            json!({"jsonrpc": "2.0", "id": 3, "method": "discover_services", "params": {"capabilities": ["greeting"]}}),
        ),
    )
    .await;
    assert_eq!(body["result"]["count"], 1);

    let (_, body) = send(
        &app,
        post_json(
            "/mcp",
            json!({"jsonrpc": "2.0", "id": 4, "method": "heartbeat", "params": {"agent_id": "ghost"}}),
        ),
    )
    .await;
    assert_eq!(body["error"]["code"], -32001);
}
