//! Pipeline integration: run the runtime against a mock registry and check
//! the registration payload and heartbeat cadence.

use axum::{Json, Router, extract::State, routing::post};
use mesh_runtime::{AgentDescriptor, CapabilityDescriptor, MeshEnv, MeshRuntime};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Recorded {
    registrations: Vec<Value>,
    heartbeats: Vec<Value>,
}

async fn mock_registry() -> (String, Arc<Mutex<Recorded>>) {
    let recorded = Arc::new(Mutex::new(Recorded::default()));

    async fn register(
        State(recorded): State<Arc<Mutex<Recorded>>>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        recorded.lock().registrations.push(body.clone());
        Json(json!({
            "status": "success",
            "agent_id": body["agent_id"],
            "resource_version": "00000000001722470400000",
        }))
    }

    async fn heartbeat(
        State(recorded): State<Arc<Mutex<Recorded>>>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        recorded.lock().heartbeats.push(body);
        Json(json!({ "status": "success" }))
    }

    let app = Router::new()
        .route("/agents/register_with_metadata", post(register))
        .route("/heartbeat", post(heartbeat))
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), recorded)
}

#[tokio::test]
async fn runtime_registers_and_heartbeats() {
    let (url, recorded) = mock_registry().await;

    let env = MeshEnv { registry_url: url, ..Default::default() };
    let agent = AgentDescriptor::builder("hello_world")
        .health_interval(1)
        .depends_on("date_service")
        .build();
    let runtime = MeshRuntime::with_env(agent, env).unwrap();
    runtime.register(
        CapabilityDescriptor::builder("greeting")
            .version("1.0.0")
            .description("Say hello")
            .build(),
        Arc::new(Greeter),
    );

    runtime
        .serve_with_shutdown(tokio::time::sleep(Duration::from_millis(2600)))
        .await;

    let recorded = recorded.lock();
    assert_eq!(recorded.registrations.len(), 1);
    let registration = &recorded.registrations[0];
    assert_eq!(registration["agent_id"], "hello_world");
    assert_eq!(registration["metadata"]["health_interval"], 1);
    assert_eq!(registration["metadata"]["dependencies"], json!(["date_service"]));
    assert_eq!(registration["metadata"]["capabilities"][0]["name"], "greeting");
    assert_eq!(
        registration["metadata"]["capabilities"][0]["metadata"]["function_name"],
        "greeting"
    );

    // settle 0.5s + ~2.1s of 1 Hz ticks: at least two heartbeats.
    assert!(recorded.heartbeats.len() >= 2, "got {}", recorded.heartbeats.len());
    assert_eq!(recorded.heartbeats[0]["agent_id"], "hello_world");
}

#[tokio::test]
async fn registration_failure_is_non_fatal() {
    // Nothing listens here; the runtime must still run and exit cleanly.
    let env = MeshEnv {
        registry_url: "http://127.0.0.1:1".to_string(),
        ..Default::default()
    };
    let agent = AgentDescriptor::builder("loner").health_interval(1).build();
    let runtime = MeshRuntime::with_env(agent, env).unwrap();

    runtime
        .serve_with_shutdown(tokio::time::sleep(Duration::from_millis(700)))
        .await;
}

struct Greeter;

#[async_trait::async_trait]
impl mesh_runtime::CapabilityHandler for Greeter {
    async fn invoke(&self, _params: Value) -> mesh_kernel::MeshResult<Value> {
        Ok(json!("hello, world"))
    }
}
