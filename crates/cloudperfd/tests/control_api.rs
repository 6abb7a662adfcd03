//! Control API tests.
//!
//! Drives the router with `oneshot` against an in-memory state store and a
//! recording admin invoker.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use cloudperf_core::{InvocationPayload, StackConfig};
use cloudperf_ingest::{AdminInvoker, InvocationOutcome, InvokeFuture};
use cloudperf_router::{HealthBoard, TargetHealth};
use cloudperf_scope::Target;
use cloudperf_stack::Stack;
use cloudperf_state::{IngestionStatus, StateStore};
use cloudperfd::{ControlState, build_router};

#[derive(Default)]
struct RecordingInvoker {
    calls: Mutex<Vec<InvocationPayload>>,
}

impl AdminInvoker for RecordingInvoker {
    fn invoke<'a>(&'a self, _target: &'a Target, payload: &'a InvocationPayload) -> InvokeFuture<'a> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(payload.clone());
            Ok(InvocationOutcome::new(json!({"status": 200, "msg": "ok"})))
        })
    }
}

struct Harness {
    router: axum::Router,
    state: StateStore,
    invoker: Arc<RecordingInvoker>,
}

fn harness() -> Harness {
    let state = StateStore::open_in_memory().unwrap();
    let stack = Stack::build(StackConfig::reference(), state.clone()).unwrap();
    let invoker = Arc::new(RecordingInvoker::default());
    let health = HealthBoard::new();
    health.set("api", TargetHealth::Healthy);

    let router = build_router(ControlState {
        pipeline: stack.pipeline(invoker.clone()),
        outputs: stack.outputs(),
        state: state.clone(),
        health,
    });
    Harness {
        router,
        state,
        invoker,
    }
}

fn envelope(keys: &[&str]) -> Vec<u8> {
    let records: Vec<Value> = keys
        .iter()
        .map(|key| {
            json!({
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": {"name": "cloudperf-data"},
                    "object": {"key": key, "size": 42, "eTag": format!("etag-{key}")}
                }
            })
        })
        .collect();
    serde_json::to_vec(&json!({ "Records": records })).unwrap()
}

fn notify(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_is_ok() {
    let h = harness();
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = h.router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn outputs_are_published() {
    let h = harness();
    let req = Request::builder().uri("/outputs").body(Body::empty()).unwrap();
    let resp = h.router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["object_store"], "cloudperf-data");
    assert_eq!(body["data"]["admin_target"], "admin");
}

#[tokio::test]
async fn waited_notification_returns_applied_cycles() {
    let h = harness();
    let resp = h
        .router
        .clone()
        .oneshot(notify(
            "/events/object-created?wait=true",
            envelope(&["import-sql/schema.sql", "images/cat.png"]),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    let records = body["data"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["key"], "import-sql/schema.sql");
    assert_eq!(records[0]["status"]["state"], "applied");

    let calls = h.invoker.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].action, "exec_sqlfile");
    assert_eq!(calls[0].param, "s3://cloudperf-data/import-sql/schema.sql");

    let req = Request::builder().uri("/ingestions").body(Body::empty()).unwrap();
    let listed = json_body(h.router.oneshot(req).await.unwrap()).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn notification_is_accepted_and_handled_in_background() {
    let h = harness();
    let resp = h
        .router
        .oneshot(notify(
            "/events/object-created",
            envelope(&["import-sql/a.sql", "import-sql/b.zip", "notes.txt"]),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let body = json_body(resp).await;
    assert_eq!(body["data"]["events"], 3);
    assert_eq!(body["data"]["invocations"], 2);

    let mut applied = 0;
    for _ in 0..100 {
        applied = h
            .state
            .list_ingestions()
            .unwrap()
            .iter()
            .filter(|r| r.status == IngestionStatus::Applied)
            .count();
        if applied == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(applied, 2);
}

#[tokio::test]
async fn malformed_notification_is_rejected() {
    let h = harness();
    let resp = h
        .router
        .oneshot(notify("/events/object-created", b"not json".to_vec()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body = json_body(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("malformed"));
    assert!(h.invoker.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn health_snapshot_lists_known_targets() {
    let h = harness();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let body = json_body(h.router.oneshot(req).await.unwrap()).await;
    assert_eq!(body["data"]["api"], "healthy");
}
