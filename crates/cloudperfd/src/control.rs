//! Control API.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/events/object-created` | Object-store notification envelope |
//! | GET | `/outputs` | Deployment outputs |
//! | GET | `/ingestions` | Ingestion cycles in arrival order |
//! | GET | `/health` | Last known target health |
//! | GET | `/healthz` | Liveness |
//!
//! Notifications are acknowledged with 202 and handled in the background.
//! `?wait=true` handles them inline and returns the recorded cycles.

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use cloudperf_core::DeploymentOutputs;
use cloudperf_ingest::{IngestError, IngestionPipeline, NotificationEnvelope};
use cloudperf_router::HealthBoard;
use cloudperf_state::StateStore;

#[derive(Clone)]
pub struct ControlState {
    pub pipeline: IngestionPipeline,
    pub outputs: DeploymentOutputs,
    pub state: StateStore,
    pub health: HealthBoard,
}

pub fn build_router(state: ControlState) -> Router {
    Router::new()
        .route("/events/object-created", post(object_created))
        .route("/outputs", get(outputs))
        .route("/ingestions", get(list_ingestions))
        .route("/health", get(target_health))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Ledger failures are ours; everything else is a bad notification.
fn ingest_status(err: &IngestError) -> StatusCode {
    match err {
        IngestError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NotifyParams {
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize)]
struct Accepted {
    events: usize,
    invocations: usize,
}

/// POST /events/object-created
async fn object_created(
    State(state): State<ControlState>,
    Query(params): Query<NotifyParams>,
    body: Bytes,
) -> impl IntoResponse {
    let envelope = match NotificationEnvelope::parse(&body) {
        Ok(envelope) => envelope,
        Err(e) => return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response(),
    };

    if params.wait {
        return match state.pipeline.handle_envelope(envelope).await {
            Ok(records) => ApiResponse::ok(records).into_response(),
            Err(e) => error_response(&e.to_string(), ingest_status(&e)).into_response(),
        };
    }

    let events = match envelope.clone().into_events() {
        Ok(events) => events,
        Err(e) => return error_response(&e.to_string(), ingest_status(&e)).into_response(),
    };
    let invocations = events
        .iter()
        .map(|e| state.pipeline.on_object_write(e).len())
        .sum();
    info!(events = events.len(), invocations, "notification accepted");

    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        if let Err(e) = pipeline.handle_envelope(envelope).await {
            warn!(error = %e, "notification handling failed");
        }
    });

    (
        StatusCode::ACCEPTED,
        ApiResponse::ok(Accepted {
            events: events.len(),
            invocations,
        }),
    )
        .into_response()
}

/// GET /outputs
async fn outputs(State(state): State<ControlState>) -> impl IntoResponse {
    ApiResponse::ok(state.outputs.clone())
}

/// GET /ingestions
async fn list_ingestions(State(state): State<ControlState>) -> impl IntoResponse {
    match state.state.list_ingestions() {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /health
async fn target_health(State(state): State<ControlState>) -> impl IntoResponse {
    ApiResponse::ok(state.health.snapshot())
}
