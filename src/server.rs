//! HTTP host for the extractor.
//!
//! `POST /` takes a trigger payload (raw object JSON or a Pub/Sub push
//! envelope) and runs one invocation. Any handler error maps to a 500 so the
//! delivering platform applies its own retry policy.

use crate::event::TriggerPayload;
use crate::extractor::{Extractor, Outcome};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info_span, warn, Instrument};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<Extractor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(handle_event))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Decode the trigger payload and run the extractor on it.
async fn handle_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Outcome>, (StatusCode, String)> {
    let payload: TriggerPayload = serde_json::from_slice(&body).map_err(|e| {
        warn!("Rejected trigger payload: {}", e);
        (StatusCode::BAD_REQUEST, format!("Invalid event payload: {}", e))
    })?;
    let (event, delivery_id) = payload.into_event().map_err(|e| {
        warn!("Rejected trigger payload: {:#}", e);
        (StatusCode::BAD_REQUEST, format!("Invalid event payload: {:#}", e))
    })?;

    let invocation_id = headers
        .get("ce-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(delivery_id)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let span = info_span!(
        "invocation",
        id = %invocation_id,
        bucket = %event.bucket,
        name = %event.name
    );

    state
        .extractor
        .handle(&event)
        .instrument(span)
        .await
        .map(Json)
        .map_err(|e| {
            if e.is_ocr_failure() {
                error!("Invocation {} failed during OCR: {}", invocation_id, e);
            } else {
                error!("Invocation {} failed: {}", invocation_id, e);
            }
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
}
