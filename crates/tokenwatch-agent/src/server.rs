//! HTTP endpoint serving metrics and per-device status

use crate::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::Ordering;
use tokenwatch_metrics::{encode_text, TEXT_CONTENT_TYPE};
use tokenwatch_state::DeviceStore;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Build the router: `/metrics`, `/health` and `/gpu/metrics?uuid=`
pub fn router(store: DeviceStore) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/gpu/metrics", get(gpu_metrics_handler))
        .with_state(store)
}

/// Serve the router on an already bound listener until the task is dropped
pub async fn serve(listener: TcpListener, store: DeviceStore) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Serving metrics on http://{}/metrics", addr);
    }
    axum::serve(listener, router(store)).await?;
    Ok(())
}

/// Handler for /metrics endpoint
async fn metrics_handler(State(store): State<DeviceStore>) -> Response {
    match encode_text(store.registry()) {
        Ok(text) => {
            (StatusCode::OK, [("content-type", TEXT_CONTENT_TYPE)], text).into_response()
        }
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

/// Handler for /health endpoint
async fn health_handler(State(store): State<DeviceStore>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().timestamp(),
            "gpus_tracked": store.len(),
            "samples_applied": store.stats().samples_applied.load(Ordering::Relaxed),
            "drift_comparisons": store.drift().comparisons(),
            "drift_events": store.drift().events(),
        })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct GpuQuery {
    uuid: Option<String>,
}

async fn gpu_metrics_handler(
    State(store): State<DeviceStore>,
    Query(query): Query<GpuQuery>,
) -> Response {
    let Some(uuid) = query.uuid.filter(|u| !u.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "uuid parameter required").into_response();
    };

    match store.snapshot(&uuid) {
        Some(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        None => (StatusCode::NOT_FOUND, "GPU not found").into_response(),
    }
}
