//! Liveness and OpenAPI document.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::warn;
use utoipa::OpenApi;

use libris_core::StoreHealth;

use crate::{ApiDoc, AppState};

/// `200 {"status":"healthy"}` when the store answers, `503 {"status":"degraded"}` otherwise.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.stores.health.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
            })),
        ),
        Err(e) => {
            warn!(subsystem = "api", component = "health", error = %e, "Store ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "degraded",
                    "version": env!("CARGO_PKG_VERSION"),
                })),
            )
        }
    }
}

pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
