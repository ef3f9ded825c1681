use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    status: String,
    backend: String,
    /// False means every ask is answered by the offline fallback
    remote_configured: bool,
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let service = &state.ask_service;
    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready".to_string(),
            backend: service.backend().to_string(),
            remote_configured: service.remote_configured(),
        }),
    )
}
