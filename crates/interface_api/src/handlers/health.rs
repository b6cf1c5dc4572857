//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use domain_settlement::SettlementStore;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness check
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check (includes the settlement store)
pub async fn readiness_check<S: SettlementStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let result = state.service.health().await;
    if !result.is_healthy() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(HealthResponse {
        status: "ready".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
