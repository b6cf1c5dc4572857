//! Advance handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use core_kernel::FarmerId;
use domain_settlement::{Advance, AdvanceReconciliation, AdvanceSummary, SettlementStore};

use crate::context::Tenant;
use crate::dto::advance::RecordAdvanceRequest;
use crate::error::ApiError;
use crate::AppState;

/// Gives an advance or records a manual recovery
pub async fn record_advance<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Tenant(ctx): Tenant,
    Path(farmer_id): Path<Uuid>,
    Json(body): Json<RecordAdvanceRequest>,
) -> Result<(StatusCode, Json<Advance>), ApiError> {
    body.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let entry = state
        .service
        .record_advance(&ctx, FarmerId::from_uuid(farmer_id), body.kind, body.amount, body.note)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Ledger view of a farmer's advances
pub async fn advance_summary<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Tenant(ctx): Tenant,
    Path(farmer_id): Path<Uuid>,
) -> Result<Json<AdvanceSummary>, ApiError> {
    let summary = state
        .service
        .advance_summary(&ctx, FarmerId::from_uuid(farmer_id))
        .await?;
    Ok(Json(summary))
}

/// Compares the cached balance with the ledger
pub async fn reconcile<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Tenant(ctx): Tenant,
    Path(farmer_id): Path<Uuid>,
) -> Result<Json<AdvanceReconciliation>, ApiError> {
    let reconciliation = state
        .service
        .reconcile_advances(&ctx, FarmerId::from_uuid(farmer_id))
        .await?;
    Ok(Json(reconciliation))
}
