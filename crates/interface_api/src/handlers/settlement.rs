//! Settlement handlers

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use core_kernel::{FarmerId, SettlementId};
use domain_settlement::{SettlementDetail, SettlementReceipt, SettlementStore, SettlementSummary};

use crate::context::Tenant;
use crate::dto::settlement::{SettlementPeriodRequest, VoidSettlementRequest};
use crate::error::ApiError;
use crate::AppState;

/// Settles a farmer's unlocked collections for a period
pub async fn generate<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Tenant(ctx): Tenant,
    Json(body): Json<SettlementPeriodRequest>,
) -> Result<Json<SettlementReceipt>, ApiError> {
    let request = body.into_request(Utc::now().date_naive(), state.service.config().default_range_days)?;
    let receipt = state.service.generate(&ctx, request).await?;
    Ok(Json(receipt))
}

/// Recomputes the ACTIVE settlement for a period, creating it if absent
pub async fn recalculate<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Tenant(ctx): Tenant,
    Json(body): Json<SettlementPeriodRequest>,
) -> Result<Json<SettlementReceipt>, ApiError> {
    let request = body.into_request(Utc::now().date_naive(), state.service.config().default_range_days)?;
    let receipt = state.service.recalculate(&ctx, request).await?;
    Ok(Json(receipt))
}

/// Voids a settlement, releasing its items and restoring its deduction
pub async fn void<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Tenant(ctx): Tenant,
    Path(id): Path<Uuid>,
    Json(body): Json<VoidSettlementRequest>,
) -> Result<Json<SettlementSummary>, ApiError> {
    body.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let summary = state
        .service
        .void(&ctx, SettlementId::from_uuid(id), &body.reason)
        .await?;
    Ok(Json(summary))
}

/// Gets a settlement with its linked items
pub async fn get_settlement<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Tenant(ctx): Tenant,
    Path(id): Path<Uuid>,
) -> Result<Json<SettlementDetail>, ApiError> {
    let detail = state.service.get_settlement(&ctx, SettlementId::from_uuid(id)).await?;
    Ok(Json(detail))
}

/// Lists a farmer's settlements, newest first
pub async fn list_for_farmer<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Tenant(ctx): Tenant,
    Path(farmer_id): Path<Uuid>,
) -> Result<Json<Vec<SettlementSummary>>, ApiError> {
    let settlements = state
        .service
        .list_settlements(&ctx, FarmerId::from_uuid(farmer_id))
        .await?;
    Ok(Json(settlements))
}
