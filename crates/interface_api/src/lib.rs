//! HTTP API Layer
//!
//! A thin Axum surface over [`SettlementService`]. Handlers parse the request,
//! take the tenant from gateway headers and delegate; all settlement rules
//! live in the domain.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use interface_api::create_router;
//!
//! let app = create_router(Arc::new(service));
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod context;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    http::HeaderName,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use domain_settlement::{SettlementService, SettlementStore};

use crate::context::REQUEST_ID_HEADER;
use crate::handlers::{advance, health, settlement};
use crate::middleware::request_logging;

/// Application state shared across handlers
pub struct AppState<S: SettlementStore> {
    pub service: Arc<SettlementService<S>>,
}

impl<S: SettlementStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

/// Creates the main API router
pub fn create_router<S: SettlementStore>(service: Arc<SettlementService<S>>) -> Router {
    let state = AppState { service };
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    // Public routes (no tenant required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check::<S>));

    let settlement_routes = Router::new()
        .route("/generate", post(settlement::generate::<S>))
        .route("/recalculate", post(settlement::recalculate::<S>))
        .route("/:id", get(settlement::get_settlement::<S>))
        .route("/:id/void", post(settlement::void::<S>));

    let farmer_routes = Router::new()
        .route("/:id/settlements", get(settlement::list_for_farmer::<S>))
        .route(
            "/:id/advances",
            get(advance::advance_summary::<S>).post(advance::record_advance::<S>),
        )
        .route("/:id/advances/reconcile", get(advance::reconcile::<S>));

    let api_routes = Router::new()
        .nest("/settlements", settlement_routes)
        .nest("/farmers", farmer_routes)
        .layer(axum_middleware::from_fn(request_logging));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
