//! Ports and Adapters Infrastructure
//!
//! Shared vocabulary between the settlement domain and its adapters: the
//! error every port method returns and the health-check contract the server
//! uses for readiness.
//!
//! ```text
//!   SettlementService ──► SettlementStore / SettlementTx (domain ports)
//!                              ▲                 ▲
//!                    PostgresSettlementStore   MemorySettlementStore
//!                         (infra_db)             (feature "mock")
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned by port operations
///
/// Adapters translate their native failures into these variants so the
/// domain decides what to retry without knowing about SQL.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The store rejected the data (check or foreign-key constraint)
    #[error("Rejected by store: {0}")]
    Validation(String),

    /// Lost a race with a concurrent writer: lock timeout, serialization
    /// failure, deadlock or a unique-key collision on a racing insert
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The store could not be reached or has no capacity left
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store failure: {0}")]
    Internal(String),
}

impl PortError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        PortError::Unavailable(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal(message.into())
    }

    /// The whole unit of work may be retried from scratch
    pub fn is_conflict(&self) -> bool {
        matches!(self, PortError::Conflict(_))
    }

    /// A later attempt may succeed without any change by the caller
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Conflict(_) | PortError::Unavailable(_))
    }
}

/// Marker trait for all domain ports
///
/// Ports are shared across request handlers, so they must be thread-safe.
pub trait DomainPort: Send + Sync + 'static {}

/// Health status for an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    Unhealthy,
}

/// Health check result for an adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    /// Round trip of the probe in milliseconds
    pub latency_ms: u64,
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn healthy(adapter_id: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status: AdapterHealth::Healthy,
            latency_ms,
            message: None,
            checked_at: Utc::now(),
        }
    }

    pub fn unhealthy(adapter_id: impl Into<String>, latency_ms: u64, message: impl Into<String>) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status: AdapterHealth::Unhealthy,
            latency_ms,
            message: Some(message.into()),
            checked_at: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == AdapterHealth::Healthy
    }
}

/// Trait for adapters that support health checks
#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}
