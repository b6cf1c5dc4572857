//! PostgreSQL Settlement Store Adapter
//!
//! Implements the `SettlementStore` port on a `PgPool`. Each unit of work is a
//! database transaction at READ COMMITTED; every read that feeds a write
//! decision takes `SELECT ... FOR UPDATE` row locks, and the transaction sets a
//! local `lock_timeout` so a blocked request fails as a retryable conflict
//! instead of waiting indefinitely.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use infra_db::adapters::PostgresSettlementStore;
//! use domain_settlement::{SettlementConfig, SettlementService};
//!
//! let store = PostgresSettlementStore::new(pool);
//! let service = SettlementService::new(Arc::new(store), SettlementConfig::default());
//! ```

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};

use core_kernel::{
    CollectionItemId, DateRange, DomainPort, FarmerGroupId, FarmerId,
    HealthCheckResult, HealthCheckable, PortError, SettlementId, VendorId,
};
use domain_settlement::{
    Advance, AuditRecord, CollectionItem, Farmer, FarmerGroup, ItemScope, Settlement,
    SettlementItem, SettlementStore, SettlementTx,
};

use crate::error::DatabaseError;
use crate::pool::{create_pool, DatabaseConfig};
use crate::repositories::{collection, settlement};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const ADAPTER_ID: &str = "postgres-settlement-store";

/// PostgreSQL-backed implementation of [`SettlementStore`]
///
/// # Error Handling
///
/// Database errors are translated to `PortError` variants:
/// - serialization failures, deadlocks, lock timeouts and a second ACTIVE
///   settlement for one key -> `PortError::Conflict`
/// - `DatabaseError::NotFound` -> `PortError::NotFound`
/// - check and foreign key violations -> `PortError::Validation`
/// - connection loss and pool exhaustion -> `PortError::Unavailable`
/// - Other errors -> `PortError::Internal`
#[derive(Debug, Clone)]
pub struct PostgresSettlementStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresSettlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Opens a pool for `config` and applies its lock timeout
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::ConnectionFailed` if the pool cannot be created
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let pool = create_pool(config).await?;
        Ok(Self::new(pool).with_lock_timeout(config.lock_timeout))
    }

    /// Sets how long a transaction waits for a row lock before giving up
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl DomainPort for PostgresSettlementStore {}

#[async_trait]
impl HealthCheckable for PostgresSettlementStore {
    /// Checks database connectivity with `SELECT 1`
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult::healthy(ADAPTER_ID, latency_ms),
            Err(e) => HealthCheckResult::unhealthy(ADAPTER_ID, latency_ms, format!("Database error: {e}")),
        }
    }
}

#[async_trait]
impl SettlementStore for PostgresSettlementStore {
    type Tx = PgSettlementTx;

    async fn begin(&self) -> Result<PgSettlementTx, PortError> {
        let mut tx = self.pool.begin().await.map_err(db_to_port_error)?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(db_to_port_error)?;

        Ok(PgSettlementTx { tx })
    }
}

/// An open settlement transaction
///
/// Dropping it without calling `commit` rolls the transaction back.
pub struct PgSettlementTx {
    tx: Transaction<'static, Postgres>,
}

fn db_to_port_error(error: impl Into<DatabaseError>) -> PortError {
    let error: DatabaseError = error.into();
    error.into()
}

#[async_trait]
impl SettlementTx for PgSettlementTx {
    async fn get_farmer(&mut self, vendor_id: VendorId, farmer_id: FarmerId) -> Result<Option<Farmer>, PortError> {
        collection::fetch_farmer(&mut self.tx, vendor_id, farmer_id, false)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(level = "debug", skip(self))]
    async fn lock_farmer(&mut self, vendor_id: VendorId, farmer_id: FarmerId) -> Result<Option<Farmer>, PortError> {
        collection::fetch_farmer(&mut self.tx, vendor_id, farmer_id, true)
            .await
            .map_err(db_to_port_error)
    }

    async fn get_group(&mut self, vendor_id: VendorId, group_id: FarmerGroupId) -> Result<Option<FarmerGroup>, PortError> {
        collection::fetch_group(&mut self.tx, vendor_id, group_id)
            .await
            .map_err(db_to_port_error)
    }

    async fn update_advance_total(
        &mut self,
        vendor_id: VendorId,
        farmer_id: FarmerId,
        advance_total: Decimal,
    ) -> Result<(), PortError> {
        collection::update_advance_total(&mut self.tx, vendor_id, farmer_id, advance_total)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(level = "debug", skip(self))]
    async fn lock_collection_items(
        &mut self,
        vendor_id: VendorId,
        farmer_id: FarmerId,
        period: &DateRange,
        scope: ItemScope,
    ) -> Result<Vec<CollectionItem>, PortError> {
        let linked_to = match scope {
            ItemScope::Unlocked => None,
            ItemScope::UnlockedOrLinkedTo(settlement_id) => Some(*settlement_id.as_uuid()),
        };
        let items = collection::lock_items_in_range(
            &mut self.tx,
            vendor_id,
            farmer_id,
            period.date_from(),
            period.date_to(),
            linked_to,
        )
        .await
        .map_err(db_to_port_error)?;

        debug!(count = items.len(), "Locked collection items");
        Ok(items)
    }

    async fn lock_collection_items_by_id(
        &mut self,
        vendor_id: VendorId,
        ids: &[CollectionItemId],
    ) -> Result<Vec<CollectionItem>, PortError> {
        collection::lock_items_by_id(&mut self.tx, vendor_id, ids)
            .await
            .map_err(db_to_port_error)
    }

    async fn set_items_locked(
        &mut self,
        vendor_id: VendorId,
        ids: &[CollectionItemId],
        locked: bool,
    ) -> Result<(), PortError> {
        collection::set_items_locked(&mut self.tx, vendor_id, ids, locked)
            .await
            .map_err(db_to_port_error)
    }

    async fn get_settlement(
        &mut self,
        vendor_id: VendorId,
        settlement_id: SettlementId,
    ) -> Result<Option<Settlement>, PortError> {
        settlement::fetch_settlement(&mut self.tx, vendor_id, settlement_id, false)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(level = "debug", skip(self))]
    async fn lock_settlement(
        &mut self,
        vendor_id: VendorId,
        settlement_id: SettlementId,
    ) -> Result<Option<Settlement>, PortError> {
        settlement::fetch_settlement(&mut self.tx, vendor_id, settlement_id, true)
            .await
            .map_err(db_to_port_error)
    }

    async fn find_active_settlement(
        &mut self,
        vendor_id: VendorId,
        farmer_id: FarmerId,
        period: &DateRange,
    ) -> Result<Option<Settlement>, PortError> {
        settlement::lock_active_settlement(&mut self.tx, vendor_id, farmer_id, period)
            .await
            .map_err(db_to_port_error)
    }

    async fn list_settlements(
        &mut self,
        vendor_id: VendorId,
        farmer_id: FarmerId,
    ) -> Result<Vec<Settlement>, PortError> {
        settlement::list_settlements(&mut self.tx, vendor_id, farmer_id)
            .await
            .map_err(db_to_port_error)
    }

    async fn settlement_items(&mut self, settlement_id: SettlementId) -> Result<Vec<SettlementItem>, PortError> {
        settlement::list_settlement_items(&mut self.tx, settlement_id)
            .await
            .map_err(db_to_port_error)
    }

    async fn insert_settlement(&mut self, record: &Settlement) -> Result<(), PortError> {
        settlement::insert_settlement(&mut self.tx, record)
            .await
            .map_err(db_to_port_error)
    }

    async fn update_settlement(&mut self, record: &Settlement) -> Result<(), PortError> {
        settlement::update_settlement(&mut self.tx, record)
            .await
            .map_err(db_to_port_error)
    }

    async fn insert_settlement_items(&mut self, items: &[SettlementItem]) -> Result<(), PortError> {
        settlement::insert_settlement_items(&mut self.tx, items)
            .await
            .map_err(db_to_port_error)
    }

    async fn insert_advance(&mut self, advance: &Advance) -> Result<(), PortError> {
        settlement::insert_advance(&mut self.tx, advance)
            .await
            .map_err(db_to_port_error)
    }

    async fn list_advances(&mut self, vendor_id: VendorId, farmer_id: FarmerId) -> Result<Vec<Advance>, PortError> {
        settlement::list_advances(&mut self.tx, vendor_id, farmer_id)
            .await
            .map_err(db_to_port_error)
    }

    async fn insert_audit_records(&mut self, records: &[AuditRecord]) -> Result<(), PortError> {
        settlement::insert_audit_records(&mut self.tx, records)
            .await
            .map_err(db_to_port_error)
    }

    async fn commit(self) -> Result<(), PortError> {
        self.tx.commit().await.map_err(db_to_port_error)
    }

    async fn rollback(self) -> Result<(), PortError> {
        self.tx.rollback().await.map_err(db_to_port_error)
    }
}
