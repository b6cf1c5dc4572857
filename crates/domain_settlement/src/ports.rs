//! Settlement Store Ports
//!
//! Every settlement operation is one unit of work against a relational store.
//! The service opens a [`SettlementTx`] with [`SettlementStore::begin`], takes
//! all reads that feed a write decision through it (with row locks where the
//! method says so), writes, flushes its audit records and commits. Dropping a
//! transaction without committing rolls it back.
//!
//! # Lock order
//!
//! Callers lock the farmer row before any settlement or collection rows of
//! that farmer. Adapters map lock timeouts, deadlocks and serialization
//! failures onto [`PortError::Conflict`], which the service retries.

use async_trait::async_trait;
use rust_decimal::Decimal;

use core_kernel::{
    CollectionItemId, DateRange, DomainPort, FarmerGroupId, FarmerId, HealthCheckable, PortError,
    SettlementId, VendorId,
};

use crate::advance::Advance;
use crate::audit::AuditRecord;
use crate::collection::CollectionItem;
use crate::farmer::{Farmer, FarmerGroup};
use crate::settlement::{Settlement, SettlementItem};

/// Which collection items a settlement computation may consume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemScope {
    /// Only items not locked by any settlement
    Unlocked,
    /// Unlocked items plus items already linked to the given settlement
    UnlockedOrLinkedTo(SettlementId),
}

/// Port for the relational store behind the settlement engine
#[async_trait]
pub trait SettlementStore: DomainPort + HealthCheckable {
    type Tx: SettlementTx;

    /// Starts a unit of work
    async fn begin(&self) -> Result<Self::Tx, PortError>;
}

/// One open unit of work
///
/// All methods are tenant-scoped: rows of another vendor are invisible.
#[async_trait]
pub trait SettlementTx: Send {
    // Farmers

    async fn get_farmer(&mut self, vendor_id: VendorId, farmer_id: FarmerId) -> Result<Option<Farmer>, PortError>;

    /// Reads the farmer row and holds a write lock on it until commit
    async fn lock_farmer(&mut self, vendor_id: VendorId, farmer_id: FarmerId) -> Result<Option<Farmer>, PortError>;

    async fn get_group(&mut self, vendor_id: VendorId, group_id: FarmerGroupId) -> Result<Option<FarmerGroup>, PortError>;

    async fn update_advance_total(
        &mut self,
        vendor_id: VendorId,
        farmer_id: FarmerId,
        advance_total: Decimal,
    ) -> Result<(), PortError>;

    // Collection ledger

    /// Locks the farmer's items dated within `period` that match `scope`,
    /// ordered by date
    async fn lock_collection_items(
        &mut self,
        vendor_id: VendorId,
        farmer_id: FarmerId,
        period: &DateRange,
        scope: ItemScope,
    ) -> Result<Vec<CollectionItem>, PortError>;

    /// Locks the given items regardless of their lock flag
    async fn lock_collection_items_by_id(
        &mut self,
        vendor_id: VendorId,
        ids: &[CollectionItemId],
    ) -> Result<Vec<CollectionItem>, PortError>;

    async fn set_items_locked(
        &mut self,
        vendor_id: VendorId,
        ids: &[CollectionItemId],
        locked: bool,
    ) -> Result<(), PortError>;

    // Settlements

    async fn get_settlement(
        &mut self,
        vendor_id: VendorId,
        settlement_id: SettlementId,
    ) -> Result<Option<Settlement>, PortError>;

    /// Reads the settlement row and holds a write lock on it until commit
    async fn lock_settlement(
        &mut self,
        vendor_id: VendorId,
        settlement_id: SettlementId,
    ) -> Result<Option<Settlement>, PortError>;

    /// Locks the ACTIVE settlement for the exact `(farmer, period)` key, if any
    async fn find_active_settlement(
        &mut self,
        vendor_id: VendorId,
        farmer_id: FarmerId,
        period: &DateRange,
    ) -> Result<Option<Settlement>, PortError>;

    async fn list_settlements(
        &mut self,
        vendor_id: VendorId,
        farmer_id: FarmerId,
    ) -> Result<Vec<Settlement>, PortError>;

    async fn settlement_items(&mut self, settlement_id: SettlementId) -> Result<Vec<SettlementItem>, PortError>;

    /// Fails with `Conflict` if an ACTIVE settlement already holds the key
    async fn insert_settlement(&mut self, settlement: &Settlement) -> Result<(), PortError>;

    async fn update_settlement(&mut self, settlement: &Settlement) -> Result<(), PortError>;

    async fn insert_settlement_items(&mut self, items: &[SettlementItem]) -> Result<(), PortError>;

    // Advance ledger

    async fn insert_advance(&mut self, advance: &Advance) -> Result<(), PortError>;

    async fn list_advances(&mut self, vendor_id: VendorId, farmer_id: FarmerId) -> Result<Vec<Advance>, PortError>;

    // Audit

    async fn insert_audit_records(&mut self, records: &[AuditRecord]) -> Result<(), PortError>;

    async fn commit(self) -> Result<(), PortError>;

    async fn rollback(self) -> Result<(), PortError>;
}

/// In-memory store for tests and local runs
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::{Mutex, OwnedMutexGuard};

    use core_kernel::HealthCheckResult;

    #[derive(Debug, Clone, Default)]
    struct MemoryState {
        farmers: HashMap<FarmerId, Farmer>,
        groups: HashMap<FarmerGroupId, FarmerGroup>,
        items: Vec<CollectionItem>,
        settlements: Vec<Settlement>,
        settlement_items: Vec<SettlementItem>,
        advances: Vec<Advance>,
        audit: Vec<AuditRecord>,
    }

    /// In-memory implementation of [`SettlementStore`]
    ///
    /// Transactions are serialized through an owned async mutex and work on a
    /// copy of the state that replaces the shared state on commit.
    #[derive(Debug, Clone, Default)]
    pub struct MemorySettlementStore {
        state: Arc<Mutex<MemoryState>>,
        fail_audit_writes: Arc<AtomicBool>,
        conflicts_remaining: Arc<AtomicU32>,
    }

    impl MemorySettlementStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn insert_farmer(&self, farmer: Farmer) {
            self.state.lock().await.farmers.insert(farmer.id, farmer);
        }

        pub async fn insert_group(&self, group: FarmerGroup) {
            self.state.lock().await.groups.insert(group.id, group);
        }

        pub async fn insert_collection_item(&self, item: CollectionItem) {
            self.state.lock().await.items.push(item);
        }

        pub async fn farmer(&self, id: FarmerId) -> Option<Farmer> {
            self.state.lock().await.farmers.get(&id).cloned()
        }

        pub async fn collection_item(&self, id: CollectionItemId) -> Option<CollectionItem> {
            self.state.lock().await.items.iter().find(|i| i.id == id).cloned()
        }

        pub async fn settlements(&self) -> Vec<Settlement> {
            self.state.lock().await.settlements.clone()
        }

        pub async fn settlement_items_of(&self, id: SettlementId) -> Vec<SettlementItem> {
            self.state
                .lock()
                .await
                .settlement_items
                .iter()
                .filter(|i| i.settlement_id == id)
                .cloned()
                .collect()
        }

        pub async fn advances_of(&self, farmer_id: FarmerId) -> Vec<Advance> {
            self.state
                .lock()
                .await
                .advances
                .iter()
                .filter(|a| a.farmer_id == farmer_id)
                .cloned()
                .collect()
        }

        pub async fn audit_records(&self) -> Vec<AuditRecord> {
            self.state.lock().await.audit.clone()
        }

        /// Makes every audit write fail until reset
        pub fn fail_audit_writes(&self, fail: bool) {
            self.fail_audit_writes.store(fail, Ordering::SeqCst);
        }

        /// Makes the next `count` commits fail with a conflict
        pub fn inject_conflicts(&self, count: u32) {
            self.conflicts_remaining.store(count, Ordering::SeqCst);
        }
    }

    impl DomainPort for MemorySettlementStore {}

    #[async_trait]
    impl HealthCheckable for MemorySettlementStore {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult::healthy("memory-settlement-store", 0)
        }
    }

    #[async_trait]
    impl SettlementStore for MemorySettlementStore {
        type Tx = MemoryTx;

        async fn begin(&self) -> Result<MemoryTx, PortError> {
            let guard = self.state.clone().lock_owned().await;
            let working = guard.clone();
            Ok(MemoryTx {
                guard,
                working,
                fail_audit_writes: self.fail_audit_writes.load(Ordering::SeqCst),
                conflicts_remaining: self.conflicts_remaining.clone(),
            })
        }
    }

    /// Transaction over [`MemorySettlementStore`]
    pub struct MemoryTx {
        guard: OwnedMutexGuard<MemoryState>,
        working: MemoryState,
        fail_audit_writes: bool,
        conflicts_remaining: Arc<AtomicU32>,
    }

    impl MemoryTx {
        fn item_mut(&mut self, vendor_id: VendorId, id: CollectionItemId) -> Result<&mut CollectionItem, PortError> {
            self.working
                .items
                .iter_mut()
                .find(|i| i.id == id && i.vendor_id == vendor_id)
                .ok_or_else(|| PortError::not_found("CollectionItem", id))
        }

        fn settlement(&self, vendor_id: VendorId, id: SettlementId) -> Option<Settlement> {
            self.working
                .settlements
                .iter()
                .find(|s| s.id == id && s.vendor_id == vendor_id)
                .cloned()
        }
    }

    #[async_trait]
    impl SettlementTx for MemoryTx {
        async fn get_farmer(&mut self, vendor_id: VendorId, farmer_id: FarmerId) -> Result<Option<Farmer>, PortError> {
            Ok(self
                .working
                .farmers
                .get(&farmer_id)
                .filter(|f| f.vendor_id == vendor_id)
                .cloned())
        }

        async fn lock_farmer(&mut self, vendor_id: VendorId, farmer_id: FarmerId) -> Result<Option<Farmer>, PortError> {
            self.get_farmer(vendor_id, farmer_id).await
        }

        async fn get_group(&mut self, vendor_id: VendorId, group_id: FarmerGroupId) -> Result<Option<FarmerGroup>, PortError> {
            Ok(self
                .working
                .groups
                .get(&group_id)
                .filter(|g| g.vendor_id == vendor_id)
                .cloned())
        }

        async fn update_advance_total(
            &mut self,
            vendor_id: VendorId,
            farmer_id: FarmerId,
            advance_total: Decimal,
        ) -> Result<(), PortError> {
            let farmer = self
                .working
                .farmers
                .get_mut(&farmer_id)
                .filter(|f| f.vendor_id == vendor_id)
                .ok_or_else(|| PortError::not_found("Farmer", farmer_id))?;
            farmer.advance_total = advance_total;
            Ok(())
        }

        async fn lock_collection_items(
            &mut self,
            vendor_id: VendorId,
            farmer_id: FarmerId,
            period: &DateRange,
            scope: ItemScope,
        ) -> Result<Vec<CollectionItem>, PortError> {
            let linked: Vec<CollectionItemId> = match scope {
                ItemScope::Unlocked => Vec::new(),
                ItemScope::UnlockedOrLinkedTo(settlement_id) => self
                    .working
                    .settlement_items
                    .iter()
                    .filter(|l| l.settlement_id == settlement_id)
                    .map(|l| l.collection_item_id)
                    .collect(),
            };

            let mut items: Vec<CollectionItem> = self
                .working
                .items
                .iter()
                .filter(|i| i.vendor_id == vendor_id && i.farmer_id == farmer_id)
                .filter(|i| period.contains(i.date))
                .filter(|i| !i.is_locked || linked.contains(&i.id))
                .cloned()
                .collect();
            items.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
            Ok(items)
        }

        async fn lock_collection_items_by_id(
            &mut self,
            vendor_id: VendorId,
            ids: &[CollectionItemId],
        ) -> Result<Vec<CollectionItem>, PortError> {
            Ok(self
                .working
                .items
                .iter()
                .filter(|i| i.vendor_id == vendor_id && ids.contains(&i.id))
                .cloned()
                .collect())
        }

        async fn set_items_locked(
            &mut self,
            vendor_id: VendorId,
            ids: &[CollectionItemId],
            locked: bool,
        ) -> Result<(), PortError> {
            for id in ids {
                self.item_mut(vendor_id, *id)?.is_locked = locked;
            }
            Ok(())
        }

        async fn get_settlement(
            &mut self,
            vendor_id: VendorId,
            settlement_id: SettlementId,
        ) -> Result<Option<Settlement>, PortError> {
            Ok(self.settlement(vendor_id, settlement_id))
        }

        async fn lock_settlement(
            &mut self,
            vendor_id: VendorId,
            settlement_id: SettlementId,
        ) -> Result<Option<Settlement>, PortError> {
            Ok(self.settlement(vendor_id, settlement_id))
        }

        async fn find_active_settlement(
            &mut self,
            vendor_id: VendorId,
            farmer_id: FarmerId,
            period: &DateRange,
        ) -> Result<Option<Settlement>, PortError> {
            Ok(self
                .working
                .settlements
                .iter()
                .find(|s| {
                    s.vendor_id == vendor_id && s.farmer_id == farmer_id && s.period == *period && s.is_active()
                })
                .cloned())
        }

        async fn list_settlements(
            &mut self,
            vendor_id: VendorId,
            farmer_id: FarmerId,
        ) -> Result<Vec<Settlement>, PortError> {
            let mut settlements: Vec<Settlement> = self
                .working
                .settlements
                .iter()
                .filter(|s| s.vendor_id == vendor_id && s.farmer_id == farmer_id)
                .cloned()
                .collect();
            settlements.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(settlements)
        }

        async fn settlement_items(&mut self, settlement_id: SettlementId) -> Result<Vec<SettlementItem>, PortError> {
            Ok(self
                .working
                .settlement_items
                .iter()
                .filter(|l| l.settlement_id == settlement_id)
                .cloned()
                .collect())
        }

        async fn insert_settlement(&mut self, settlement: &Settlement) -> Result<(), PortError> {
            let duplicate = self.working.settlements.iter().any(|s| {
                s.is_active()
                    && s.vendor_id == settlement.vendor_id
                    && s.farmer_id == settlement.farmer_id
                    && s.period == settlement.period
            });
            if duplicate && settlement.is_active() {
                return Err(PortError::conflict("active settlement already exists for this period"));
            }
            self.working.settlements.push(settlement.clone());
            Ok(())
        }

        async fn update_settlement(&mut self, settlement: &Settlement) -> Result<(), PortError> {
            let slot = self
                .working
                .settlements
                .iter_mut()
                .find(|s| s.id == settlement.id && s.vendor_id == settlement.vendor_id)
                .ok_or_else(|| PortError::not_found("Settlement", settlement.id))?;
            *slot = settlement.clone();
            Ok(())
        }

        async fn insert_settlement_items(&mut self, items: &[SettlementItem]) -> Result<(), PortError> {
            self.working.settlement_items.extend_from_slice(items);
            Ok(())
        }

        async fn insert_advance(&mut self, advance: &Advance) -> Result<(), PortError> {
            self.working.advances.push(advance.clone());
            Ok(())
        }

        async fn list_advances(&mut self, vendor_id: VendorId, farmer_id: FarmerId) -> Result<Vec<Advance>, PortError> {
            Ok(self
                .working
                .advances
                .iter()
                .filter(|a| a.vendor_id == vendor_id && a.farmer_id == farmer_id)
                .cloned()
                .collect())
        }

        async fn insert_audit_records(&mut self, records: &[AuditRecord]) -> Result<(), PortError> {
            if self.fail_audit_writes {
                return Err(PortError::internal("audit log unavailable"));
            }
            self.working.audit.extend_from_slice(records);
            Ok(())
        }

        async fn commit(self) -> Result<(), PortError> {
            let injected = self
                .conflicts_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if injected {
                return Err(PortError::conflict("could not serialize access due to concurrent update"));
            }
            let MemoryTx { mut guard, working, .. } = self;
            *guard = working;
            Ok(())
        }

        async fn rollback(self) -> Result<(), PortError> {
            Ok(())
        }
    }
}
