//! Settlement service scenarios against the in-memory store

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{DateRange, FarmerId, Percentage, SettlementId, UserId, VendorId};

use domain_settlement::{
    AdvanceKind, ChangeAction, CollectionItem, DispatchError, DispatchStep, Dispatcher, DocumentRef,
    Farmer, FarmerGroup, FileStatementRenderer, LogNotifier, MemorySettlementStore,
    NewCollectionItem, RequestContext, SettlementConfig, SettlementError, SettlementRequest,
    SettlementService, SettlementStatement, SettlementStatus, StatementRenderer,
};

// ============================================================================
// Helpers
// ============================================================================

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, day).unwrap()
}

fn period() -> DateRange {
    DateRange::new(date(1), date(15)).unwrap()
}

fn pct(value: Decimal) -> Percentage {
    Percentage::new(value).unwrap()
}

struct Harness {
    store: Arc<MemorySettlementStore>,
    service: SettlementService<MemorySettlementStore>,
    ctx: RequestContext,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SettlementConfig::testing())
    }

    fn with_config(config: SettlementConfig) -> Self {
        let store = Arc::new(MemorySettlementStore::new());
        let service = SettlementService::new(store.clone(), config);
        Self {
            store,
            service,
            ctx: RequestContext::new(VendorId::new(), Some(UserId::new())),
        }
    }

    async fn farmer(&self, advance_total: Decimal, commission: Option<Decimal>) -> Farmer {
        let mut farmer = Farmer::new(self.ctx.vendor_id, "Lakshmi");
        farmer.phone = Some("9876543210".to_string());
        farmer.advance_total = advance_total;
        farmer.commission_percent = commission.map(pct);
        self.store.insert_farmer(farmer.clone()).await;
        farmer
    }

    /// Adds an item whose gross is `qty * rate` with the given handling costs
    async fn item(
        &self,
        farmer: &Farmer,
        day: u32,
        gross: Decimal,
        costs: (Decimal, Decimal, Decimal),
    ) -> CollectionItem {
        let item = CollectionItem::record(NewCollectionItem {
            vendor_id: farmer.vendor_id,
            farmer_id: farmer.id,
            group_id: farmer.group_id,
            date: date(day),
            qty: dec!(10),
            rate: gross / dec!(10),
            labour_per_unit: costs.0 / dec!(10),
            coolie_cost: costs.1,
            transport_cost: costs.2,
        })
        .unwrap();
        self.store.insert_collection_item(item.clone()).await;
        item
    }

    async fn plain_item(&self, farmer: &Farmer, day: u32, gross: Decimal) -> CollectionItem {
        self.item(farmer, day, gross, (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)).await
    }

    async fn balance(&self, farmer_id: FarmerId) -> Decimal {
        self.store.farmer(farmer_id).await.unwrap().advance_total
    }

    async fn is_locked(&self, item: &CollectionItem) -> bool {
        self.store.collection_item(item.id).await.unwrap().is_locked
    }
}

// ============================================================================
// Generate
// ============================================================================

mod generate_tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_settlement() {
        let h = Harness::new();
        let farmer = h.farmer(Decimal::ZERO, Some(dec!(10))).await;
        let item = h.item(&farmer, 3, dec!(1000), (dec!(50), dec!(20), dec!(10))).await;

        let receipt = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();

        assert_eq!(receipt.summary.total_commission, dec!(92));
        assert_eq!(receipt.summary.advance_deducted, dec!(0));
        assert_eq!(receipt.summary.net_payable, dec!(828));
        assert_eq!(receipt.summary.status, SettlementStatus::Active);
        assert!(receipt.warnings.is_empty());

        assert!(h.is_locked(&item).await);
        let links = h.store.settlement_items_of(receipt.summary.id).await;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].line_total, dec!(1000));
        assert!(h.store.advances_of(farmer.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_group_commission_is_snapshotted() {
        let h = Harness::new();
        let group = FarmerGroup::new(h.ctx.vendor_id, "Hosur", Some(pct(dec!(5))));
        h.store.insert_group(group.clone()).await;

        let mut farmer = Farmer::new(h.ctx.vendor_id, "Suresh");
        farmer.group_id = Some(group.id);
        h.store.insert_farmer(farmer.clone()).await;
        h.plain_item(&farmer, 2, dec!(1000)).await;

        let receipt = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();
        assert_eq!(receipt.summary.total_commission, dec!(50));

        let detail = h.service.get_settlement(&h.ctx, receipt.summary.id).await.unwrap();
        assert_eq!(detail.settlement.commission_percent, pct(dec!(5)));
    }

    #[tokio::test]
    async fn test_empty_range_writes_nothing() {
        let h = Harness::new();
        let farmer = h.farmer(dec!(500), None).await;
        // Outside the requested range
        h.plain_item(&farmer, 20, dec!(1000)).await;

        let result = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await;

        assert!(matches!(result, Err(SettlementError::InvalidState(msg)) if msg.contains("no unsettled collections")));
        assert!(h.store.settlements().await.is_empty());
        assert!(h.store.audit_records().await.is_empty());
        assert_eq!(h.balance(farmer.id).await, dec!(500));
    }

    #[tokio::test]
    async fn test_unknown_farmer_is_not_found() {
        let h = Harness::new();
        let result = h
            .service
            .generate(&h.ctx, SettlementRequest::new(FarmerId::new(), period()))
            .await;
        assert!(matches!(result, Err(SettlementError::NotFound { entity: "Farmer", .. })));
    }

    #[tokio::test]
    async fn test_other_vendor_cannot_settle_farmer() {
        let h = Harness::new();
        let farmer = h.farmer(Decimal::ZERO, None).await;
        h.plain_item(&farmer, 2, dec!(1000)).await;

        let intruder = RequestContext::new(VendorId::new(), None);
        let result = h
            .service
            .generate(&intruder, SettlementRequest::new(farmer.id, period()))
            .await;
        assert!(matches!(result, Err(SettlementError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_negative_payable_fails_without_writes() {
        let h = Harness::new();
        let farmer = h.farmer(dec!(300), None).await;
        let item = h.item(&farmer, 4, dec!(100), (dec!(80), dec!(30), dec!(0))).await;

        let result = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await;

        assert!(matches!(result, Err(SettlementError::InvalidCalculation { .. })));
        assert!(h.store.settlements().await.is_empty());
        assert!(!h.is_locked(&item).await);
        assert_eq!(h.balance(farmer.id).await, dec!(300));
        assert!(h.store.audit_records().await.is_empty());
    }

    #[tokio::test]
    async fn test_second_generate_on_same_period_is_rejected() {
        let h = Harness::new();
        let farmer = h.farmer(Decimal::ZERO, None).await;
        h.plain_item(&farmer, 2, dec!(1000)).await;
        h.service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();

        h.plain_item(&farmer, 3, dec!(500)).await;
        let result = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await;
        assert!(matches!(result, Err(SettlementError::InvalidState(msg)) if msg.contains("recalculate")));
    }

    #[tokio::test]
    async fn test_deduction_writes_ledger_entry_and_audit() {
        let h = Harness::new();
        let farmer = h.farmer(dec!(1000), Some(dec!(0))).await;
        h.plain_item(&farmer, 2, dec!(2000)).await;

        let receipt = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();

        assert_eq!(receipt.summary.advance_deducted, dec!(400));
        assert_eq!(receipt.summary.net_payable, dec!(1600));
        assert_eq!(h.balance(farmer.id).await, dec!(600));

        let entries = h.store.advances_of(farmer.id).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, dec!(-400));
        assert_eq!(entries[0].settlement_id, Some(receipt.summary.id));

        let audit = h.store.audit_records().await;
        let tables: Vec<&str> = audit.iter().map(|r| r.table).collect();
        for table in ["settlements", "settlement_items", "collection_items", "advances", "farmers"] {
            assert!(tables.contains(&table), "missing audit for {table}");
        }
        assert!(audit.iter().all(|r| r.vendor_id == h.ctx.vendor_id && r.user_id == h.ctx.user_id));

        let farmer_update = audit.iter().find(|r| r.table == "farmers").unwrap();
        assert_eq!(farmer_update.action, ChangeAction::Update);
        let balance_in = |snapshot: &Option<serde_json::Value>| -> Decimal {
            snapshot.as_ref().unwrap()["advance_total"].as_str().unwrap().parse().unwrap()
        };
        assert_eq!(balance_in(&farmer_update.before), dec!(1000));
        assert_eq!(balance_in(&farmer_update.after), dec!(600));
    }

    #[tokio::test]
    async fn test_explicit_cap_overrides_default() {
        let h = Harness::new();
        let farmer = h.farmer(dec!(1000), None).await;
        h.plain_item(&farmer, 2, dec!(2000)).await;

        let receipt = h
            .service
            .generate(
                &h.ctx,
                SettlementRequest::new(farmer.id, period()).with_deduction_cap(pct(dec!(10))),
            )
            .await
            .unwrap();
        assert_eq!(receipt.summary.advance_deducted, dec!(200));
    }
}

// ============================================================================
// Void
// ============================================================================

mod void_tests {
    use super::*;

    #[tokio::test]
    async fn test_void_restores_locks() {
        let h = Harness::new();
        let farmer = h.farmer(Decimal::ZERO, None).await;
        let items = vec![
            h.plain_item(&farmer, 1, dec!(100)).await,
            h.plain_item(&farmer, 2, dec!(200)).await,
            h.plain_item(&farmer, 3, dec!(300)).await,
        ];

        let receipt = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();
        for item in &items {
            assert!(h.is_locked(item).await);
        }

        let summary = h.service.void(&h.ctx, receipt.summary.id, "wrong rate entered").await.unwrap();
        assert_eq!(summary.status, SettlementStatus::Voided);
        for item in &items {
            assert!(!h.is_locked(item).await);
        }

        // Links are kept for the audit trail
        assert_eq!(h.store.settlement_items_of(receipt.summary.id).await.len(), 3);
    }

    #[tokio::test]
    async fn test_advance_conservation_across_generate_and_void() {
        let h = Harness::new();
        let farmer = h.farmer(dec!(1000), None).await;
        h.plain_item(&farmer, 2, dec!(2000)).await;

        let receipt = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();
        assert_eq!(h.balance(farmer.id).await, dec!(600));

        h.service.void(&h.ctx, receipt.summary.id, "farmer disputed").await.unwrap();
        assert_eq!(h.balance(farmer.id).await, dec!(1000));

        let reconciliation = h.service.reconcile_advances(&h.ctx, farmer.id).await.unwrap();
        // Seeded balance has no ledger entry behind it; only the settlement pair is in the ledger
        assert_eq!(reconciliation.ledger_total, Decimal::ZERO);
        assert_eq!(reconciliation.cached_total, dec!(1000));
    }

    #[tokio::test]
    async fn test_second_void_fails_and_changes_nothing() {
        let h = Harness::new();
        let farmer = h.farmer(dec!(1000), None).await;
        let item = h.plain_item(&farmer, 2, dec!(2000)).await;

        let receipt = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();
        h.service.void(&h.ctx, receipt.summary.id, "duplicate").await.unwrap();

        let audit_before = h.store.audit_records().await.len();
        let result = h.service.void(&h.ctx, receipt.summary.id, "duplicate").await;

        assert!(matches!(result, Err(SettlementError::InvalidState(_))));
        assert_eq!(h.balance(farmer.id).await, dec!(1000));
        assert!(!h.is_locked(&item).await);
        assert_eq!(h.store.audit_records().await.len(), audit_before);
    }

    #[tokio::test]
    async fn test_void_requires_reason() {
        let h = Harness::new();
        let farmer = h.farmer(Decimal::ZERO, None).await;
        h.plain_item(&farmer, 2, dec!(2000)).await;
        let receipt = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();

        let result = h.service.void(&h.ctx, receipt.summary.id, " x ").await;
        assert!(matches!(result, Err(SettlementError::Validation(_))));
    }

    #[tokio::test]
    async fn test_void_unknown_settlement() {
        let h = Harness::new();
        let result = h.service.void(&h.ctx, SettlementId::new(), "not there").await;
        assert!(matches!(result, Err(SettlementError::NotFound { entity: "Settlement", .. })));
    }

    #[tokio::test]
    async fn test_items_can_be_resettled_after_void() {
        let h = Harness::new();
        let farmer = h.farmer(Decimal::ZERO, None).await;
        h.plain_item(&farmer, 2, dec!(2000)).await;

        let first = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();
        h.service.void(&h.ctx, first.summary.id, "rate correction").await.unwrap();

        let second = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();
        assert_ne!(first.summary.id, second.summary.id);
        assert_eq!(second.summary.net_payable, dec!(2000));

        let listed = h.service.list_settlements(&h.ctx, farmer.id).await.unwrap();
        assert_eq!(listed.len(), 2);
    }
}

// ============================================================================
// Recalculate
// ============================================================================

mod recalculate_tests {
    use super::*;

    #[tokio::test]
    async fn test_no_double_deduction() {
        let h = Harness::new();
        let farmer = h.farmer(dec!(1000), Some(dec!(0))).await;
        h.plain_item(&farmer, 2, dec!(2000)).await;

        let first = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();
        assert_eq!(first.summary.advance_deducted, dec!(400));
        assert_eq!(first.summary.net_payable, dec!(1600));

        let added = h.plain_item(&farmer, 9, dec!(500)).await;
        let recalculated = h
            .service
            .recalculate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();

        assert_eq!(recalculated.summary.id, first.summary.id);
        assert_eq!(recalculated.summary.advance_deducted, dec!(500));
        assert_eq!(recalculated.summary.net_payable, dec!(2000));
        assert_eq!(h.balance(farmer.id).await, dec!(500));
        assert!(h.is_locked(&added).await);
        assert_eq!(h.store.settlement_items_of(first.summary.id).await.len(), 2);

        // Deduct 400, restore 400, deduct 500
        let amounts: Vec<Decimal> = h.store.advances_of(farmer.id).await.iter().map(|a| a.amount).collect();
        assert_eq!(amounts, vec![dec!(-400), dec!(400), dec!(-500)]);
    }

    #[tokio::test]
    async fn test_repeated_recalculation_is_stable() {
        let h = Harness::new();
        let farmer = h.farmer(dec!(1000), None).await;
        h.plain_item(&farmer, 2, dec!(2000)).await;
        h.service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();

        for _ in 0..3 {
            let receipt = h
                .service
                .recalculate(&h.ctx, SettlementRequest::new(farmer.id, period()))
                .await
                .unwrap();
            assert_eq!(receipt.summary.advance_deducted, dec!(400));
        }
        assert_eq!(h.balance(farmer.id).await, dec!(600));
    }

    #[tokio::test]
    async fn test_recalculate_creates_when_missing() {
        let h = Harness::new();
        let farmer = h.farmer(Decimal::ZERO, None).await;
        h.plain_item(&farmer, 2, dec!(700)).await;

        let receipt = h
            .service
            .recalculate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();
        assert_eq!(receipt.summary.net_payable, dec!(700));
        assert_eq!(h.store.settlements().await.len(), 1);
    }

    #[tokio::test]
    async fn test_recalculate_resnapshots_commission() {
        let h = Harness::new();
        let farmer = h.farmer(Decimal::ZERO, Some(dec!(10))).await;
        h.plain_item(&farmer, 2, dec!(1000)).await;
        let first = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();
        assert_eq!(first.summary.total_commission, dec!(100));

        let mut changed = h.store.farmer(farmer.id).await.unwrap();
        changed.commission_percent = Some(pct(dec!(5)));
        h.store.insert_farmer(changed).await;

        // The stored snapshot is untouched until a recalculation
        let detail = h.service.get_settlement(&h.ctx, first.summary.id).await.unwrap();
        assert_eq!(detail.settlement.commission_percent, pct(dec!(10)));

        let receipt = h
            .service
            .recalculate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();
        assert_eq!(receipt.summary.total_commission, dec!(50));
    }

    #[tokio::test]
    async fn test_recalculate_failure_rolls_back_restore() {
        let h = Harness::new();
        let farmer = h.farmer(dec!(1000), None).await;
        h.plain_item(&farmer, 2, dec!(2000)).await;
        h.service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();

        // Costs exceeding gross make the recomputation fail
        h.item(&farmer, 5, dec!(10), (dec!(5000), dec!(0), dec!(0))).await;
        let result = h
            .service
            .recalculate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await;

        assert!(matches!(result, Err(SettlementError::InvalidCalculation { .. })));
        assert_eq!(h.balance(farmer.id).await, dec!(600));
        assert_eq!(h.store.advances_of(farmer.id).await.len(), 1);
    }
}

// ============================================================================
// Consistency
// ============================================================================

mod consistency_tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_exclusivity_under_concurrency() {
        let h = Arc::new(Harness::new());
        let farmer = h.farmer(dec!(1000), None).await;
        for day in 1..=3 {
            h.plain_item(&farmer, day, dec!(1000)).await;
        }

        let farmer_id = farmer.id;
        let overlapping = DateRange::new(date(1), date(10)).unwrap();
        let a = {
            let h = h.clone();
            tokio::spawn(async move {
                h.service
                    .generate(&h.ctx, SettlementRequest::new(farmer_id, period()))
                    .await
            })
        };
        let b = {
            let h = h.clone();
            tokio::spawn(async move {
                h.service
                    .generate(&h.ctx, SettlementRequest::new(farmer_id, overlapping))
                    .await
            })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(SettlementError::InvalidState(_)))));

        let settlements = h.store.settlements().await;
        assert_eq!(settlements.len(), 1);
        assert_eq!(h.store.settlement_items_of(settlements[0].id).await.len(), 3);
        assert_eq!(h.balance(farmer.id).await, dec!(400));
    }

    #[tokio::test]
    async fn test_audit_failure_rolls_back_everything() {
        let h = Harness::new();
        let farmer = h.farmer(dec!(1000), None).await;
        let item = h.plain_item(&farmer, 2, dec!(2000)).await;

        h.store.fail_audit_writes(true);
        let result = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await;

        assert!(matches!(result, Err(SettlementError::Storage(_))));
        assert!(h.store.settlements().await.is_empty());
        assert!(h.store.advances_of(farmer.id).await.is_empty());
        assert!(!h.is_locked(&item).await);
        assert_eq!(h.balance(farmer.id).await, dec!(1000));
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let h = Harness::new();
        let farmer = h.farmer(Decimal::ZERO, None).await;
        h.plain_item(&farmer, 2, dec!(2000)).await;

        h.store.inject_conflicts(2);
        let receipt = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();
        assert_eq!(receipt.summary.net_payable, dec!(2000));
        assert_eq!(h.store.settlements().await.len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_surfaces_after_last_attempt() {
        let h = Harness::with_config(SettlementConfig::testing().with_retry_attempts(2));
        let farmer = h.farmer(Decimal::ZERO, None).await;
        h.plain_item(&farmer, 2, dec!(2000)).await;

        h.store.inject_conflicts(5);
        let result = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await;

        let error = result.unwrap_err();
        assert!(error.is_retryable());
        assert!(h.store.settlements().await.is_empty());
    }
}

// ============================================================================
// Advances
// ============================================================================

mod advance_tests {
    use super::*;

    #[tokio::test]
    async fn test_give_and_recover() {
        let h = Harness::new();
        let farmer = h.farmer(Decimal::ZERO, None).await;

        h.service
            .record_advance(&h.ctx, farmer.id, AdvanceKind::Give, dec!(1500), Some("seed money".into()))
            .await
            .unwrap();
        h.service
            .record_advance(&h.ctx, farmer.id, AdvanceKind::Recover, dec!(500), None)
            .await
            .unwrap();

        let summary = h.service.advance_summary(&h.ctx, farmer.id).await.unwrap();
        assert_eq!(summary.given, dec!(1500));
        assert_eq!(summary.deducted, dec!(500));
        assert_eq!(summary.balance, dec!(1000));
        assert_eq!(summary.entries.len(), 2);

        let reconciliation = h.service.reconcile_advances(&h.ctx, farmer.id).await.unwrap();
        assert!(reconciliation.is_consistent);
    }

    #[tokio::test]
    async fn test_over_recovery_is_rejected() {
        let h = Harness::new();
        let farmer = h.farmer(Decimal::ZERO, None).await;
        h.service
            .record_advance(&h.ctx, farmer.id, AdvanceKind::Give, dec!(100), None)
            .await
            .unwrap();

        let result = h
            .service
            .record_advance(&h.ctx, farmer.id, AdvanceKind::Recover, dec!(100.01), None)
            .await;
        assert!(matches!(result, Err(SettlementError::Validation(_))));
        assert_eq!(h.balance(farmer.id).await, dec!(100));
    }

    #[tokio::test]
    async fn test_ledger_stays_consistent_through_settlement_cycle() {
        let h = Harness::new();
        let farmer = h.farmer(Decimal::ZERO, None).await;
        h.service
            .record_advance(&h.ctx, farmer.id, AdvanceKind::Give, dec!(1000), None)
            .await
            .unwrap();
        h.plain_item(&farmer, 2, dec!(2000)).await;

        let receipt = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();
        h.plain_item(&farmer, 4, dec!(500)).await;
        h.service
            .recalculate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();
        h.service.void(&h.ctx, receipt.summary.id, "closing period").await.unwrap();

        let reconciliation = h.service.reconcile_advances(&h.ctx, farmer.id).await.unwrap();
        assert!(reconciliation.is_consistent);
        assert_eq!(reconciliation.cached_total, dec!(1000));
    }
}

// ============================================================================
// Dispatch
// ============================================================================

mod dispatch_tests {
    use super::*;

    struct BrokenRenderer;

    #[async_trait]
    impl StatementRenderer for BrokenRenderer {
        async fn render(&self, _: &SettlementStatement) -> Result<DocumentRef, DispatchError> {
            Err(DispatchError::Render("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_document_url_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = Harness::new();
        h.service = SettlementService::new(h.store.clone(), SettlementConfig::testing()).with_dispatcher(
            Dispatcher::new(
                Arc::new(FileStatementRenderer::new(dir.path(), "/static/settlements")),
                Arc::new(LogNotifier),
                Duration::from_secs(1),
            ),
        );
        let farmer = h.farmer(Decimal::ZERO, None).await;
        h.plain_item(&farmer, 2, dec!(2000)).await;

        let receipt = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();

        assert!(receipt.warnings.is_empty());
        let detail = h.service.get_settlement(&h.ctx, receipt.summary.id).await.unwrap();
        assert!(detail
            .settlement
            .document_url
            .unwrap()
            .starts_with("/static/settlements/settlement_"));
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_only_a_warning() {
        let mut h = Harness::new();
        h.service = SettlementService::new(h.store.clone(), SettlementConfig::testing()).with_dispatcher(
            Dispatcher::new(Arc::new(BrokenRenderer), Arc::new(LogNotifier), Duration::from_secs(1)),
        );
        let farmer = h.farmer(dec!(1000), None).await;
        h.plain_item(&farmer, 2, dec!(2000)).await;

        let receipt = h
            .service
            .generate(&h.ctx, SettlementRequest::new(farmer.id, period()))
            .await
            .unwrap();

        assert_eq!(receipt.warnings.len(), 1);
        assert_eq!(receipt.warnings[0].step, DispatchStep::Render);

        let settlements = h.store.settlements().await;
        assert_eq!(settlements.len(), 1);
        assert!(settlements[0].document_url.is_none());
        assert_eq!(h.balance(farmer.id).await, dec!(600));
    }
}
