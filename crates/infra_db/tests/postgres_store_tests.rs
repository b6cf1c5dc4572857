//! Settlement flows against a real PostgreSQL
//!
//! These tests start a container and are ignored by default:
//!
//! ```bash
//! cargo test -p infra_db -- --ignored
//! ```

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use domain_settlement::{
    AdvanceKind, Farmer, SettlementConfig, SettlementError, SettlementRequest, SettlementService,
    SettlementStatus,
};
use infra_db::{DatabaseError, PostgresSettlementStore};
use test_utils::{
    assert_items_locked, assert_ledger_consistent, assert_payable_identity, assert_status,
    count_rows, create_isolated_test_database, CollectionItemBuilder, ContextFixtures, DateFixtures,
    DatabaseTestAssertions, FarmerBuilder, TestDatabase,
};

struct PgHarness {
    db: Arc<TestDatabase>,
    service: Arc<SettlementService<PostgresSettlementStore>>,
    ctx: domain_settlement::RequestContext,
}

impl PgHarness {
    async fn new() -> Self {
        // One container per test: a pool cannot outlive the runtime of the
        // test that opened it
        let db = Arc::new(create_isolated_test_database().await.expect("starting postgres"));
        let service = Arc::new(SettlementService::new(Arc::new(db.store()), SettlementConfig::testing()));
        Self {
            db,
            service,
            ctx: ContextFixtures::vendor(),
        }
    }

    /// Farmer with 10% commission, `advance` outstanding and one 10 kg × 50
    /// delivery on day 2
    async fn seed(&self, advance: Decimal) -> Farmer {
        let repo = self.db.collections();
        let farmer = FarmerBuilder::new(self.ctx.vendor_id).with_commission(dec!(10)).build();
        repo.insert_farmer(&farmer).await.unwrap();

        if advance > Decimal::ZERO {
            self.service
                .record_advance(&self.ctx, farmer.id, AdvanceKind::Give, advance, None)
                .await
                .unwrap();
        }

        let item = CollectionItemBuilder::for_farmer(&farmer).on_day(2).build();
        repo.insert_collection_item(&item).await.unwrap();

        repo.get_farmer(self.ctx.vendor_id, farmer.id).await.unwrap()
    }

    fn request(&self, farmer: &Farmer) -> SettlementRequest {
        SettlementRequest::new(farmer.id, DateFixtures::first_fortnight())
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_generate_persists_settlement_and_deduction() {
    let h = PgHarness::new().await;
    let farmer = h.seed(dec!(300)).await;

    let receipt = h.service.generate(&h.ctx, h.request(&farmer)).await.unwrap();

    // 500 gross, 50 commission, cap 20% of 450
    assert_eq!(receipt.summary.gross_amount, dec!(500));
    assert_eq!(receipt.summary.total_commission, dec!(50));
    assert_eq!(receipt.summary.advance_deducted, dec!(90));
    assert_eq!(receipt.summary.net_payable, dec!(360));

    let detail = h.service.get_settlement(&h.ctx, receipt.summary.id).await.unwrap();
    assert_payable_identity(&detail.settlement);
    assert_eq!(detail.items.len(), 1);

    let repo = h.db.collections();
    let item = repo
        .get_collection_item(h.ctx.vendor_id, detail.items[0].collection_item_id)
        .await
        .unwrap();
    assert_items_locked(&[item], true);

    let farmer = repo.get_farmer(h.ctx.vendor_id, farmer.id).await.unwrap();
    assert_eq!(farmer.advance_total, dec!(210));
    let summary = h.service.advance_summary(&h.ctx, farmer.id).await.unwrap();
    assert_ledger_consistent(&farmer, &summary.entries);

    assert!(count_rows(h.db.pool(), "audit_log", *h.ctx.vendor_id.as_uuid()).await >= 3);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_void_restores_advance_and_unlocks_items() {
    let h = PgHarness::new().await;
    let farmer = h.seed(dec!(300)).await;
    let receipt = h.service.generate(&h.ctx, h.request(&farmer)).await.unwrap();
    let detail = h.service.get_settlement(&h.ctx, receipt.summary.id).await.unwrap();

    let voided = h.service.void(&h.ctx, receipt.summary.id, "wrong rate").await.unwrap();
    assert_eq!(voided.status, SettlementStatus::Voided);

    let repo = h.db.collections();
    let farmer = repo.get_farmer(h.ctx.vendor_id, farmer.id).await.unwrap();
    assert_eq!(farmer.advance_total, dec!(300));

    let item = repo
        .get_collection_item(h.ctx.vendor_id, detail.items[0].collection_item_id)
        .await
        .unwrap();
    assert_items_locked(&[item], false);

    let again = h.service.void(&h.ctx, receipt.summary.id, "twice").await;
    assert!(matches!(again, Err(SettlementError::InvalidState(_))));

    // The period is free again once voided
    let regenerated = h.service.generate(&h.ctx, h.request(&farmer)).await.unwrap();
    let detail = h.service.get_settlement(&h.ctx, regenerated.summary.id).await.unwrap();
    assert_status(&detail.settlement, SettlementStatus::Active);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_recalculate_picks_up_late_delivery() {
    let h = PgHarness::new().await;
    let farmer = h.seed(Decimal::ZERO).await;
    let first = h.service.generate(&h.ctx, h.request(&farmer)).await.unwrap();

    let late = CollectionItemBuilder::for_farmer(&farmer)
        .on_day(9)
        .qty_rate(dec!(4), dec!(25))
        .build();
    h.db.collections().insert_collection_item(&late).await.unwrap();

    let receipt = h.service.recalculate(&h.ctx, h.request(&farmer)).await.unwrap();
    assert_eq!(receipt.summary.id, first.summary.id);
    assert_eq!(receipt.summary.gross_amount, dec!(600));
    assert_eq!(receipt.summary.total_commission, dec!(60));

    let detail = h.service.get_settlement(&h.ctx, receipt.summary.id).await.unwrap();
    assert_eq!(detail.items.len(), 2);
    assert_payable_identity(&detail.settlement);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_concurrent_generate_settles_once() {
    let h = PgHarness::new().await;
    let farmer = h.seed(dec!(100)).await;

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let service = h.service.clone();
            let ctx = h.ctx;
            let request = h.request(&farmer);
            tokio::spawn(async move { service.generate(&ctx, request).await })
        })
        .collect();

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(SettlementError::InvalidState(_)) | Err(SettlementError::ConcurrencyConflict(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(succeeded, 1);

    let settlements = h.service.list_settlements(&h.ctx, farmer.id).await.unwrap();
    assert_eq!(settlements.len(), 1);

    let repo = h.db.collections();
    let farmer = repo.get_farmer(h.ctx.vendor_id, farmer.id).await.unwrap();
    let summary = h.service.advance_summary(&h.ctx, farmer.id).await.unwrap();
    assert_ledger_consistent(&farmer, &summary.entries);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_locked_item_cannot_be_deleted() {
    let h = PgHarness::new().await;
    let farmer = h.seed(Decimal::ZERO).await;
    let receipt = h.service.generate(&h.ctx, h.request(&farmer)).await.unwrap();
    let detail = h.service.get_settlement(&h.ctx, receipt.summary.id).await.unwrap();
    let item_id = detail.items[0].collection_item_id;

    let repo = h.db.collections();
    let result = repo.delete_collection_item(h.ctx.vendor_id, item_id).await;
    assert!(matches!(result, Err(SettlementError::InvalidState(_))));

    h.service.void(&h.ctx, receipt.summary.id, "redo").await.unwrap();
    repo.delete_collection_item(h.ctx.vendor_id, item_id).await.unwrap();
    assert!(matches!(
        repo.get_collection_item(h.ctx.vendor_id, item_id).await,
        Err(DatabaseError::NotFound { .. })
    ));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_other_vendor_cannot_see_settlement() {
    let h = PgHarness::new().await;
    let farmer = h.seed(Decimal::ZERO).await;
    let receipt = h.service.generate(&h.ctx, h.request(&farmer)).await.unwrap();

    let stranger = ContextFixtures::vendor();
    let result = h.service.get_settlement(&stranger, receipt.summary.id).await;
    assert!(matches!(result, Err(SettlementError::NotFound { .. })));
}

test_utils::db_test!(test_clear_data_empties_every_table, |db| {
    let ctx = ContextFixtures::vendor();
    let farmer = FarmerBuilder::new(ctx.vendor_id).build();
    db.collections().insert_farmer(&farmer).await.unwrap();

    let result = sqlx::query("UPDATE farmers SET phone = NULL WHERE vendor_id = $1")
        .bind(ctx.vendor_id.as_uuid())
        .execute(db.pool())
        .await
        .unwrap();
    result.assert_rows_affected(1);

    db.clear_data().await.unwrap();
    assert_eq!(count_rows(db.pool(), "farmers", *ctx.vendor_id.as_uuid()).await, 0);
});
