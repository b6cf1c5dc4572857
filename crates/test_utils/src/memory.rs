//! In-memory service harness
//!
//! Wires a [`SettlementService`] to a [`MemorySettlementStore`] under a fresh
//! vendor, for tests that exercise settlement flows without a database.

use std::sync::Arc;

use rust_decimal::Decimal;

use domain_settlement::{
    AdvanceKind, CollectionItem, Farmer, FarmerGroup, MemorySettlementStore, RequestContext,
    SettlementConfig, SettlementService,
};

use crate::builders::{CollectionItemBuilder, FarmerBuilder, FarmerGroupBuilder};
use crate::fixtures::ContextFixtures;

/// Service, store and caller context for one test
pub struct MemoryHarness {
    pub store: Arc<MemorySettlementStore>,
    pub service: Arc<SettlementService<MemorySettlementStore>>,
    pub ctx: RequestContext,
}

impl MemoryHarness {
    pub fn new() -> Self {
        Self::with_config(SettlementConfig::testing())
    }

    pub fn with_config(config: SettlementConfig) -> Self {
        let store = Arc::new(MemorySettlementStore::new());
        let service = Arc::new(SettlementService::new(store.clone(), config));
        Self {
            store,
            service,
            ctx: ContextFixtures::vendor(),
        }
    }

    /// Farmer builder scoped to this harness's vendor
    pub fn farmer(&self) -> FarmerBuilder {
        FarmerBuilder::new(self.ctx.vendor_id)
    }

    /// Group builder scoped to this harness's vendor
    pub fn group(&self) -> FarmerGroupBuilder {
        FarmerGroupBuilder::new(self.ctx.vendor_id)
    }

    pub async fn seed_group(&self, group: FarmerGroup) -> FarmerGroup {
        self.store.insert_group(group.clone()).await;
        group
    }

    /// Stores `farmer`; a non-zero opening advance is posted through the
    /// ledger so the cached balance and the entries agree
    pub async fn seed_farmer(&self, farmer: Farmer) -> Farmer {
        let opening = farmer.advance_total;
        let farmer = Farmer {
            advance_total: Decimal::ZERO,
            ..farmer
        };
        self.store.insert_farmer(farmer.clone()).await;

        if opening > Decimal::ZERO {
            self.service
                .record_advance(&self.ctx, farmer.id, AdvanceKind::Give, opening, Some("opening balance".into()))
                .await
                .expect("seeding opening advance");
        }
        self.store.farmer(farmer.id).await.expect("seeded farmer is stored")
    }

    pub async fn seed_items(&self, items: Vec<CollectionItem>) -> Vec<CollectionItem> {
        for item in &items {
            self.store.insert_collection_item(item.clone()).await;
        }
        items
    }

    /// Seeds a farmer with `advance` outstanding and one delivery of
    /// `qty` × `rate` on day 1
    pub async fn seed_simple(&self, advance: Decimal, qty: Decimal, rate: Decimal) -> Farmer {
        let farmer = self.seed_farmer(self.farmer().with_advance(advance).build()).await;
        self.seed_items(vec![CollectionItemBuilder::for_farmer(&farmer).qty_rate(qty, rate).build()])
            .await;
        farmer
    }
}

impl Default for MemoryHarness {
    fn default() -> Self {
        Self::new()
    }
}
