//! Settlement application service
//!
//! Orchestrates the store, calculator and dispatcher for each settlement
//! operation. An operation runs as:
//!
//! 1. begin a unit of work
//! 2. lock the farmer row, then the settlement and collection rows it reads
//! 3. compute and write, collecting a [`ChangeSet`]
//! 4. flush the audit records and commit
//! 5. after commit, dispatch documents and notifications (best effort)
//!
//! Steps 1 to 4 are retried from scratch on a concurrency conflict.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use core_kernel::{
    CollectionItemId, DateRange, FarmerId, HealthCheckResult, Percentage, SettlementId, UserId,
    VendorId,
};

use crate::advance::{Advance, AdvanceKind, AdvanceReconciliation, AdvanceSummary};
use crate::audit::ChangeSet;
use crate::calculator::{calculate, SettlementBreakdown, SettlementInput};
use crate::collection::CollectionItem;
use crate::commission::resolve_commission;
use crate::config::SettlementConfig;
use crate::dispatch::{
    DispatchStep, DispatchWarning, Dispatcher, SettlementStatement, StatementLine,
};
use crate::error::SettlementError;
use crate::farmer::Farmer;
use crate::ports::{ItemScope, SettlementStore, SettlementTx};
use crate::retry::RetryPolicy;
use crate::settlement::{Settlement, SettlementItem, SettlementSummary};

pub type SettlementResult<T> = Result<T, SettlementError>;

/// Caller identity for one request
///
/// Passed explicitly into every operation; nothing about the caller is kept
/// in ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub vendor_id: VendorId,
    pub user_id: Option<UserId>,
    pub correlation_id: Uuid,
}

impl RequestContext {
    pub fn new(vendor_id: VendorId, user_id: Option<UserId>) -> Self {
        Self {
            vendor_id,
            user_id,
            correlation_id: Uuid::new_v4(),
        }
    }
}

/// Input to `generate` and `recalculate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub farmer_id: FarmerId,
    pub period: DateRange,
    /// Overrides the configured deduction cap
    pub deduction_cap: Option<Percentage>,
}

impl SettlementRequest {
    pub fn new(farmer_id: FarmerId, period: DateRange) -> Self {
        Self {
            farmer_id,
            period,
            deduction_cap: None,
        }
    }

    pub fn with_deduction_cap(mut self, cap: Percentage) -> Self {
        self.deduction_cap = Some(cap);
        self
    }
}

/// Outcome of a settlement operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub summary: SettlementSummary,
    /// Post-commit failures; the settlement itself is committed
    pub warnings: Vec<DispatchWarning>,
}

/// A settlement with its linked items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementDetail {
    pub settlement: Settlement,
    pub items: Vec<SettlementItem>,
}

/// Application service for settlements and advances
pub struct SettlementService<S: SettlementStore> {
    store: Arc<S>,
    dispatcher: Option<Dispatcher>,
    config: SettlementConfig,
    retry: RetryPolicy,
}

impl<S: SettlementStore> SettlementService<S> {
    pub fn new(store: Arc<S>, config: SettlementConfig) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            store,
            dispatcher: None,
            config,
            retry,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub async fn health(&self) -> HealthCheckResult {
        self.store.health_check().await
    }

    /// The default settlement window ending on `today`
    pub fn default_period(&self, today: chrono::NaiveDate) -> SettlementResult<DateRange> {
        Ok(DateRange::ending_at(today, self.config.default_range_days)?)
    }

    /// Settles a farmer's unlocked collections within the requested period
    ///
    /// # Errors
    ///
    /// - `NotFound` if the farmer does not exist for the vendor
    /// - `InvalidState` if an ACTIVE settlement already covers the exact
    ///   period, or there is nothing to settle
    /// - `InvalidCalculation` if the net payable would be negative
    /// - `ConcurrencyConflict` once retries are exhausted
    #[instrument(
        skip(self, ctx, request),
        fields(vendor_id = %ctx.vendor_id, farmer_id = %request.farmer_id, period = %request.period, correlation_id = %ctx.correlation_id)
    )]
    pub async fn generate(
        &self,
        ctx: &RequestContext,
        request: SettlementRequest,
    ) -> SettlementResult<SettlementReceipt> {
        let statement = self.retry.execute(|| self.generate_once(ctx, &request)).await?;
        let summary = statement.settlement.summary();
        let warnings = self.dispatch(ctx, statement).await;
        Ok(SettlementReceipt { summary, warnings })
    }

    async fn generate_once(
        &self,
        ctx: &RequestContext,
        request: &SettlementRequest,
    ) -> SettlementResult<SettlementStatement> {
        let mut tx = self.store.begin().await?;
        let farmer = lock_farmer(&mut tx, ctx, request.farmer_id).await?;

        if let Some(existing) = tx
            .find_active_settlement(ctx.vendor_id, farmer.id, &request.period)
            .await?
        {
            return Err(SettlementError::invalid_state(format!(
                "settlement {} already covers {}; use recalculate",
                existing.id, request.period
            )));
        }

        let items = tx
            .lock_collection_items(ctx.vendor_id, farmer.id, &request.period, ItemScope::Unlocked)
            .await?;
        let breakdown = self
            .compute(&mut tx, &farmer, &items, farmer.advance_total, request.deduction_cap)
            .await?;

        let now = Utc::now();
        let mut changes = ChangeSet::new();
        let settlement = Settlement::new_active(ctx.vendor_id, farmer.id, request.period, &breakdown, now);
        tx.insert_settlement(&settlement).await?;
        changes.inserted(&settlement);

        link_items(&mut tx, ctx, &settlement, &breakdown, &items, &HashSet::new(), &mut changes).await?;

        let farmer_after = if breakdown.advance_deducted > Decimal::ZERO {
            let entry = Advance::settlement_deduction(
                ctx.vendor_id,
                farmer.id,
                settlement.id,
                breakdown.advance_deducted,
                now,
            );
            post_advance(&mut tx, &farmer, entry, &mut changes).await?
        } else {
            farmer
        };

        flush_and_commit(tx, ctx, changes, now).await?;
        info!(
            settlement_id = %settlement.id,
            net_payable = %settlement.net_payable,
            advance_deducted = %settlement.advance_deducted,
            "Settlement generated"
        );

        Ok(self.statement(settlement, &farmer_after, &items))
    }

    /// Voids an ACTIVE settlement, restoring its advance deduction and
    /// unlocking the collection items it consumed
    ///
    /// # Errors
    ///
    /// - `Validation` if the reason is not 3 to 255 characters
    /// - `NotFound` if the settlement does not exist for the vendor
    /// - `InvalidState` if the settlement is already voided
    #[instrument(skip(self, ctx, reason), fields(vendor_id = %ctx.vendor_id))]
    pub async fn void(
        &self,
        ctx: &RequestContext,
        settlement_id: SettlementId,
        reason: &str,
    ) -> SettlementResult<SettlementSummary> {
        self.retry
            .execute(|| self.void_once(ctx, settlement_id, reason))
            .await
    }

    async fn void_once(
        &self,
        ctx: &RequestContext,
        settlement_id: SettlementId,
        reason: &str,
    ) -> SettlementResult<SettlementSummary> {
        let mut tx = self.store.begin().await?;

        let farmer_id = tx
            .get_settlement(ctx.vendor_id, settlement_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Settlement", settlement_id))?
            .farmer_id;
        let farmer = lock_farmer(&mut tx, ctx, farmer_id).await?;
        let settlement = tx
            .lock_settlement(ctx.vendor_id, settlement_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Settlement", settlement_id))?;

        let now = Utc::now();
        let mut voided = settlement.clone();
        voided.void(reason, now)?;

        let mut changes = ChangeSet::new();
        tx.update_settlement(&voided).await?;
        changes.updated(&settlement, &voided);

        let linked: Vec<CollectionItemId> = tx
            .settlement_items(settlement.id)
            .await?
            .into_iter()
            .map(|link| link.collection_item_id)
            .collect();
        let items = tx.lock_collection_items_by_id(ctx.vendor_id, &linked).await?;
        set_locks(&mut tx, ctx, &items, false, &mut changes).await?;

        if settlement.advance_deducted > Decimal::ZERO {
            let entry = Advance::settlement_restoration(
                ctx.vendor_id,
                farmer.id,
                settlement.id,
                settlement.advance_deducted,
                now,
            );
            post_advance(&mut tx, &farmer, entry, &mut changes).await?;
        }

        flush_and_commit(tx, ctx, changes, now).await?;
        info!(
            unlocked = items.len(),
            advance_restored = %settlement.advance_deducted,
            "Settlement voided"
        );

        Ok(voided.summary())
    }

    /// Recomputes the ACTIVE settlement for the exact period, or creates one
    ///
    /// The previous advance deduction is restored before the recomputation and
    /// the new one applied after it, in the same unit of work, so a deduction
    /// is never counted twice.
    #[instrument(
        skip(self, ctx, request),
        fields(vendor_id = %ctx.vendor_id, farmer_id = %request.farmer_id, period = %request.period, correlation_id = %ctx.correlation_id)
    )]
    pub async fn recalculate(
        &self,
        ctx: &RequestContext,
        request: SettlementRequest,
    ) -> SettlementResult<SettlementReceipt> {
        let settlement = self
            .retry
            .execute(|| self.recalculate_once(ctx, &request))
            .await?;
        Ok(SettlementReceipt {
            summary: settlement.summary(),
            warnings: Vec::new(),
        })
    }

    async fn recalculate_once(
        &self,
        ctx: &RequestContext,
        request: &SettlementRequest,
    ) -> SettlementResult<Settlement> {
        let mut tx = self.store.begin().await?;
        let farmer = lock_farmer(&mut tx, ctx, request.farmer_id).await?;
        let existing = tx
            .find_active_settlement(ctx.vendor_id, farmer.id, &request.period)
            .await?;

        let now = Utc::now();
        let mut changes = ChangeSet::new();

        // Restore first so the recomputation sees the pre-settlement balance
        let mut farmer = farmer;
        if let Some(existing) = existing.as_ref().filter(|s| s.advance_deducted > Decimal::ZERO) {
            let entry = Advance::settlement_restoration(
                ctx.vendor_id,
                farmer.id,
                existing.id,
                existing.advance_deducted,
                now,
            );
            farmer = post_advance(&mut tx, &farmer, entry, &mut changes).await?;
        }

        let scope = match &existing {
            Some(existing) => ItemScope::UnlockedOrLinkedTo(existing.id),
            None => ItemScope::Unlocked,
        };
        let items = tx
            .lock_collection_items(ctx.vendor_id, farmer.id, &request.period, scope)
            .await?;
        let breakdown = self
            .compute(&mut tx, &farmer, &items, farmer.advance_total, request.deduction_cap)
            .await?;

        let settlement = match existing {
            Some(existing) => {
                let mut updated = existing.clone();
                updated.apply_breakdown(&breakdown, now)?;
                tx.update_settlement(&updated).await?;
                changes.updated(&existing, &updated);

                let already_linked: HashSet<CollectionItemId> = tx
                    .settlement_items(existing.id)
                    .await?
                    .into_iter()
                    .map(|link| link.collection_item_id)
                    .collect();
                link_items(&mut tx, ctx, &updated, &breakdown, &items, &already_linked, &mut changes).await?;
                updated
            }
            None => {
                let created = Settlement::new_active(ctx.vendor_id, farmer.id, request.period, &breakdown, now);
                tx.insert_settlement(&created).await?;
                changes.inserted(&created);
                link_items(&mut tx, ctx, &created, &breakdown, &items, &HashSet::new(), &mut changes).await?;
                created
            }
        };

        if breakdown.advance_deducted > Decimal::ZERO {
            let entry = Advance::settlement_deduction(
                ctx.vendor_id,
                farmer.id,
                settlement.id,
                breakdown.advance_deducted,
                now,
            );
            post_advance(&mut tx, &farmer, entry, &mut changes).await?;
        }

        flush_and_commit(tx, ctx, changes, now).await?;
        info!(
            settlement_id = %settlement.id,
            net_payable = %settlement.net_payable,
            advance_deducted = %settlement.advance_deducted,
            items = items.len(),
            "Settlement recalculated"
        );

        Ok(settlement)
    }

    #[instrument(skip(self, ctx), fields(vendor_id = %ctx.vendor_id))]
    pub async fn get_settlement(
        &self,
        ctx: &RequestContext,
        settlement_id: SettlementId,
    ) -> SettlementResult<SettlementDetail> {
        let mut tx = self.store.begin().await?;
        let settlement = tx
            .get_settlement(ctx.vendor_id, settlement_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Settlement", settlement_id))?;
        let items = tx.settlement_items(settlement_id).await?;
        tx.rollback().await?;
        debug!(items = items.len(), "Settlement loaded");
        Ok(SettlementDetail { settlement, items })
    }

    /// Settlements of a farmer, newest first
    #[instrument(skip(self, ctx), fields(vendor_id = %ctx.vendor_id))]
    pub async fn list_settlements(
        &self,
        ctx: &RequestContext,
        farmer_id: FarmerId,
    ) -> SettlementResult<Vec<SettlementSummary>> {
        let mut tx = self.store.begin().await?;
        get_farmer(&mut tx, ctx, farmer_id).await?;
        let settlements = tx.list_settlements(ctx.vendor_id, farmer_id).await?;
        tx.rollback().await?;
        Ok(settlements.iter().map(Settlement::summary).collect())
    }

    /// Gives an advance to a farmer or records a manual recovery
    ///
    /// # Errors
    ///
    /// - `Validation` if the amount is not positive, or a recovery exceeds
    ///   the outstanding balance
    /// - `NotFound` if the farmer does not exist for the vendor
    #[instrument(skip(self, ctx, note), fields(vendor_id = %ctx.vendor_id))]
    pub async fn record_advance(
        &self,
        ctx: &RequestContext,
        farmer_id: FarmerId,
        kind: AdvanceKind,
        amount: Decimal,
        note: Option<String>,
    ) -> SettlementResult<Advance> {
        self.retry
            .execute(|| self.record_advance_once(ctx, farmer_id, kind, amount, note.clone()))
            .await
    }

    async fn record_advance_once(
        &self,
        ctx: &RequestContext,
        farmer_id: FarmerId,
        kind: AdvanceKind,
        amount: Decimal,
        note: Option<String>,
    ) -> SettlementResult<Advance> {
        let now = Utc::now();
        let entry = Advance::manual(ctx.vendor_id, farmer_id, kind, amount, note, now)?;

        let mut tx = self.store.begin().await?;
        let farmer = lock_farmer(&mut tx, ctx, farmer_id).await?;
        if kind == AdvanceKind::Recover && -entry.amount > farmer.outstanding_advance() {
            return Err(SettlementError::validation(format!(
                "recovery of {} exceeds outstanding advance of {}",
                -entry.amount,
                farmer.outstanding_advance()
            )));
        }

        let mut changes = ChangeSet::new();
        let farmer_after = post_advance(&mut tx, &farmer, entry.clone(), &mut changes).await?;
        flush_and_commit(tx, ctx, changes, now).await?;
        info!(balance = %farmer_after.advance_total, "Advance recorded");
        Ok(entry)
    }

    #[instrument(skip(self, ctx), fields(vendor_id = %ctx.vendor_id))]
    pub async fn advance_summary(
        &self,
        ctx: &RequestContext,
        farmer_id: FarmerId,
    ) -> SettlementResult<AdvanceSummary> {
        let mut tx = self.store.begin().await?;
        let farmer = get_farmer(&mut tx, ctx, farmer_id).await?;
        let entries = tx.list_advances(ctx.vendor_id, farmer_id).await?;
        tx.rollback().await?;
        Ok(AdvanceSummary::from_entries(farmer_id, farmer.advance_total, entries))
    }

    /// Compares the cached advance balance with the ledger sum
    #[instrument(skip(self, ctx), fields(vendor_id = %ctx.vendor_id))]
    pub async fn reconcile_advances(
        &self,
        ctx: &RequestContext,
        farmer_id: FarmerId,
    ) -> SettlementResult<AdvanceReconciliation> {
        let mut tx = self.store.begin().await?;
        let farmer = get_farmer(&mut tx, ctx, farmer_id).await?;
        let entries = tx.list_advances(ctx.vendor_id, farmer_id).await?;
        tx.rollback().await?;

        let reconciliation = AdvanceReconciliation::check(farmer_id, farmer.advance_total, &entries);
        if !reconciliation.is_consistent {
            warn!(
                cached = %reconciliation.cached_total,
                ledger = %reconciliation.ledger_total,
                "Advance balance drifted from ledger"
            );
        }
        Ok(reconciliation)
    }

    /// Stores the URL of a rendered settlement document
    #[instrument(skip(self, ctx, url), fields(vendor_id = %ctx.vendor_id))]
    pub async fn record_document(
        &self,
        ctx: &RequestContext,
        settlement_id: SettlementId,
        url: &str,
    ) -> SettlementResult<()> {
        self.retry
            .execute(|| async move {
                let mut tx = self.store.begin().await?;
                let settlement = tx
                    .lock_settlement(ctx.vendor_id, settlement_id)
                    .await?
                    .ok_or_else(|| SettlementError::not_found("Settlement", settlement_id))?;

                let now = Utc::now();
                let mut updated = settlement.clone();
                updated.document_url = Some(url.to_string());
                updated.updated_at = now;
                tx.update_settlement(&updated).await?;

                let mut changes = ChangeSet::new();
                changes.updated(&settlement, &updated);
                flush_and_commit(tx, ctx, changes, now).await
            })
            .await
    }

    async fn compute(
        &self,
        tx: &mut S::Tx,
        farmer: &Farmer,
        items: &[CollectionItem],
        advance_balance: Decimal,
        deduction_cap: Option<Percentage>,
    ) -> SettlementResult<SettlementBreakdown> {
        let group = match farmer.group_id {
            Some(group_id) => tx.get_group(farmer.vendor_id, group_id).await?,
            None => None,
        };
        let commission = resolve_commission(farmer, group.as_ref());
        debug!(items = items.len(), commission = %commission.value(), "Computing settlement");

        calculate(SettlementInput {
            items,
            commission,
            advance_balance,
            deduction_cap: deduction_cap.unwrap_or(self.config.default_deduction_cap),
        })
    }

    fn statement(&self, settlement: Settlement, farmer: &Farmer, items: &[CollectionItem]) -> SettlementStatement {
        SettlementStatement {
            settlement,
            farmer_name: farmer.name.clone(),
            farmer_phone: farmer.phone.clone(),
            lines: items
                .iter()
                .map(|item| StatementLine {
                    date: item.date,
                    qty: item.qty,
                    rate: item.rate,
                    line_total: item.line_total,
                })
                .collect(),
            currency: self.config.currency,
        }
    }

    async fn dispatch(&self, ctx: &RequestContext, statement: SettlementStatement) -> Vec<DispatchWarning> {
        let Some(dispatcher) = &self.dispatcher else {
            return Vec::new();
        };

        let outcome = dispatcher.dispatch(&statement).await;
        let mut warnings = outcome.warnings;
        if let Some(document) = outcome.document {
            if let Err(e) = self.record_document(ctx, statement.settlement.id, &document.url).await {
                warn!(error = %e, "Failed to record settlement document");
                warnings.push(DispatchWarning::new(DispatchStep::RecordDocument, e.to_string()));
            }
        }
        warnings
    }
}

async fn get_farmer<T: SettlementTx>(
    tx: &mut T,
    ctx: &RequestContext,
    farmer_id: FarmerId,
) -> SettlementResult<Farmer> {
    tx.get_farmer(ctx.vendor_id, farmer_id)
        .await?
        .ok_or_else(|| SettlementError::not_found("Farmer", farmer_id))
}

async fn lock_farmer<T: SettlementTx>(
    tx: &mut T,
    ctx: &RequestContext,
    farmer_id: FarmerId,
) -> SettlementResult<Farmer> {
    tx.lock_farmer(ctx.vendor_id, farmer_id)
        .await?
        .ok_or_else(|| SettlementError::not_found("Farmer", farmer_id))
}

/// Writes an advance entry and moves the cached balance by the same amount
async fn post_advance<T: SettlementTx>(
    tx: &mut T,
    farmer: &Farmer,
    entry: Advance,
    changes: &mut ChangeSet,
) -> SettlementResult<Farmer> {
    let updated = farmer.with_advance_delta(entry.amount)?;
    tx.insert_advance(&entry).await?;
    tx.update_advance_total(farmer.vendor_id, farmer.id, updated.advance_total)
        .await?;
    changes.inserted(&entry);
    changes.updated(farmer, &updated);
    Ok(updated)
}

/// Links the breakdown's lines not yet linked and locks their items
async fn link_items<T: SettlementTx>(
    tx: &mut T,
    ctx: &RequestContext,
    settlement: &Settlement,
    breakdown: &SettlementBreakdown,
    items: &[CollectionItem],
    already_linked: &HashSet<CollectionItemId>,
    changes: &mut ChangeSet,
) -> SettlementResult<()> {
    let links: Vec<SettlementItem> = breakdown
        .lines
        .iter()
        .filter(|line| !already_linked.contains(&line.collection_item_id))
        .map(|line| SettlementItem::link(settlement.id, line))
        .collect();
    if !links.is_empty() {
        tx.insert_settlement_items(&links).await?;
        for link in &links {
            changes.inserted(link);
        }
    }

    let to_lock: Vec<CollectionItem> = items.iter().filter(|i| !i.is_locked).cloned().collect();
    set_locks(tx, ctx, &to_lock, true, changes).await
}

async fn set_locks<T: SettlementTx>(
    tx: &mut T,
    ctx: &RequestContext,
    items: &[CollectionItem],
    locked: bool,
    changes: &mut ChangeSet,
) -> SettlementResult<()> {
    if items.is_empty() {
        return Ok(());
    }
    let ids: Vec<CollectionItemId> = items.iter().map(|i| i.id).collect();
    tx.set_items_locked(ctx.vendor_id, &ids, locked).await?;
    for item in items {
        changes.updated(item, &item.with_lock(locked));
    }
    Ok(())
}

async fn flush_and_commit<T: SettlementTx>(
    mut tx: T,
    ctx: &RequestContext,
    changes: ChangeSet,
    at: DateTime<Utc>,
) -> SettlementResult<()> {
    let records = changes.into_audit_records(ctx.vendor_id, ctx.user_id, at);
    tx.insert_audit_records(&records).await?;
    tx.commit().await?;
    Ok(())
}
