//! Settlement, advance ledger and audit log persistence
//!
//! All functions run on a caller-provided connection, normally the open
//! transaction of a [`PgSettlementTx`](crate::adapters::PgSettlementTx).
//! Batch inserts go through `QueryBuilder::push_values`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use core_kernel::{
    AdvanceId, CollectionItemId, DateRange, FarmerId, Percentage, SettlementId, SettlementItemId,
    VendorId,
};
use domain_settlement::{Advance, AuditRecord, Settlement, SettlementItem, SettlementStatus};

use crate::error::DatabaseError;

const SETTLEMENT_COLUMNS: &str = "id, vendor_id, farmer_id, date_from, date_to, total_qty, \
     gross_amount, total_labour, total_coolie, total_transport, commission_percent, \
     total_commission, advance_deducted, net_payable, status, voided_at, void_reason, \
     document_url, created_at, updated_at";

/// Row of the `settlements` table
#[derive(Debug, Clone, FromRow)]
pub struct SettlementRow {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub farmer_id: Uuid,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub total_qty: Decimal,
    pub gross_amount: Decimal,
    pub total_labour: Decimal,
    pub total_coolie: Decimal,
    pub total_transport: Decimal,
    pub commission_percent: Decimal,
    pub total_commission: Decimal,
    pub advance_deducted: Decimal,
    pub net_payable: Decimal,
    pub status: String,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
    pub document_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SettlementRow> for Settlement {
    type Error = DatabaseError;

    fn try_from(row: SettlementRow) -> Result<Self, Self::Error> {
        let period = DateRange::new(row.date_from, row.date_to)
            .map_err(|e| DatabaseError::Decode(e.to_string()))?;
        let commission_percent =
            Percentage::new(row.commission_percent).map_err(|e| DatabaseError::Decode(e.to_string()))?;
        let status = row
            .status
            .parse::<SettlementStatus>()
            .map_err(|e| DatabaseError::Decode(e.to_string()))?;

        Ok(Settlement {
            id: SettlementId::from_uuid(row.id),
            vendor_id: VendorId::from_uuid(row.vendor_id),
            farmer_id: FarmerId::from_uuid(row.farmer_id),
            period,
            total_qty: row.total_qty,
            gross_amount: row.gross_amount,
            total_labour: row.total_labour,
            total_coolie: row.total_coolie,
            total_transport: row.total_transport,
            commission_percent,
            total_commission: row.total_commission,
            advance_deducted: row.advance_deducted,
            net_payable: row.net_payable,
            status,
            voided_at: row.voided_at,
            void_reason: row.void_reason,
            document_url: row.document_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Row of the `settlement_items` table
#[derive(Debug, Clone, FromRow)]
pub struct SettlementItemRow {
    pub id: Uuid,
    pub settlement_id: Uuid,
    pub collection_item_id: Uuid,
    pub line_total: Decimal,
}

impl From<SettlementItemRow> for SettlementItem {
    fn from(row: SettlementItemRow) -> Self {
        SettlementItem {
            id: SettlementItemId::from_uuid(row.id),
            settlement_id: SettlementId::from_uuid(row.settlement_id),
            collection_item_id: CollectionItemId::from_uuid(row.collection_item_id),
            line_total: row.line_total,
        }
    }
}

/// Row of the `advances` table
#[derive(Debug, Clone, FromRow)]
pub struct AdvanceRow {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub farmer_id: Uuid,
    pub amount: Decimal,
    pub note: Option<String>,
    pub settlement_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<AdvanceRow> for Advance {
    fn from(row: AdvanceRow) -> Self {
        Advance {
            id: AdvanceId::from_uuid(row.id),
            vendor_id: VendorId::from_uuid(row.vendor_id),
            farmer_id: FarmerId::from_uuid(row.farmer_id),
            amount: row.amount,
            note: row.note,
            settlement_id: row.settlement_id.map(SettlementId::from_uuid),
            created_at: row.created_at,
        }
    }
}

// Settlements

pub async fn fetch_settlement(
    conn: &mut PgConnection,
    vendor_id: VendorId,
    settlement_id: SettlementId,
    for_update: bool,
) -> Result<Option<Settlement>, DatabaseError> {
    let sql = format!(
        "SELECT {SETTLEMENT_COLUMNS} FROM settlements WHERE vendor_id = $1 AND id = $2{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, SettlementRow>(&sql)
        .bind(vendor_id.as_uuid())
        .bind(settlement_id.as_uuid())
        .fetch_optional(conn)
        .await?
        .map(Settlement::try_from)
        .transpose()
}

pub async fn lock_active_settlement(
    conn: &mut PgConnection,
    vendor_id: VendorId,
    farmer_id: FarmerId,
    period: &DateRange,
) -> Result<Option<Settlement>, DatabaseError> {
    let sql = format!(
        "SELECT {SETTLEMENT_COLUMNS} FROM settlements \
         WHERE vendor_id = $1 AND farmer_id = $2 AND date_from = $3 AND date_to = $4 \
           AND status = 'ACTIVE' \
         FOR UPDATE"
    );
    sqlx::query_as::<_, SettlementRow>(&sql)
        .bind(vendor_id.as_uuid())
        .bind(farmer_id.as_uuid())
        .bind(period.date_from())
        .bind(period.date_to())
        .fetch_optional(conn)
        .await?
        .map(Settlement::try_from)
        .transpose()
}

/// Settlements of a farmer, newest first
pub async fn list_settlements(
    conn: &mut PgConnection,
    vendor_id: VendorId,
    farmer_id: FarmerId,
) -> Result<Vec<Settlement>, DatabaseError> {
    let sql = format!(
        "SELECT {SETTLEMENT_COLUMNS} FROM settlements \
         WHERE vendor_id = $1 AND farmer_id = $2 \
         ORDER BY created_at DESC, id DESC"
    );
    sqlx::query_as::<_, SettlementRow>(&sql)
        .bind(vendor_id.as_uuid())
        .bind(farmer_id.as_uuid())
        .fetch_all(conn)
        .await?
        .into_iter()
        .map(Settlement::try_from)
        .collect()
}

pub async fn insert_settlement(conn: &mut PgConnection, s: &Settlement) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO settlements (
            id, vendor_id, farmer_id, date_from, date_to, total_qty, gross_amount,
            total_labour, total_coolie, total_transport, commission_percent,
            total_commission, advance_deducted, net_payable, status, voided_at,
            void_reason, document_url, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
        "#,
    )
    .bind(s.id.as_uuid())
    .bind(s.vendor_id.as_uuid())
    .bind(s.farmer_id.as_uuid())
    .bind(s.period.date_from())
    .bind(s.period.date_to())
    .bind(s.total_qty)
    .bind(s.gross_amount)
    .bind(s.total_labour)
    .bind(s.total_coolie)
    .bind(s.total_transport)
    .bind(s.commission_percent.value())
    .bind(s.total_commission)
    .bind(s.advance_deducted)
    .bind(s.net_payable)
    .bind(s.status.as_str())
    .bind(s.voided_at)
    .bind(&s.void_reason)
    .bind(&s.document_url)
    .bind(s.created_at)
    .bind(s.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Writes every mutable column of an existing settlement
pub async fn update_settlement(conn: &mut PgConnection, s: &Settlement) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE settlements SET
            total_qty = $3,
            gross_amount = $4,
            total_labour = $5,
            total_coolie = $6,
            total_transport = $7,
            commission_percent = $8,
            total_commission = $9,
            advance_deducted = $10,
            net_payable = $11,
            status = $12,
            voided_at = $13,
            void_reason = $14,
            document_url = $15,
            updated_at = $16
        WHERE vendor_id = $1 AND id = $2
        "#,
    )
    .bind(s.vendor_id.as_uuid())
    .bind(s.id.as_uuid())
    .bind(s.total_qty)
    .bind(s.gross_amount)
    .bind(s.total_labour)
    .bind(s.total_coolie)
    .bind(s.total_transport)
    .bind(s.commission_percent.value())
    .bind(s.total_commission)
    .bind(s.advance_deducted)
    .bind(s.net_payable)
    .bind(s.status.as_str())
    .bind(s.voided_at)
    .bind(&s.void_reason)
    .bind(&s.document_url)
    .bind(s.updated_at)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("Settlement", s.id));
    }
    Ok(())
}

// Settlement items

pub async fn list_settlement_items(
    conn: &mut PgConnection,
    settlement_id: SettlementId,
) -> Result<Vec<SettlementItem>, DatabaseError> {
    let rows = sqlx::query_as::<_, SettlementItemRow>(
        "SELECT id, settlement_id, collection_item_id, line_total FROM settlement_items WHERE settlement_id = $1",
    )
    .bind(settlement_id.as_uuid())
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(SettlementItem::from).collect())
}

pub async fn insert_settlement_items(
    conn: &mut PgConnection,
    items: &[SettlementItem],
) -> Result<(), DatabaseError> {
    if items.is_empty() {
        return Ok(());
    }
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO settlement_items (id, settlement_id, collection_item_id, line_total) ");
    builder.push_values(items, |mut row, item| {
        row.push_bind(*item.id.as_uuid())
            .push_bind(*item.settlement_id.as_uuid())
            .push_bind(*item.collection_item_id.as_uuid())
            .push_bind(item.line_total);
    });
    builder.build().execute(conn).await?;
    Ok(())
}

// Advances

pub async fn insert_advance(conn: &mut PgConnection, advance: &Advance) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO advances (id, vendor_id, farmer_id, amount, note, settlement_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(advance.id.as_uuid())
    .bind(advance.vendor_id.as_uuid())
    .bind(advance.farmer_id.as_uuid())
    .bind(advance.amount)
    .bind(&advance.note)
    .bind(advance.settlement_id.map(|id| *id.as_uuid()))
    .bind(advance.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Ledger entries of a farmer in posting order
pub async fn list_advances(
    conn: &mut PgConnection,
    vendor_id: VendorId,
    farmer_id: FarmerId,
) -> Result<Vec<Advance>, DatabaseError> {
    let rows = sqlx::query_as::<_, AdvanceRow>(
        r#"
        SELECT id, vendor_id, farmer_id, amount, note, settlement_id, created_at
        FROM advances
        WHERE vendor_id = $1 AND farmer_id = $2
        ORDER BY created_at, id
        "#,
    )
    .bind(vendor_id.as_uuid())
    .bind(farmer_id.as_uuid())
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(Advance::from).collect())
}

// Audit log

pub async fn insert_audit_records(
    conn: &mut PgConnection,
    records: &[AuditRecord],
) -> Result<(), DatabaseError> {
    if records.is_empty() {
        return Ok(());
    }
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO audit_log (id, vendor_id, user_id, table_name, record_id, action, before_data, after_data, recorded_at) ",
    );
    builder.push_values(records, |mut row, record| {
        row.push_bind(*record.id.as_uuid())
            .push_bind(*record.vendor_id.as_uuid())
            .push_bind(record.user_id.map(|id| *id.as_uuid()))
            .push_bind(record.table)
            .push_bind(record.record_id)
            .push_bind(record.action.as_str())
            .push_bind(record.before.clone())
            .push_bind(record.after.clone())
            .push_bind(record.recorded_at);
    });
    builder.build().execute(conn).await?;
    Ok(())
}
