//! Farmer and collection ledger persistence
//!
//! Query functions take a `&mut PgConnection` so the settlement adapter can run
//! them inside its open transaction. [`CollectionRepository`] wraps the same
//! queries with a pool for the collection-entry side (seeding farmers, entering
//! and removing collection items).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{
    CollectionItemId, FarmerGroupId, FarmerId, Percentage, PortError, VendorId,
};
use domain_settlement::{CollectionItem, Farmer, FarmerGroup, SettlementError};

use crate::error::DatabaseError;

const FARMER_COLUMNS: &str =
    "id, vendor_id, group_id, name, phone, commission_percent, advance_total, created_at";

const ITEM_COLUMNS: &str = "id, vendor_id, farmer_id, group_id, date, qty, rate, labour_cost, \
     coolie_cost, transport_cost, line_total, is_locked, created_at";

/// Row of the `farmers` table
#[derive(Debug, Clone, FromRow)]
pub struct FarmerRow {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub group_id: Option<Uuid>,
    pub name: String,
    pub phone: Option<String>,
    pub commission_percent: Option<Decimal>,
    pub advance_total: Decimal,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<FarmerRow> for Farmer {
    type Error = DatabaseError;

    fn try_from(row: FarmerRow) -> Result<Self, Self::Error> {
        Ok(Farmer {
            id: FarmerId::from_uuid(row.id),
            vendor_id: VendorId::from_uuid(row.vendor_id),
            group_id: row.group_id.map(FarmerGroupId::from_uuid),
            name: row.name,
            phone: row.phone,
            commission_percent: decode_percentage(row.commission_percent)?,
            advance_total: row.advance_total,
            created_at: row.created_at,
        })
    }
}

/// Row of the `farmer_groups` table
#[derive(Debug, Clone, FromRow)]
pub struct FarmerGroupRow {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    pub commission_percent: Option<Decimal>,
}

impl TryFrom<FarmerGroupRow> for FarmerGroup {
    type Error = DatabaseError;

    fn try_from(row: FarmerGroupRow) -> Result<Self, Self::Error> {
        Ok(FarmerGroup {
            id: FarmerGroupId::from_uuid(row.id),
            vendor_id: VendorId::from_uuid(row.vendor_id),
            name: row.name,
            commission_percent: decode_percentage(row.commission_percent)?,
        })
    }
}

/// Row of the `collection_items` table
#[derive(Debug, Clone, FromRow)]
pub struct CollectionItemRow {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub farmer_id: Uuid,
    pub group_id: Option<Uuid>,
    pub date: NaiveDate,
    pub qty: Decimal,
    pub rate: Decimal,
    pub labour_cost: Decimal,
    pub coolie_cost: Decimal,
    pub transport_cost: Decimal,
    pub line_total: Decimal,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
}

impl From<CollectionItemRow> for CollectionItem {
    fn from(row: CollectionItemRow) -> Self {
        CollectionItem {
            id: CollectionItemId::from_uuid(row.id),
            vendor_id: VendorId::from_uuid(row.vendor_id),
            farmer_id: FarmerId::from_uuid(row.farmer_id),
            group_id: row.group_id.map(FarmerGroupId::from_uuid),
            date: row.date,
            qty: row.qty,
            rate: row.rate,
            labour_cost: row.labour_cost,
            coolie_cost: row.coolie_cost,
            transport_cost: row.transport_cost,
            line_total: row.line_total,
            is_locked: row.is_locked,
            created_at: row.created_at,
        }
    }
}

pub(crate) fn decode_percentage(value: Option<Decimal>) -> Result<Option<Percentage>, DatabaseError> {
    value
        .map(|v| Percentage::new(v).map_err(|e| DatabaseError::Decode(e.to_string())))
        .transpose()
}

fn item_uuids(ids: &[CollectionItemId]) -> Vec<Uuid> {
    ids.iter().map(|id| *id.as_uuid()).collect()
}

// Farmers

pub async fn fetch_farmer(
    conn: &mut PgConnection,
    vendor_id: VendorId,
    farmer_id: FarmerId,
    for_update: bool,
) -> Result<Option<Farmer>, DatabaseError> {
    let sql = format!(
        "SELECT {FARMER_COLUMNS} FROM farmers WHERE vendor_id = $1 AND id = $2{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, FarmerRow>(&sql)
        .bind(vendor_id.as_uuid())
        .bind(farmer_id.as_uuid())
        .fetch_optional(conn)
        .await?
        .map(Farmer::try_from)
        .transpose()
}

pub async fn fetch_group(
    conn: &mut PgConnection,
    vendor_id: VendorId,
    group_id: FarmerGroupId,
) -> Result<Option<FarmerGroup>, DatabaseError> {
    sqlx::query_as::<_, FarmerGroupRow>(
        "SELECT id, vendor_id, name, commission_percent FROM farmer_groups WHERE vendor_id = $1 AND id = $2",
    )
    .bind(vendor_id.as_uuid())
    .bind(group_id.as_uuid())
    .fetch_optional(conn)
    .await?
    .map(FarmerGroup::try_from)
    .transpose()
}

pub async fn update_advance_total(
    conn: &mut PgConnection,
    vendor_id: VendorId,
    farmer_id: FarmerId,
    advance_total: Decimal,
) -> Result<(), DatabaseError> {
    let result = sqlx::query("UPDATE farmers SET advance_total = $3 WHERE vendor_id = $1 AND id = $2")
        .bind(vendor_id.as_uuid())
        .bind(farmer_id.as_uuid())
        .bind(advance_total)
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("Farmer", farmer_id));
    }
    Ok(())
}

// Collection items

/// Locks the farmer's items in `[date_from, date_to]`
///
/// With `linked_to` set, items already linked to that settlement are taken
/// whether or not they are locked; otherwise only unlocked items are.
pub async fn lock_items_in_range(
    conn: &mut PgConnection,
    vendor_id: VendorId,
    farmer_id: FarmerId,
    date_from: NaiveDate,
    date_to: NaiveDate,
    linked_to: Option<Uuid>,
) -> Result<Vec<CollectionItem>, DatabaseError> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM collection_items \
         WHERE vendor_id = $1 AND farmer_id = $2 AND date BETWEEN $3 AND $4 \
           AND (is_locked = FALSE \
                OR id IN (SELECT collection_item_id FROM settlement_items WHERE settlement_id = $5)) \
         ORDER BY date, id \
         FOR UPDATE"
    );
    let rows = sqlx::query_as::<_, CollectionItemRow>(&sql)
        .bind(vendor_id.as_uuid())
        .bind(farmer_id.as_uuid())
        .bind(date_from)
        .bind(date_to)
        .bind(linked_to)
        .fetch_all(conn)
        .await?;

    Ok(rows.into_iter().map(CollectionItem::from).collect())
}

pub async fn lock_items_by_id(
    conn: &mut PgConnection,
    vendor_id: VendorId,
    ids: &[CollectionItemId],
) -> Result<Vec<CollectionItem>, DatabaseError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM collection_items \
         WHERE vendor_id = $1 AND id = ANY($2) \
         ORDER BY date, id \
         FOR UPDATE"
    );
    let rows = sqlx::query_as::<_, CollectionItemRow>(&sql)
        .bind(vendor_id.as_uuid())
        .bind(item_uuids(ids))
        .fetch_all(conn)
        .await?;

    Ok(rows.into_iter().map(CollectionItem::from).collect())
}

pub async fn set_items_locked(
    conn: &mut PgConnection,
    vendor_id: VendorId,
    ids: &[CollectionItemId],
    locked: bool,
) -> Result<(), DatabaseError> {
    if ids.is_empty() {
        return Ok(());
    }
    let result = sqlx::query("UPDATE collection_items SET is_locked = $3 WHERE vendor_id = $1 AND id = ANY($2)")
        .bind(vendor_id.as_uuid())
        .bind(item_uuids(ids))
        .bind(locked)
        .execute(conn)
        .await?;

    if result.rows_affected() != ids.len() as u64 {
        return Err(DatabaseError::not_found(
            "CollectionItem",
            format!("{} of {} ids", ids.len() as u64 - result.rows_affected(), ids.len()),
        ));
    }
    Ok(())
}

/// Repository for the collection-entry side of the ledger
#[derive(Debug, Clone)]
pub struct CollectionRepository {
    pool: PgPool,
}

impl CollectionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, group), fields(group_id = %group.id))]
    pub async fn insert_group(&self, group: &FarmerGroup) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO farmer_groups (id, vendor_id, name, commission_percent) VALUES ($1, $2, $3, $4)")
            .bind(group.id.as_uuid())
            .bind(group.vendor_id.as_uuid())
            .bind(&group.name)
            .bind(group.commission_percent.map(|p| p.value()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, farmer), fields(farmer_id = %farmer.id))]
    pub async fn insert_farmer(&self, farmer: &Farmer) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO farmers (id, vendor_id, group_id, name, phone, commission_percent, advance_total, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(farmer.id.as_uuid())
        .bind(farmer.vendor_id.as_uuid())
        .bind(farmer.group_id.map(|id| *id.as_uuid()))
        .bind(&farmer.name)
        .bind(&farmer.phone)
        .bind(farmer.commission_percent.map(|p| p.value()))
        .bind(farmer.advance_total)
        .bind(farmer.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_farmer(&self, vendor_id: VendorId, farmer_id: FarmerId) -> Result<Farmer, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        fetch_farmer(&mut *conn, vendor_id, farmer_id, false)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Farmer", farmer_id))
    }

    #[instrument(skip(self, item), fields(item_id = %item.id, farmer_id = %item.farmer_id))]
    pub async fn insert_collection_item(&self, item: &CollectionItem) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO collection_items (
                id, vendor_id, farmer_id, group_id, date, qty, rate, labour_cost,
                coolie_cost, transport_cost, line_total, is_locked, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.vendor_id.as_uuid())
        .bind(item.farmer_id.as_uuid())
        .bind(item.group_id.map(|id| *id.as_uuid()))
        .bind(item.date)
        .bind(item.qty)
        .bind(item.rate)
        .bind(item.labour_cost)
        .bind(item.coolie_cost)
        .bind(item.transport_cost)
        .bind(item.line_total)
        .bind(item.is_locked)
        .bind(item.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_collection_item(
        &self,
        vendor_id: VendorId,
        item_id: CollectionItemId,
    ) -> Result<CollectionItem, DatabaseError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM collection_items WHERE vendor_id = $1 AND id = $2");
        sqlx::query_as::<_, CollectionItemRow>(&sql)
            .bind(vendor_id.as_uuid())
            .bind(item_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(CollectionItem::from)
            .ok_or_else(|| DatabaseError::not_found("CollectionItem", item_id))
    }

    /// Deletes an item unless a settlement holds it
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` for a locked item and `NotFound` for an unknown one.
    #[instrument(skip(self))]
    pub async fn delete_collection_item(
        &self,
        vendor_id: VendorId,
        item_id: CollectionItemId,
    ) -> Result<(), SettlementError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let item = lock_items_by_id(&mut *tx, vendor_id, &[item_id])
            .await
            .map_err(storage)?
            .into_iter()
            .next()
            .ok_or_else(|| SettlementError::not_found("CollectionItem", item_id))?;
        item.ensure_editable()?;

        sqlx::query("DELETE FROM collection_items WHERE vendor_id = $1 AND id = $2")
            .bind(vendor_id.as_uuid())
            .bind(item_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        tx.commit().await.map_err(storage)?;

        debug!("Collection item deleted");
        Ok(())
    }
}

fn storage(error: impl Into<DatabaseError>) -> SettlementError {
    let error: DatabaseError = error.into();
    PortError::from(error).into()
}
