//! Change-audit capture
//!
//! Settlement operations accumulate a [`ChangeSet`] while they mutate rows and
//! flush it through the same store transaction right before commit. A rollback
//! of the operation therefore rolls its audit rows back with it.
//!
//! Snapshots are plain JSON values: `before` is taken from the entity as it was
//! loaded, `after` from the entity as it is written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use core_kernel::{AuditEventId, UserId, VendorId};

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Insert => "INSERT",
            ChangeAction::Update => "UPDATE",
            ChangeAction::Delete => "DELETE",
        }
    }
}

/// Entities whose mutations are audited
pub trait Audited: Serialize {
    /// Table the entity is persisted in
    const TABLE: &'static str;

    /// Primary key of the row
    fn record_id(&self) -> Uuid;

    /// JSON snapshot of the current state
    fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A single captured change, not yet attributed to an actor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub table: &'static str,
    pub record_id: Uuid,
    pub action: ChangeAction,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// A change attributed to a tenant and user, ready to persist
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub id: AuditEventId,
    pub vendor_id: VendorId,
    pub user_id: Option<UserId>,
    pub table: &'static str,
    pub record_id: Uuid,
    pub action: ChangeAction,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub recorded_at: DateTime<Utc>,
}

/// Changes accumulated during one unit of work
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    records: Vec<ChangeRecord>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the insertion of `entity`
    pub fn inserted<T: Audited>(&mut self, entity: &T) {
        self.records.push(ChangeRecord {
            table: T::TABLE,
            record_id: entity.record_id(),
            action: ChangeAction::Insert,
            before: None,
            after: Some(entity.snapshot()),
        });
    }

    /// Records an update from `before` to `after`
    ///
    /// `before` must be snapshotted before the mutation is applied, so callers
    /// clone the loaded entity and mutate the clone.
    pub fn updated<T: Audited>(&mut self, before: &T, after: &T) {
        self.records.push(ChangeRecord {
            table: T::TABLE,
            record_id: after.record_id(),
            action: ChangeAction::Update,
            before: Some(before.snapshot()),
            after: Some(after.snapshot()),
        });
    }

    /// Records the deletion of `entity`
    pub fn deleted<T: Audited>(&mut self, entity: &T) {
        self.records.push(ChangeRecord {
            table: T::TABLE,
            record_id: entity.record_id(),
            action: ChangeAction::Delete,
            before: Some(entity.snapshot()),
            after: None,
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    /// Attributes every change to the acting tenant and user
    pub fn into_audit_records(
        self,
        vendor_id: VendorId,
        user_id: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Vec<AuditRecord> {
        self.records
            .into_iter()
            .map(|change| AuditRecord {
                id: AuditEventId::new_v7(),
                vendor_id,
                user_id,
                table: change.table,
                record_id: change.record_id,
                action: change.action,
                before: change.before,
                after: change.after,
                recorded_at: at,
            })
            .collect()
    }
}
