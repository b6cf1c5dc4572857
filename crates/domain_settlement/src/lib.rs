//! Settlement Domain - Farmer settlement and advance reconciliation
//!
//! This crate settles a farmer's collections for a date range:
//! - Aggregates unsettled collection items into a settlement
//! - Resolves commission and applies the capped advance deduction
//! - Locks the consumed items and keeps the advance ledger in step
//! - Voids and recalculates settlements without double counting
//! - Captures before/after audit records inside the same unit of work
//!
//! # Architecture
//!
//! [`SettlementService`] drives everything through the [`SettlementStore`]
//! port. The pure parts ([`calculate`], [`resolve_commission`]) have no I/O
//! and are tested in isolation; document and SMS dispatch run only after
//! commit and never fail a settlement.

pub mod advance;
pub mod audit;
pub mod calculator;
pub mod collection;
pub mod commission;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod farmer;
pub mod ports;
pub mod retry;
pub mod service;
pub mod settlement;

pub use advance::{Advance, AdvanceKind, AdvanceReconciliation, AdvanceSummary};
pub use audit::{AuditRecord, Audited, ChangeAction, ChangeRecord, ChangeSet};
pub use calculator::{calculate, LineSnapshot, SettlementBreakdown, SettlementInput};
pub use collection::{CollectionItem, NewCollectionItem};
pub use commission::resolve_commission;
pub use config::SettlementConfig;
pub use dispatch::{
    settlement_message, DispatchStep, DispatchWarning, Dispatcher, DocumentRef, FarmerNotifier,
    FileStatementRenderer, LogNotifier, Notification, SettlementStatement, StatementLine,
    StatementRenderer,
};
pub use error::{DispatchError, SettlementError};
pub use farmer::{Farmer, FarmerGroup};
pub use ports::{ItemScope, SettlementStore, SettlementTx};
pub use retry::RetryPolicy;
pub use service::{
    RequestContext, SettlementDetail, SettlementReceipt, SettlementRequest, SettlementResult,
    SettlementService,
};
pub use settlement::{Settlement, SettlementItem, SettlementStatus, SettlementSummary};

#[cfg(any(test, feature = "mock"))]
pub use ports::mock::{MemorySettlementStore, MemoryTx};
