//! Core Kernel - Foundational types for the settlement engine
//!
//! This crate provides the building blocks shared by every other crate:
//! - Strongly-typed identifiers for tenants, farmers, collections and settlements
//! - Percentages and currency rounding on top of `rust_decimal`
//! - Inclusive date ranges used to scope settlements
//! - Port abstractions for the hexagonal architecture

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod error;
pub mod ports;

pub use money::{Currency, MoneyError, Percentage, round_currency};
pub use temporal::{DateRange, TemporalError};
pub use identifiers::{
    VendorId, UserId, FarmerId, FarmerGroupId, CollectionItemId,
    SettlementId, SettlementItemId, AdvanceId, AuditEventId,
};
pub use error::CoreError;
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
};
