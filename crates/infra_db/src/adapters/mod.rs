//! Domain Adapters
//!
//! Implementations of the domain ports on the PostgreSQL database layer.

pub mod settlement;

pub use settlement::{PgSettlementTx, PostgresSettlementStore};
