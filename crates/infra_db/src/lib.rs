//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the settlement engine using SQLx.
//!
//! # Architecture
//!
//! - [`repositories`] hold row types and SQL, one module per area of the
//!   schema. Query functions take a connection so they compose inside a
//!   single transaction.
//! - [`adapters`] implement the domain ports on top of the repositories.
//! - [`error`] classifies PostgreSQL failures; lost lock races surface as
//!   retryable conflicts.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{run_migrations, DatabaseConfig, PostgresSettlementStore};
//!
//! let store = PostgresSettlementStore::connect(&DatabaseConfig::new("postgres://localhost/harvest")).await?;
//! run_migrations(store.pool()).await?;
//! ```

pub mod adapters;
pub mod error;
pub mod pool;
pub mod repositories;

pub use adapters::{PgSettlementTx, PostgresSettlementStore};
pub use error::DatabaseError;
pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use repositories::CollectionRepository;
