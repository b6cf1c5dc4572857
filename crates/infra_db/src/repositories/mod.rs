//! Row types and SQL for each area of the schema
//!
//! Queries are built at runtime with `sqlx::query_as` and `#[derive(FromRow)]`
//! rows, so the crate compiles without a live database. Rows are converted to
//! domain types at this boundary; values the domain would reject (an
//! out-of-range percentage, an unknown status) fail as `DatabaseError::Decode`.

pub mod collection;
pub mod settlement;

pub use collection::CollectionRepository;
