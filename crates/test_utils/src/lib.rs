//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! settlement engine test suite.
//!
//! # Modules
//!
//! - `fixtures`: Fixed dates, rates and caller contexts
//! - `builders`: Builder patterns for farmers, groups and collection items
//! - `memory`: Service harness over the in-memory store
//! - `database`: Database test helpers and container management
//! - `assertions`: Custom assertion helpers for settlement figures
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod memory;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use memory::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
