//! Database error types
//!
//! PostgreSQL failures are classified by SQLSTATE so the domain can tell a lost
//! race (retry the whole unit of work) from a genuine failure.

use thiserror::Error;

use core_kernel::PortError;

/// Name of the partial unique index allowing one ACTIVE settlement per key
pub const ACTIVE_SETTLEMENT_INDEX: &str = "settlements_active_key";

/// Errors that can occur during database operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Entity not found in database
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Lost a race with a concurrent transaction: serialization failure,
    /// deadlock, lock timeout or a second ACTIVE settlement for one key
    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    /// Migration error
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value does not decode into a domain value
    #[error("Decode error: {0}")]
    Decode(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl DatabaseError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Checks if the failed transaction may succeed when re-run
    pub fn is_conflict(&self) -> bool {
        matches!(self, DatabaseError::Conflict(_))
    }

    /// Classifies a PostgreSQL error by SQLSTATE and constraint name
    ///
    /// See <https://www.postgresql.org/docs/current/errcodes-appendix.html>
    pub fn from_sqlstate(code: &str, constraint: Option<&str>, message: &str) -> Self {
        let message = message.to_string();
        match code {
            // serialization_failure, deadlock_detected, lock_not_available
            "40001" | "40P01" | "55P03" => DatabaseError::Conflict(message),
            "23505" if constraint == Some(ACTIVE_SETTLEMENT_INDEX) => DatabaseError::Conflict(message),
            "23505" => DatabaseError::DuplicateEntry(message),
            "23503" => DatabaseError::ForeignKeyViolation(message),
            "23514" => DatabaseError::ConstraintViolation(message),
            "08000" | "08003" | "08006" | "57P01" => DatabaseError::ConnectionFailed(message),
            _ => DatabaseError::QueryFailed(message),
        }
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::RowNotFound => DatabaseError::not_found("Record", "unknown"),
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::Io(e) => DatabaseError::ConnectionFailed(e.to_string()),
            sqlx::Error::Database(db_err) => match db_err.code() {
                Some(code) => DatabaseError::from_sqlstate(code.as_ref(), db_err.constraint(), db_err.message()),
                None => DatabaseError::QueryFailed(db_err.message().to_string()),
            },
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => DatabaseError::Decode(error.to_string()),
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(error.to_string())
    }
}

impl From<DatabaseError> for PortError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound { entity, id } => PortError::not_found(entity, id),
            DatabaseError::Conflict(message) => PortError::conflict(message),
            DatabaseError::ConstraintViolation(message) | DatabaseError::ForeignKeyViolation(message) => {
                PortError::validation(message)
            }
            DatabaseError::ConnectionFailed(message) => PortError::unavailable(message),
            DatabaseError::PoolExhausted => PortError::unavailable("postgres connection pool exhausted"),
            other => PortError::internal(other.to_string()),
        }
    }
}
