//! Database Test Utilities
//!
//! Provides helpers for database testing including testcontainer management
//! and connection pooling for integration tests. The schema comes from the
//! same migrations the server runs.

use std::time::Duration;

use sqlx::PgPool;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

use infra_db::{create_pool, run_migrations, CollectionRepository, DatabaseConfig, DatabaseError, PostgresSettlementStore};

/// Default PostgreSQL image for testing
const POSTGRES_IMAGE: &str = "postgres";
const POSTGRES_TAG: &str = "16-alpine";
const POSTGRES_USER: &str = "test_user";
const POSTGRES_PASSWORD: &str = "test_password";
const POSTGRES_DB: &str = "settlement_test";

/// Tables in dependency order, children first
const TABLES: [&str; 7] = [
    "audit_log",
    "advances",
    "settlement_items",
    "settlements",
    "collection_items",
    "farmers",
    "farmer_groups",
];

/// Configuration for test database
#[derive(Debug, Clone)]
pub struct TestDatabaseConfig {
    pub user: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
}

impl Default for TestDatabaseConfig {
    fn default() -> Self {
        Self {
            user: POSTGRES_USER.to_string(),
            password: POSTGRES_PASSWORD.to_string(),
            database: POSTGRES_DB.to_string(),
            host: "localhost".to_string(),
            port: 5432,
        }
    }
}

impl TestDatabaseConfig {
    /// Creates the database connection URL
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// A wrapper around a PostgreSQL test container
pub struct TestDatabase {
    _container: ContainerAsync<GenericImage>,
    pub config: TestDatabaseConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Starts a new PostgreSQL container and applies the migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the container fails to start or a migration fails
    pub async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let container = GenericImage::new(POSTGRES_IMAGE, POSTGRES_TAG)
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr("database system is ready to accept connections"))
            .with_env_var("POSTGRES_USER", POSTGRES_USER)
            .with_env_var("POSTGRES_PASSWORD", POSTGRES_PASSWORD)
            .with_env_var("POSTGRES_DB", POSTGRES_DB)
            .start()
            .await?;

        let port = container.get_host_port_ipv4(5432).await?;
        let host = container.get_host().await?.to_string();

        let config = TestDatabaseConfig {
            host,
            port,
            ..TestDatabaseConfig::default()
        };

        // The image logs "ready" once for the init server and again for the
        // real one, so the first connect can still race the restart
        let pool = connect_with_retry(&Self::pool_config(&config)).await?;
        run_migrations(&pool).await?;

        Ok(Self {
            _container: container,
            config,
            pool,
        })
    }

    /// Returns a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Lock waits are short so contention tests fail fast
    fn pool_config(config: &TestDatabaseConfig) -> DatabaseConfig {
        DatabaseConfig::new(config.connection_url())
            .acquire_timeout(Duration::from_secs(30))
            .lock_timeout(Duration::from_millis(500))
    }

    /// Settlement store over this database
    pub fn store(&self) -> PostgresSettlementStore {
        let lock_timeout = Self::pool_config(&self.config).lock_timeout;
        PostgresSettlementStore::new(self.pool.clone()).with_lock_timeout(lock_timeout)
    }

    /// Seeding repository over this database
    pub fn collections(&self) -> CollectionRepository {
        CollectionRepository::new(self.pool.clone())
    }

    /// Clears all data from the database while preserving the schema
    pub async fn clear_data(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(&format!("TRUNCATE TABLE {} CASCADE", TABLES.join(", ")))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn connect_with_retry(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    let mut attempt = 0;
    loop {
        match create_pool(config).await {
            Ok(pool) => return Ok(pool),
            Err(_) if attempt < 10 => {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Creates an isolated test database for a single test
pub async fn create_isolated_test_database() -> Result<TestDatabase, Box<dyn std::error::Error + Send + Sync>> {
    TestDatabase::new().await
}

/// Helper macro for running database tests
///
/// Tests need Docker and are ignored by default; run them with
/// `cargo test -- --ignored`.
#[macro_export]
macro_rules! db_test {
    ($name:ident, |$db:ident| $body:block) => {
        #[tokio::test]
        #[ignore = "requires docker"]
        async fn $name() {
            let $db = $crate::database::create_isolated_test_database()
                .await
                .expect("Failed to create test database");
            $body
        }
    };
}

/// Helper trait for test assertions on database results
pub trait DatabaseTestAssertions {
    /// Asserts that a specific number of rows were affected
    fn assert_rows_affected(&self, expected: u64);
}

impl DatabaseTestAssertions for sqlx::postgres::PgQueryResult {
    fn assert_rows_affected(&self, expected: u64) {
        assert_eq!(
            self.rows_affected(),
            expected,
            "Expected {} rows affected, got {}",
            expected,
            self.rows_affected()
        );
    }
}

/// Counts rows in `table` for one vendor
pub async fn count_rows(pool: &PgPool, table: &str, vendor_id: uuid::Uuid) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table} WHERE vendor_id = $1"))
        .bind(vendor_id)
        .fetch_one(pool)
        .await
        .unwrap_or_else(|e| panic!("counting {table}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_connection_url() {
        let config = TestDatabaseConfig::default();
        let url = config.connection_url();

        assert!(url.starts_with("postgres://"));
        assert!(url.contains(POSTGRES_USER));
        assert!(url.ends_with(POSTGRES_DB));
    }

    #[test]
    fn test_tables_clear_children_first() {
        let position = |t: &str| TABLES.iter().position(|x| *x == t).unwrap();
        assert!(position("settlement_items") < position("settlements"));
        assert!(position("settlements") < position("farmers"));
        assert!(position("farmers") < position("farmer_groups"));
    }
}
