//! Test utilities for database and Redis backed tests.
//!
//! Infrastructure tests are `#[ignore]`d by default and read their targets
//! from `TEST_DB_*` and `TEST_REDIS_*` environment variables.

use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr, Statement};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::migrations::Migrator;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_port(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(default)
}

/// Test database configuration.
#[derive(Debug, Clone)]
pub struct TestDbConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database username.
    pub username: String,
    /// Database password.
    pub password: String,
    /// Database name.
    pub database: String,
}

impl Default for TestDbConfig {
    fn default() -> Self {
        Self {
            host: env_or("TEST_DB_HOST", "localhost"),
            port: env_port("TEST_DB_PORT", 5433),
            username: env_or("TEST_DB_USER", "seventv_test"),
            password: env_or("TEST_DB_PASSWORD", "seventv_test"),
            database: env_or("TEST_DB_NAME", "seventv_test"),
        }
    }
}

impl TestDbConfig {
    /// Connection URL of the test database.
    #[must_use]
    pub fn database_url(&self) -> String {
        self.url_for(&self.database)
    }

    /// Connection URL of the maintenance database, used to create and drop
    /// scratch databases.
    #[must_use]
    pub fn postgres_url(&self) -> String {
        self.url_for("postgres")
    }

    fn url_for(&self, database: &str) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{database}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// A migrated test database.
pub struct TestDatabase {
    /// Database connection.
    pub conn: DatabaseConnection,
    /// Database configuration.
    pub config: TestDbConfig,
    scratch: bool,
}

impl TestDatabase {
    /// Connect to the configured test database and apply migrations.
    pub async fn new() -> Result<Self, DbErr> {
        let config = TestDbConfig::default();
        let conn = Database::connect(&config.database_url()).await?;
        Migrator::up(&conn, None).await?;

        info!(database = %config.database, "Connected to test database");

        Ok(Self {
            conn,
            config,
            scratch: false,
        })
    }

    /// Create a scratch database with a unique name so tests can run in
    /// parallel, then apply migrations to it.
    pub async fn scratch() -> Result<Self, DbErr> {
        let mut config = TestDbConfig::default();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        config.database = format!("seventv_test_{}", &suffix[..8]);

        let admin = Database::connect(&config.postgres_url()).await?;
        admin
            .execute(Statement::from_string(
                DatabaseBackend::Postgres,
                format!("CREATE DATABASE \"{}\"", config.database),
            ))
            .await?;
        admin.close().await?;

        let conn = Database::connect(&config.database_url()).await?;
        Migrator::up(&conn, None).await?;

        info!(database = %config.database, "Created scratch database");

        Ok(Self {
            conn,
            config,
            scratch: true,
        })
    }

    /// Get the database connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Truncate every table except the migration ledger.
    pub async fn truncate(&self) -> Result<(), DbErr> {
        let tables = self
            .conn
            .query_all(Statement::from_string(
                DatabaseBackend::Postgres,
                "SELECT tablename FROM pg_tables WHERE schemaname = 'public'".to_string(),
            ))
            .await?;

        for row in tables {
            let Ok(table) = row.try_get::<String>("", "tablename") else {
                continue;
            };
            if table == "seaql_migrations" {
                continue;
            }
            self.conn
                .execute(Statement::from_string(
                    DatabaseBackend::Postgres,
                    format!("TRUNCATE TABLE \"{table}\" CASCADE"),
                ))
                .await?;
        }

        Ok(())
    }

    /// Tear down: scratch databases are dropped, the shared one is truncated.
    pub async fn teardown(self) -> Result<(), DbErr> {
        if !self.scratch {
            return self.truncate().await;
        }

        self.conn.close().await?;

        let admin = Database::connect(&self.config.postgres_url()).await?;
        admin
            .execute(Statement::from_string(
                DatabaseBackend::Postgres,
                format!(
                    "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{}'",
                    self.config.database
                ),
            ))
            .await
            .ok();
        admin
            .execute(Statement::from_string(
                DatabaseBackend::Postgres,
                format!("DROP DATABASE IF EXISTS \"{}\"", self.config.database),
            ))
            .await?;
        admin.close().await?;

        info!(database = %self.config.database, "Dropped scratch database");
        Ok(())
    }
}

/// Test Redis configuration.
#[derive(Debug, Clone)]
pub struct TestRedisConfig {
    /// Redis host.
    pub host: String,
    /// Redis port.
    pub port: u16,
}

impl Default for TestRedisConfig {
    fn default() -> Self {
        Self {
            host: env_or("TEST_REDIS_HOST", "localhost"),
            port: env_port("TEST_REDIS_PORT", 6380),
        }
    }
}

impl TestRedisConfig {
    /// Get the Redis URL.
    #[must_use]
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_urls() {
        let config = TestDbConfig {
            host: "db".to_string(),
            port: 5432,
            username: "u".to_string(),
            password: "p".to_string(),
            database: "seventv".to_string(),
        };
        assert_eq!(config.database_url(), "postgres://u:p@db:5432/seventv");
        assert_eq!(config.postgres_url(), "postgres://u:p@db:5432/postgres");
    }

    #[test]
    fn test_redis_config_url() {
        let config = TestRedisConfig {
            host: "localhost".to_string(),
            port: 6380,
        };
        assert_eq!(config.redis_url(), "redis://localhost:6380");
    }
}
