//! Database integration
//!
//! `Database` wraps a sqlx `AnyPool` so one binary can talk to PostgreSQL,
//! MySQL and SQLite. The engine only needs two narrow capabilities from it:
//! running reversal statements ([`SchemaExecutor`]) and reading catalog rows
//! ([`SchemaCatalog`]).

use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use sqlx::Row;
use std::fmt;

use crate::error::{SmartMigrationError, SmartResult};

/// Relational backend, keyed by driver name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Backend {
    Postgres,
    MySql,
    Sqlite,
    /// Any other driver; catalog inspection is not available
    Unsupported(String),
}

impl Backend {
    /// Map a driver name (`pgsql`, `mysql`, `sqlite`, ...) to a backend
    pub fn from_driver_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "pgsql" | "postgres" | "postgresql" => Backend::Postgres,
            "mysql" | "mariadb" => Backend::MySql,
            "sqlite" | "sqlite3" => Backend::Sqlite,
            other => Backend::Unsupported(other.to_string()),
        }
    }

    /// Backend from a connection URL scheme
    pub fn from_url(url: &str) -> Self {
        let scheme = url.split(':').next().unwrap_or_default();
        Self::from_driver_name(scheme)
    }

    /// Canonical driver name
    pub fn driver_name(&self) -> &str {
        match self {
            Backend::Postgres => "pgsql",
            Backend::MySql => "mysql",
            Backend::Sqlite => "sqlite",
            Backend::Unsupported(name) => name,
        }
    }

    /// Positional bind placeholder, 1-based
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Backend::Postgres => format!("${}", index),
            _ => "?".to_string(),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.driver_name())
    }
}

/// Executes reversal statements against the live schema
#[async_trait]
pub trait SchemaExecutor: Send + Sync {
    /// Backend the statements will run on
    fn backend(&self) -> Backend;

    /// Execute statements in order, inside one transaction where the backend allows it
    async fn execute_statements(&self, statements: &[String]) -> SmartResult<()>;
}

/// Read-only catalog access for foreign-key introspection
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    fn backend(&self) -> Backend;

    /// Run a catalog query and return every column as optional text
    async fn fetch_rows(
        &self,
        sql: &str,
        binds: &[String],
    ) -> SmartResult<Vec<Vec<Option<String>>>>;
}

/// Schema executor used when no database is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedSchema;

#[async_trait]
impl SchemaExecutor for DetachedSchema {
    fn backend(&self) -> Backend {
        Backend::Unsupported("detached".to_string())
    }

    async fn execute_statements(&self, _statements: &[String]) -> SmartResult<()> {
        Err(SmartMigrationError::Database(
            "No database connection is attached to run reversal statements".to_string(),
        ))
    }
}

/// Connection pool plus the backend it talks to
#[derive(Debug, Clone)]
pub struct Database {
    pool: AnyPool,
    backend: Backend,
}

impl Database {
    /// Connect to `url`, installing the sqlx Any drivers on first use
    pub async fn connect(url: &str) -> SmartResult<Self> {
        sqlx::any::install_default_drivers();
        let backend = Backend::from_url(url);

        let options = if backend == Backend::Sqlite && url.contains(":memory:") {
            // every pooled connection to :memory: is a distinct database
            AnyPoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            AnyPoolOptions::new().max_connections(5)
        };

        let pool = options
            .connect(url)
            .await
            .map_err(|e| {
                SmartMigrationError::Database(format!("Failed to connect to database: {}", e))
            })?;

        tracing::debug!(backend = %backend, "database pool ready");
        Ok(Self { pool, backend })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: AnyPool, backend: Backend) -> Self {
        Self { pool, backend }
    }

    /// Get the database pool
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Close the pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SchemaExecutor for Database {
    fn backend(&self) -> Backend {
        self.backend.clone()
    }

    async fn execute_statements(&self, statements: &[String]) -> SmartResult<()> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|e| {
                SmartMigrationError::Database(format!(
                    "Failed to start rollback transaction: {}",
                    e
                ))
            })?;

        for statement in statements {
            if statement.trim().is_empty() {
                continue;
            }
            sqlx::query(statement)
                .execute(&mut *transaction)
                .await
                .map_err(|e| {
                    SmartMigrationError::Database(format!(
                        "Failed to execute '{}': {}",
                        statement, e
                    ))
                })?;
        }

        transaction
            .commit()
            .await
            .map_err(|e| {
                SmartMigrationError::Database(format!("Failed to commit rollback: {}", e))
            })?;
        Ok(())
    }
}

#[async_trait]
impl SchemaCatalog for Database {
    fn backend(&self) -> Backend {
        self.backend.clone()
    }

    async fn fetch_rows(
        &self,
        sql: &str,
        binds: &[String],
    ) -> SmartResult<Vec<Vec<Option<String>>>> {
        let mut query = sqlx::query(sql);
        for bind in binds {
            query = query.bind(bind.clone());
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let mut columns = Vec::with_capacity(row.len());
            for index in 0..row.len() {
                columns.push(row.try_get::<Option<String>, _>(index)?);
            }
            result.push(columns);
        }
        Ok(result)
    }
}
