//! Ledger store over a live `migrations` table

use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

use super::{LedgerSchema, LedgerStore, MigrationRecord};
use crate::database::Database;
use crate::error::{SmartMigrationError, SmartResult};

/// Reads and prunes the ledger table through the shared pool.
///
/// Table and column names come from [`LedgerSchema`] and are validated as
/// plain identifiers by the configuration layer before they reach SQL.
#[derive(Debug, Clone)]
pub struct SqlLedgerStore {
    db: Arc<Database>,
    schema: LedgerSchema,
}

impl SqlLedgerStore {
    pub fn new(db: Arc<Database>, schema: LedgerSchema) -> Self {
        Self { db, schema }
    }

    pub fn schema(&self) -> &LedgerSchema {
        &self.schema
    }

    /// SQL to read every record in ledger order
    fn all_records_sql(&self) -> String {
        format!(
            "SELECT {id}, {batch} FROM {table} ORDER BY {batch} ASC, {id} ASC",
            id = self.schema.identifier_column,
            batch = self.schema.batch_column,
            table = self.schema.table,
        )
    }

    /// SQL to read one batch
    fn batch_records_sql(&self) -> String {
        format!(
            "SELECT {id}, {batch} FROM {table} WHERE {batch} = {p1} ORDER BY {id} ASC",
            id = self.schema.identifier_column,
            batch = self.schema.batch_column,
            table = self.schema.table,
            p1 = self.db.backend().placeholder(1),
        )
    }

    /// SQL to check for one identifier
    fn contains_sql(&self, identifier: &str) -> (String, Vec<String>) {
        (
            format!(
                "SELECT {id} FROM {table} WHERE {id} = {p1}",
                id = self.schema.identifier_column,
                table = self.schema.table,
                p1 = self.db.backend().placeholder(1),
            ),
            vec![identifier.to_string()],
        )
    }

    /// SQL to remove a record
    fn delete_sql(&self, identifier: &str) -> (String, Vec<String>) {
        (
            format!(
                "DELETE FROM {table} WHERE {id} = {p1}",
                id = self.schema.identifier_column,
                table = self.schema.table,
                p1 = self.db.backend().placeholder(1),
            ),
            vec![identifier.to_string()],
        )
    }

    /// SQL to read the highest batch
    fn max_batch_sql(&self) -> String {
        format!(
            "SELECT {batch} FROM {table} ORDER BY {batch} DESC LIMIT 1",
            batch = self.schema.batch_column,
            table = self.schema.table,
        )
    }

    fn record_from_row(&self, row: &sqlx::any::AnyRow) -> SmartResult<MigrationRecord> {
        let identifier: String = row
            .try_get(0)
            .map_err(|e| {
                SmartMigrationError::Database(format!("Failed to get migration identifier: {}", e))
            })?;
        let batch: i64 = row
            .try_get(1)
            .map_err(|e| SmartMigrationError::Database(format!("Failed to get batch: {}", e)))?;
        Ok(MigrationRecord { identifier, batch })
    }
}

#[async_trait]
impl LedgerStore for SqlLedgerStore {
    async fn all_records(&self) -> SmartResult<Vec<MigrationRecord>> {
        let sql = self.all_records_sql();
        let rows = sqlx::query(&sql)
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| {
                SmartMigrationError::Database(format!("Failed to query migration ledger: {}", e))
            })?;

        let mut records = rows
            .iter()
            .map(|row| self.record_from_row(row))
            .collect::<SmartResult<Vec<_>>>()?;
        records.sort();
        Ok(records)
    }

    async fn delete(&self, identifier: &str) -> SmartResult<bool> {
        let (sql, params) = self.delete_sql(identifier);
        let mut query = sqlx::query(&sql);
        for param in params {
            query = query.bind(param);
        }

        let result = query
            .execute(self.db.pool())
            .await
            .map_err(|e| {
                SmartMigrationError::Database(format!("Failed to remove migration record: {}", e))
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn records_in_batch(&self, batch: i64) -> SmartResult<Vec<MigrationRecord>> {
        let sql = self.batch_records_sql();
        let rows = sqlx::query(&sql)
            .bind(batch)
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| {
                SmartMigrationError::Database(format!("Failed to query batch {}: {}", batch, e))
            })?;

        rows.iter().map(|row| self.record_from_row(row)).collect()
    }

    async fn contains(&self, identifier: &str) -> SmartResult<bool> {
        let (sql, params) = self.contains_sql(identifier);
        let mut query = sqlx::query(&sql);
        for param in params {
            query = query.bind(param);
        }

        let result = query
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| {
                SmartMigrationError::Database(format!("Failed to check migration status: {}", e))
            })?;
        Ok(result.is_some())
    }

    async fn max_batch(&self) -> SmartResult<i64> {
        let sql = self.max_batch_sql();
        let row = sqlx::query(&sql)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| {
                SmartMigrationError::Database(format!("Failed to get latest batch: {}", e))
            })?;

        match row {
            Some(row) => row
                .try_get::<i64, _>(0)
                .map_err(|e| SmartMigrationError::Database(format!("Failed to get batch: {}", e))),
            None => Ok(0),
        }
    }
}
