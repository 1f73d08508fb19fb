//! Migration ledger - the record of which migrations ran, in which batch
//!
//! The ledger is read and pruned here, never written: records are created by
//! whatever ran the migrations forward. Reads are always ordered ascending by
//! `(batch, identifier)`.

pub mod memory;
pub mod sql;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::definitions::DefinitionLocator;
use crate::error::SmartResult;
use crate::resolvers::TableNameResolver;

pub use memory::InMemoryLedgerStore;
pub use sql::SqlLedgerStore;

/// One executed migration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub identifier: String,
    pub batch: i64,
}

impl MigrationRecord {
    pub fn new(identifier: impl Into<String>, batch: i64) -> Self {
        Self {
            identifier: identifier.into(),
            batch,
        }
    }
}

impl Ord for MigrationRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.batch
            .cmp(&other.batch)
            .then_with(|| self.identifier.cmp(&other.identifier))
    }
}

impl PartialOrd for MigrationRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MigrationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (batch {})", self.identifier, self.batch)
    }
}

/// Ledger table layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSchema {
    pub table: String,
    pub identifier_column: String,
    pub batch_column: String,
}

impl Default for LedgerSchema {
    fn default() -> Self {
        Self {
            table: "migrations".to_string(),
            identifier_column: "migration".to_string(),
            batch_column: "batch".to_string(),
        }
    }
}

/// Storage behind the ledger: ordered reads and delete-by-identifier
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Every record, ascending by `(batch, identifier)`
    async fn all_records(&self) -> SmartResult<Vec<MigrationRecord>>;

    /// Remove one record; `false` when it was not present
    async fn delete(&self, identifier: &str) -> SmartResult<bool>;

    async fn records_in_batch(&self, batch: i64) -> SmartResult<Vec<MigrationRecord>> {
        Ok(self
            .all_records()
            .await?
            .into_iter()
            .filter(|record| record.batch == batch)
            .collect())
    }

    async fn contains(&self, identifier: &str) -> SmartResult<bool> {
        Ok(self
            .all_records()
            .await?
            .iter()
            .any(|record| record.identifier == identifier))
    }

    /// Highest batch number, 0 when empty
    async fn max_batch(&self) -> SmartResult<i64> {
        Ok(self
            .all_records()
            .await?
            .iter()
            .map(|record| record.batch)
            .max()
            .unwrap_or(0))
    }
}

/// Table-aware view over a [`LedgerStore`]
#[derive(Clone)]
pub struct MigrationLedger {
    store: Arc<dyn LedgerStore>,
    resolver: Arc<TableNameResolver>,
    definitions: Option<Arc<dyn DefinitionLocator>>,
}

impl fmt::Debug for MigrationLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationLedger")
            .field("resolver", &self.resolver)
            .field("definitions", &self.definitions.is_some())
            .finish()
    }
}

impl MigrationLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            resolver: Arc::new(TableNameResolver::new()),
            definitions: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<TableNameResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Use loaded definitions for table inference where available
    pub fn with_definitions(mut self, definitions: Arc<dyn DefinitionLocator>) -> Self {
        self.definitions = Some(definitions);
        self
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// All records, ascending
    pub async fn records(&self) -> SmartResult<Vec<MigrationRecord>> {
        let mut records = self.store.all_records().await?;
        records.sort();
        Ok(records)
    }

    /// Table a record most likely targets
    pub async fn table_for(&self, identifier: &str) -> Option<String> {
        let definition = match &self.definitions {
            Some(locator) => match locator.locate(identifier).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(
                        migration = %identifier,
                        "definition lookup failed, using name only: {}",
                        e
                    );
                    None
                }
            },
            None => None,
        };
        self.resolver.resolve_definition(identifier, definition.as_deref())
    }

    /// Records whose resolved table is `table`; unresolvable records are left out
    pub async fn records_for_table(&self, table: &str) -> SmartResult<Vec<MigrationRecord>> {
        let mut matching = Vec::new();
        for record in self.records().await? {
            if self.table_for(&record.identifier).await.as_deref() == Some(table) {
                matching.push(record);
            }
        }
        tracing::debug!(table = %table, count = matching.len(), "ledger records for table");
        Ok(matching)
    }

    pub async fn records_for_batch(&self, batch: i64) -> SmartResult<Vec<MigrationRecord>> {
        let mut records = self.store.records_in_batch(batch).await?;
        records.sort();
        Ok(records)
    }

    /// Oldest record whose identifier starts with `prefix`
    pub async fn record_by_identifier_prefix(
        &self,
        prefix: &str,
    ) -> SmartResult<Option<MigrationRecord>> {
        if prefix.is_empty() {
            return Ok(None);
        }
        Ok(self
            .records()
            .await?
            .into_iter()
            .find(|record| record.identifier.starts_with(prefix)))
    }

    pub async fn exists(&self, identifier: &str) -> SmartResult<bool> {
        self.store.contains(identifier).await
    }

    pub async fn max_batch(&self) -> SmartResult<i64> {
        self.store.max_batch().await
    }

    /// Sorted distinct batch numbers
    pub async fn executed_batches(&self) -> SmartResult<Vec<i64>> {
        let batches: BTreeSet<i64> = self
            .store
            .all_records()
            .await?
            .iter()
            .map(|r| r.batch)
            .collect();
        Ok(batches.into_iter().collect())
    }

    pub async fn delete(&self, identifier: &str) -> SmartResult<bool> {
        let removed = self.store.delete(identifier).await?;
        tracing::debug!(migration = %identifier, removed, "ledger delete");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{RegistryLocator, SqlMigration};

    fn ledger(records: Vec<MigrationRecord>) -> MigrationLedger {
        MigrationLedger::new(Arc::new(InMemoryLedgerStore::with_records(records)))
    }

    fn sample() -> Vec<MigrationRecord> {
        vec![
            MigrationRecord::new("2024_01_01_000001_create_users_table", 1),
            MigrationRecord::new("2024_01_02_000001_create_posts_table", 1),
            MigrationRecord::new("2024_02_01_000001_add_avatar_to_users_table", 2),
            MigrationRecord::new("2024_03_01_000001_seed_reference_data", 3),
            MigrationRecord::new("2024_03_01_000002_add_bio_to_users_table", 3),
        ]
    }

    #[test]
    fn test_record_ordering() {
        let mut records = vec![
            MigrationRecord::new("b", 2),
            MigrationRecord::new("c", 1),
            MigrationRecord::new("a", 2),
        ];
        records.sort();
        let ids: Vec<_> = records.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_records_for_table_excludes_unresolvable() {
        let ledger = ledger(sample());

        let users = ledger.records_for_table("users").await.unwrap();
        let ids: Vec<_> = users.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "2024_01_01_000001_create_users_table",
                "2024_02_01_000001_add_avatar_to_users_table",
                "2024_03_01_000002_add_bio_to_users_table",
            ]
        );

        assert!(ledger.records_for_table("reference_data").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_definition_source_overrides_name() {
        let registry = RegistryLocator::new();
        registry
            .register(Arc::new(SqlMigration::new(
                "2024_03_01_000001_seed_reference_data",
                "CREATE TABLE countries (code TEXT PRIMARY KEY);",
                "DROP TABLE countries;",
            )))
            .unwrap();
        let ledger = ledger(sample()).with_definitions(Arc::new(registry));

        let countries = ledger.records_for_table("countries").await.unwrap();
        assert_eq!(countries.len(), 1);
        assert_eq!(countries[0].batch, 3);
    }

    #[tokio::test]
    async fn test_batch_queries() {
        let ledger = ledger(sample());

        assert_eq!(ledger.max_batch().await.unwrap(), 3);
        assert_eq!(ledger.executed_batches().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(ledger.records_for_batch(1).await.unwrap().len(), 2);
        assert!(ledger.records_for_batch(9).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_ledger() {
        let ledger = ledger(Vec::new());
        assert_eq!(ledger.max_batch().await.unwrap(), 0);
        assert!(ledger.executed_batches().await.unwrap().is_empty());
        assert!(ledger.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prefix_lookup_returns_oldest_match() {
        let ledger = ledger(sample());

        let record = ledger.record_by_identifier_prefix("2024_03_01").await.unwrap().unwrap();
        assert_eq!(record.identifier, "2024_03_01_000001_seed_reference_data");

        assert!(ledger.record_by_identifier_prefix("2025").await.unwrap().is_none());
        assert!(ledger.record_by_identifier_prefix("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let ledger = ledger(sample());
        let id = "2024_01_02_000001_create_posts_table";

        assert!(ledger.exists(id).await.unwrap());
        assert!(ledger.delete(id).await.unwrap());
        assert!(!ledger.exists(id).await.unwrap());
        assert!(!ledger.delete(id).await.unwrap());
    }
}
