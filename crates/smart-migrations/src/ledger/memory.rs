//! In-process ledger store

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{LedgerStore, MigrationRecord};
use crate::error::SmartResult;

/// Ledger held in memory, for embedding and tests
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    records: RwLock<Vec<MigrationRecord>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<MigrationRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Add a record, replacing one with the same identifier
    pub async fn insert(&self, record: MigrationRecord) {
        let mut records = self.records.write().await;
        records.retain(|existing| existing.identifier != record.identifier);
        records.push(record);
    }

    /// Current contents, ascending
    pub async fn snapshot(&self) -> Vec<MigrationRecord> {
        let mut records = self.records.read().await.clone();
        records.sort();
        records
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn all_records(&self) -> SmartResult<Vec<MigrationRecord>> {
        Ok(self.snapshot().await)
    }

    async fn delete(&self, identifier: &str) -> SmartResult<bool> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| record.identifier != identifier);
        Ok(records.len() != before)
    }
}
