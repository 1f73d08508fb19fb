//! Reversing selected migrations one at a time
//!
//! Each record goes through: locate definition, run `down`, delete the
//! ledger row. Failures are captured in the record's [`RollbackResult`] and
//! never stop the remaining records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::ConfigError;
use crate::database::SchemaExecutor;
use crate::definitions::DefinitionLocator;
use crate::ledger::{MigrationLedger, MigrationRecord};

/// When a selected record's ledger row is removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerCleanup {
    /// Always, even if the definition was missing or `down` failed
    #[default]
    Always,
    /// Only after a successful reversal
    OnSuccess,
}

impl FromStr for LedgerCleanup {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "always" => Ok(LedgerCleanup::Always),
            "on-success" | "on_success" | "onsuccess" => Ok(LedgerCleanup::OnSuccess),
            _ => Err(ConfigError::InvalidValue {
                field: "ledger_cleanup".to_string(),
                value: s.to_string(),
                expected: "always or on-success".to_string(),
            }),
        }
    }
}

impl fmt::Display for LedgerCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerCleanup::Always => write!(f, "always"),
            LedgerCleanup::OnSuccess => write!(f, "on-success"),
        }
    }
}

/// Outcome of reversing one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversalStatus {
    Reversed,
    /// No definition found; nothing was run against the schema
    DefinitionMissing,
    /// Definition lookup itself failed, e.g. ambiguous candidates
    LocateFailed,
    /// `down` returned an error
    ReversalFailed,
}

impl ReversalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReversalStatus::Reversed => "reversed",
            ReversalStatus::DefinitionMissing => "definition_missing",
            ReversalStatus::LocateFailed => "locate_failed",
            ReversalStatus::ReversalFailed => "reversal_failed",
        }
    }
}

impl fmt::Display for ReversalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-record result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackResult {
    pub identifier: String,
    pub batch: i64,
    pub success: bool,
    pub error: Option<String>,
    pub status: ReversalStatus,
    /// Whether the ledger row was deleted
    pub ledger_removed: bool,
}

/// Counts over a result list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub ledger_removed: usize,
}

impl RollbackSummary {
    pub fn from_results(results: &[RollbackResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            ledger_removed: results.iter().filter(|r| r.ledger_removed).count(),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Runs reversals against the schema and prunes the ledger
#[derive(Clone)]
pub struct RollbackExecutor {
    ledger: MigrationLedger,
    definitions: Arc<dyn DefinitionLocator>,
    schema: Arc<dyn SchemaExecutor>,
    cleanup: LedgerCleanup,
}

impl fmt::Debug for RollbackExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollbackExecutor")
            .field("backend", &self.schema.backend())
            .field("cleanup", &self.cleanup)
            .finish()
    }
}

impl RollbackExecutor {
    pub fn new(
        ledger: MigrationLedger,
        definitions: Arc<dyn DefinitionLocator>,
        schema: Arc<dyn SchemaExecutor>,
    ) -> Self {
        Self {
            ledger,
            definitions,
            schema,
            cleanup: LedgerCleanup::default(),
        }
    }

    pub fn with_cleanup(mut self, cleanup: LedgerCleanup) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn cleanup(&self) -> LedgerCleanup {
        self.cleanup
    }

    /// Reverse one record. Never fails; problems are reported in the result.
    pub async fn reverse_one(&self, record: &MigrationRecord) -> RollbackResult {
        let (status, mut error) = match self.definitions.locate(&record.identifier).await {
            Ok(Some(definition)) => match definition.down(self.schema.as_ref()).await {
                Ok(()) => {
                    tracing::info!(
                        migration = %record.identifier,
                        batch = record.batch,
                        "reversed migration"
                    );
                    (ReversalStatus::Reversed, None)
                }
                Err(e) => {
                    tracing::warn!(migration = %record.identifier, "down failed: {}", e);
                    (ReversalStatus::ReversalFailed, Some(e.to_string()))
                }
            },
            Ok(None) => {
                tracing::warn!(
                    migration = %record.identifier,
                    "no definition found; schema left untouched"
                );
                (
                    ReversalStatus::DefinitionMissing,
                    Some(format!("Migration definition not found for '{}'", record.identifier)),
                )
            }
            Err(e) => {
                tracing::warn!(migration = %record.identifier, "definition lookup failed: {}", e);
                (ReversalStatus::LocateFailed, Some(e.to_string()))
            }
        };

        let remove = match self.cleanup {
            LedgerCleanup::Always => true,
            LedgerCleanup::OnSuccess => status == ReversalStatus::Reversed,
        };

        let mut ledger_removed = false;
        let mut delete_failed = false;
        if remove {
            match self.ledger.delete(&record.identifier).await {
                Ok(removed) => ledger_removed = removed,
                Err(e) => {
                    tracing::warn!(
                        migration = %record.identifier,
                        "failed to remove ledger record: {}",
                        e
                    );
                    delete_failed = true;
                    let message = format!("Failed to remove ledger record: {}", e);
                    error = Some(match error {
                        Some(previous) => format!("{}; {}", previous, message),
                        None => message,
                    });
                }
            }
        } else {
            tracing::debug!(migration = %record.identifier, "ledger record kept");
        }

        RollbackResult {
            identifier: record.identifier.clone(),
            batch: record.batch,
            success: status == ReversalStatus::Reversed && !delete_failed,
            error,
            status,
            ledger_removed,
        }
    }

    /// Reverse records sequentially in the given order
    pub async fn reverse_many(&self, records: &[MigrationRecord]) -> Vec<RollbackResult> {
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            results.push(self.reverse_one(record).await);
        }
        results
    }
}
