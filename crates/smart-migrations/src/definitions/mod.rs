//! Migration definitions - locating the reversal logic for a ledger record
//!
//! A ledger record is only an identifier and a batch. To undo it the engine
//! needs the migration's `down` operation, found through a
//! [`DefinitionLocator`]. Two locators ship with the crate: a registry
//! populated by code and a reader for `.sql` migration files.

pub mod registry;
pub mod sql_files;

use async_trait::async_trait;
use std::sync::Arc;

use crate::database::SchemaExecutor;
use crate::error::SmartResult;

pub use registry::RegistryLocator;
pub use sql_files::{split_sql_statements, SqlFileLocator, SqlMigration};

/// A migration unit that knows how to undo itself
#[async_trait]
pub trait ReversibleMigration: Send + Sync {
    /// Ledger identifier, e.g. `2024_01_01_000001_create_users_table`
    fn identifier(&self) -> &str;

    /// Declarative type-style name such as `CreateUsersTable`, if any
    fn class_name(&self) -> Option<&str> {
        None
    }

    /// Forward schema source (SQL), inspected to find the target table
    fn schema_source(&self) -> Option<&str> {
        None
    }

    /// Reverse the migration's schema effect
    async fn down(&self, schema: &dyn SchemaExecutor) -> SmartResult<()>;
}

/// Finds the reversal unit for an identifier.
///
/// `Ok(None)` means nothing matched. Implementations must be safe to call
/// repeatedly for the same identifier and must return an error rather than
/// guess when several different definitions match.
#[async_trait]
pub trait DefinitionLocator: Send + Sync {
    async fn locate(&self, identifier: &str) -> SmartResult<Option<Arc<dyn ReversibleMigration>>>;
}

/// Tries several locators in order, returning the first hit
#[derive(Clone, Default)]
pub struct ChainLocator {
    locators: Vec<Arc<dyn DefinitionLocator>>,
}

impl ChainLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a locator; earlier locators win
    pub fn with(mut self, locator: Arc<dyn DefinitionLocator>) -> Self {
        self.locators.push(locator);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }
}

#[async_trait]
impl DefinitionLocator for ChainLocator {
    async fn locate(&self, identifier: &str) -> SmartResult<Option<Arc<dyn ReversibleMigration>>> {
        for locator in &self.locators {
            if let Some(found) = locator.locate(identifier).await? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

/// Locator that never finds anything
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyLocator;

#[async_trait]
impl DefinitionLocator for EmptyLocator {
    async fn locate(&self, _identifier: &str) -> SmartResult<Option<Arc<dyn ReversibleMigration>>> {
        Ok(None)
    }
}
