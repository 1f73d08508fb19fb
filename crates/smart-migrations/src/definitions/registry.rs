//! Registry of migrations registered from code

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::{DefinitionLocator, ReversibleMigration};
use crate::error::{SmartMigrationError, SmartResult};

/// Explicit identifier → migration map, filled when migration units load.
#[derive(Default)]
pub struct RegistryLocator {
    migrations: DashMap<String, Arc<dyn ReversibleMigration>>,
}

impl RegistryLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migration under its own identifier.
    ///
    /// Registering the same instance twice is a no-op; a different migration
    /// under an identifier that is already taken is rejected as ambiguous.
    pub fn register(&self, migration: Arc<dyn ReversibleMigration>) -> SmartResult<()> {
        let identifier = migration.identifier().to_string();

        if let Some(existing) = self.migrations.get(&identifier) {
            if Arc::ptr_eq(existing.value(), &migration) {
                return Ok(());
            }
            return Err(SmartMigrationError::AmbiguousDefinition {
                identifier: identifier.clone(),
                candidates: vec![
                    existing.class_name().unwrap_or(&identifier).to_string(),
                    migration.class_name().unwrap_or(&identifier).to_string(),
                ],
            });
        }

        tracing::debug!(migration = %identifier, "registered migration definition");
        self.migrations.insert(identifier, migration);
        Ok(())
    }

    /// Register several migrations, stopping at the first conflict
    pub fn register_all<I>(&self, migrations: I) -> SmartResult<()>
    where
        I: IntoIterator<Item = Arc<dyn ReversibleMigration>>,
    {
        for migration in migrations {
            self.register(migration)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[async_trait]
impl DefinitionLocator for RegistryLocator {
    async fn locate(&self, identifier: &str) -> SmartResult<Option<Arc<dyn ReversibleMigration>>> {
        Ok(self.migrations.get(identifier).map(|entry| entry.value().clone()))
    }
}
