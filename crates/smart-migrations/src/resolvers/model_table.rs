//! Model → table resolution
//!
//! Models are registered in a [`ModelCatalog`], either from code through the
//! [`Model`] trait or from configuration entries. Only catalog entries marked
//! as persistence models resolve to a table; other registered types do not.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::DEFAULT_MODEL_NAMESPACE;
use crate::error::{SmartMigrationError, SmartResult};
use crate::naming::{pluralize, short_name, to_snake_case};

/// Path separator for fully-qualified model names
pub const NAMESPACE_SEPARATOR: &str = "::";

/// Persistence-mapped model
pub trait Model: 'static {
    /// Short type name, e.g. `UserProfile`
    fn model_name() -> &'static str;

    /// Explicit table name; `None` uses the naming convention
    fn table_name() -> Option<&'static str> {
        None
    }
}

/// Model declaration as read from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Fully-qualified name, e.g. `app::models::User`
    pub name: String,
    /// Explicit table name
    #[serde(default)]
    pub table: Option<String>,
    /// `false` registers a plain type that is not a model
    #[serde(default = "default_persistent")]
    pub persistent: bool,
}

fn default_persistent() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CatalogEntry {
    Model { table: Option<String> },
    Plain,
}

/// Known types keyed by normalized fully-qualified name
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog built from configuration entries
    pub fn from_entries(entries: &[ModelEntry]) -> Self {
        let mut catalog = Self::new();
        for entry in entries {
            if entry.persistent {
                catalog.register_model(&entry.name, entry.table.as_deref());
            } else {
                catalog.register_plain(&entry.name);
            }
        }
        catalog
    }

    /// Register a [`Model`] type under `namespace`
    pub fn register<M: Model>(&mut self, namespace: &str) -> &mut Self {
        let fqn = join_namespace(namespace, M::model_name());
        self.register_model(&fqn, M::table_name())
    }

    /// Register a persistence model by name
    pub fn register_model(&mut self, fqn: &str, table: Option<&str>) -> &mut Self {
        self.entries.insert(
            normalize(fqn),
            CatalogEntry::Model {
                table: table.map(str::to_string),
            },
        );
        self
    }

    /// Register a type that exists but is not a persistence model
    pub fn register_plain(&mut self, fqn: &str) -> &mut Self {
        self.entries.insert(normalize(fqn), CatalogEntry::Plain);
        self
    }

    /// Whether any type is registered under `fqn`
    pub fn contains(&self, fqn: &str) -> bool {
        self.entries.contains_key(&normalize(fqn))
    }

    pub fn is_model(&self, fqn: &str) -> bool {
        matches!(self.entries.get(&normalize(fqn)), Some(CatalogEntry::Model { .. }))
    }

    fn table_override(&self, fqn: &str) -> Option<&str> {
        match self.entries.get(&normalize(fqn)) {
            Some(CatalogEntry::Model { table }) => table.as_deref(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves model references to table names
#[derive(Debug, Clone)]
pub struct ModelTableResolver {
    catalog: ModelCatalog,
    namespace: String,
}

impl Default for ModelTableResolver {
    fn default() -> Self {
        Self::new(ModelCatalog::new())
    }
}

impl ModelTableResolver {
    /// Resolver using the default namespace
    pub fn new(catalog: ModelCatalog) -> Self {
        Self::with_namespace(catalog, DEFAULT_MODEL_NAMESPACE)
    }

    pub fn with_namespace(catalog: ModelCatalog, namespace: &str) -> Self {
        Self {
            catalog,
            namespace: namespace.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Replace the default namespace
    pub fn set_namespace(&mut self, namespace: &str) {
        self.namespace = namespace.to_string();
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut ModelCatalog {
        &mut self.catalog
    }

    /// Qualify a model reference.
    ///
    /// `app::models::User` and `App\Models\User` are returned unchanged;
    /// `billing.Invoice` becomes `{namespace}::billing::Invoice`;
    /// `User` becomes `{namespace}::User`.
    pub fn build_fully_qualified_name(&self, reference: &str) -> String {
        let reference = reference.trim();
        if is_qualified(reference) {
            return reference.to_string();
        }
        let relative = reference.replace('.', NAMESPACE_SEPARATOR);
        join_namespace(&self.namespace, &relative)
    }

    /// True only for registered persistence models
    pub fn exists(&self, fully_qualified_name: &str) -> bool {
        self.catalog.is_model(fully_qualified_name)
    }

    /// Table backing a model reference
    pub fn resolve_table(&self, reference: &str) -> SmartResult<String> {
        let fqn = self.build_fully_qualified_name(reference);
        if !self.exists(&fqn) {
            tracing::debug!(
                model = %fqn,
                known = self.catalog.contains(&fqn),
                "model lookup failed"
            );
            return Err(SmartMigrationError::ModelNotFound { model: fqn });
        }

        let table = match self.catalog.table_override(&fqn) {
            Some(table) => table.to_string(),
            None => pluralize(&to_snake_case(short_name(&fqn))),
        };
        tracing::debug!(model = %fqn, table = %table, "resolved model table");
        Ok(table)
    }
}

fn is_qualified(reference: &str) -> bool {
    reference.contains(NAMESPACE_SEPARATOR) || reference.contains('\\')
}

fn join_namespace(namespace: &str, name: &str) -> String {
    let namespace = namespace.trim_end_matches(NAMESPACE_SEPARATOR).trim_end_matches('\\');
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", namespace, NAMESPACE_SEPARATOR, name)
    }
}

/// `\App\Models\User` and `app::models::User` style names share one key space
fn normalize(fqn: &str) -> String {
    fqn.trim()
        .replace('\\', NAMESPACE_SEPARATOR)
        .trim_start_matches(NAMESPACE_SEPARATOR)
        .to_string()
}
