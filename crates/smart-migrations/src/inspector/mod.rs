//! Foreign-key dependency inspection
//!
//! Advisory only: results are shown to the operator before a rollback and
//! never block one. Any catalog failure degrades to an empty result.

pub mod catalog;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::database::SchemaCatalog;
pub use catalog::{CatalogStrategy, Direction};

/// One foreign-key column reference
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ForeignKeyEdge {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    /// Absent when SQLite references the implicit primary key
    pub target_column: Option<String>,
    /// SQLite does not name foreign keys
    pub constraint_name: Option<String>,
}

impl ForeignKeyEdge {
    fn from_row(row: Vec<Option<String>>) -> Option<Self> {
        let mut columns = row.into_iter();
        let source_table = columns.next()??;
        let source_column = columns.next()??;
        let target_table = columns.next()??;
        let target_column = columns.next().flatten();
        let constraint_name = columns.next().flatten();
        Some(Self {
            source_table,
            source_column,
            target_table,
            target_column,
            constraint_name,
        })
    }
}

impl fmt::Display for ForeignKeyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.source_table,
            self.source_column,
            self.target_table,
            self.target_column.as_deref().unwrap_or("<primary key>")
        )?;
        if let Some(name) = &self.constraint_name {
            write!(f, " ({})", name)?;
        }
        Ok(())
    }
}

/// Foreign keys around one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    pub table: String,
    /// Keys defined on `table`
    pub outgoing: Vec<ForeignKeyEdge>,
    /// Keys on other tables pointing at `table`
    pub incoming: Vec<ForeignKeyEdge>,
}

impl DependencyReport {
    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty() && self.incoming.is_empty()
    }

    /// Operator-facing warnings; only incoming keys can break other tables
    pub fn warnings(&self) -> Vec<String> {
        self.incoming
            .iter()
            .filter(|edge| edge.source_table != self.table)
            .map(|edge| {
                format!(
                    "table '{}' is referenced by {}; rolling it back may break that constraint",
                    self.table, edge
                )
            })
            .collect()
    }
}

/// Dispatches foreign-key queries to the active backend's catalog
#[derive(Clone, Default)]
pub struct DependencyInspector {
    catalog: Option<Arc<dyn SchemaCatalog>>,
}

impl fmt::Debug for DependencyInspector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyInspector")
            .field("backend", &self.catalog.as_ref().map(|c| c.backend()))
            .finish()
    }
}

impl DependencyInspector {
    pub fn new(catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self { catalog: Some(catalog) }
    }

    /// Inspector without a catalog; always reports nothing
    pub fn disabled() -> Self {
        Self { catalog: None }
    }

    /// Constraints defined on `table` referencing other tables
    pub async fn outgoing_keys(&self, table: &str) -> Vec<ForeignKeyEdge> {
        self.keys(table, Direction::Outgoing).await
    }

    /// Constraints on other tables referencing `table`
    pub async fn incoming_keys(&self, table: &str) -> Vec<ForeignKeyEdge> {
        self.keys(table, Direction::Incoming).await
    }

    pub async fn dependencies(&self, table: &str) -> DependencyReport {
        DependencyReport {
            table: table.to_string(),
            outgoing: self.outgoing_keys(table).await,
            incoming: self.incoming_keys(table).await,
        }
    }

    async fn keys(&self, table: &str, direction: Direction) -> Vec<ForeignKeyEdge> {
        let Some(catalog) = &self.catalog else {
            return Vec::new();
        };

        let backend = catalog.backend();
        let strategy = CatalogStrategy::for_backend(&backend);
        let Some(sql) = strategy.query(direction) else {
            tracing::debug!(backend = %backend, "foreign-key inspection not supported for backend");
            return Vec::new();
        };

        match catalog.fetch_rows(sql, &[table.to_string()]).await {
            Ok(rows) => {
                let mut edges: Vec<ForeignKeyEdge> =
                    rows.into_iter().filter_map(ForeignKeyEdge::from_row).collect();
                edges.sort();
                edges.dedup();
                edges
            }
            Err(e) => {
                tracing::warn!(
                    table = %table,
                    backend = %backend,
                    "foreign-key inspection failed: {}",
                    e
                );
                Vec::new()
            }
        }
    }
}
