//! Backend-specific foreign-key catalog queries
//!
//! Each strategy returns rows in the same column order:
//! `source_table, source_column, target_table, target_column, constraint_name`.

use crate::database::Backend;

/// Which way a foreign key points relative to the inspected table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Constraints defined on the table
    Outgoing,
    /// Constraints on other tables referencing it
    Incoming,
}

/// Catalog query strategy, one variant per introspection mechanism
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogStrategy {
    /// `information_schema` joins (PostgreSQL)
    PostgresInformationSchema,
    /// `information_schema.KEY_COLUMN_USAGE` (MySQL / MariaDB)
    MySqlInformationSchema,
    /// `pragma_foreign_key_list` (SQLite)
    SqlitePragma,
    /// No foreign-key introspection for this driver
    Unsupported(String),
}

impl CatalogStrategy {
    pub fn for_backend(backend: &Backend) -> Self {
        match backend {
            Backend::Postgres => CatalogStrategy::PostgresInformationSchema,
            Backend::MySql => CatalogStrategy::MySqlInformationSchema,
            Backend::Sqlite => CatalogStrategy::SqlitePragma,
            Backend::Unsupported(name) => CatalogStrategy::Unsupported(name.clone()),
        }
    }

    /// Query text for one direction; `None` when unsupported.
    /// Every query takes the table name as its single bind.
    pub fn query(&self, direction: Direction) -> Option<&'static str> {
        match (self, direction) {
            (CatalogStrategy::PostgresInformationSchema, Direction::Outgoing) => {
                Some(POSTGRES_OUTGOING)
            }
            (CatalogStrategy::PostgresInformationSchema, Direction::Incoming) => {
                Some(POSTGRES_INCOMING)
            }
            (CatalogStrategy::MySqlInformationSchema, Direction::Outgoing) => Some(MYSQL_OUTGOING),
            (CatalogStrategy::MySqlInformationSchema, Direction::Incoming) => Some(MYSQL_INCOMING),
            (CatalogStrategy::SqlitePragma, Direction::Outgoing) => Some(SQLITE_OUTGOING),
            (CatalogStrategy::SqlitePragma, Direction::Incoming) => Some(SQLITE_INCOMING),
            (CatalogStrategy::Unsupported(_), _) => None,
        }
    }
}

const POSTGRES_OUTGOING: &str = "SELECT tc.table_name::text, kcu.column_name::text, \
    ccu.table_name::text, ccu.column_name::text, tc.constraint_name::text \
    FROM information_schema.table_constraints tc \
    JOIN information_schema.key_column_usage kcu \
      ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
    JOIN information_schema.constraint_column_usage ccu \
      ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema \
    WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = current_schema() \
      AND tc.table_name = $1";

const POSTGRES_INCOMING: &str = "SELECT tc.table_name::text, kcu.column_name::text, \
    ccu.table_name::text, ccu.column_name::text, tc.constraint_name::text \
    FROM information_schema.table_constraints tc \
    JOIN information_schema.key_column_usage kcu \
      ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
    JOIN information_schema.constraint_column_usage ccu \
      ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema \
    WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = current_schema() \
      AND ccu.table_name = $1";

const MYSQL_OUTGOING: &str = "SELECT TABLE_NAME, COLUMN_NAME, REFERENCED_TABLE_NAME, \
    REFERENCED_COLUMN_NAME, CONSTRAINT_NAME \
    FROM information_schema.KEY_COLUMN_USAGE \
    WHERE TABLE_SCHEMA = DATABASE() AND REFERENCED_TABLE_NAME IS NOT NULL AND TABLE_NAME = ?";

const MYSQL_INCOMING: &str = "SELECT TABLE_NAME, COLUMN_NAME, REFERENCED_TABLE_NAME, \
    REFERENCED_COLUMN_NAME, CONSTRAINT_NAME \
    FROM information_schema.KEY_COLUMN_USAGE \
    WHERE TABLE_SCHEMA = DATABASE() AND REFERENCED_TABLE_NAME = ?";

const SQLITE_OUTGOING: &str = "SELECT m.name, p.\"from\", p.\"table\", p.\"to\", NULL \
    FROM sqlite_master m JOIN pragma_foreign_key_list(m.name) p \
    WHERE m.type = 'table' AND m.name = ?";

const SQLITE_INCOMING: &str = "SELECT m.name, p.\"from\", p.\"table\", p.\"to\", NULL \
    FROM sqlite_master m JOIN pragma_foreign_key_list(m.name) p \
    WHERE m.type = 'table' AND p.\"table\" = ?";
