//! Table name inference for migrations
//!
//! Best effort, never authoritative over an explicit schema definition.
//! Strategies run in order and the first one that produces a name wins:
//!
//! 1. [`DefinitionInspection`] reads `CREATE TABLE` / `ALTER TABLE` from the
//!    migration's forward SQL.
//! 2. [`ClassNameHeuristic`] reads CamelCase names such as
//!    `AddTimestampsToPostsTable`.
//! 3. [`MigrationNameHeuristic`] reads file-style names such as
//!    `2024_01_02_000001_add_email_to_users_table`.
//!
//! When nothing matches the resolver returns `None` and the migration is left
//! out of table-scoped queries.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::definitions::ReversibleMigration;
use crate::naming::{strip_timestamp_prefix, to_snake_case};

static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\bcreate\s+(?:temporary\s+|temp\s+)?table\s+(?:if\s+not\s+exists\s+)?",
        r#"((?:[`"\[]?\w+[`"\]]?\.)?[`"\[]?\w+[`"\]]?)"#,
    ))
    .expect("valid create table regex")
});

static ALTER_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\balter\s+table\s+(?:if\s+exists\s+)?(?:only\s+)?",
        r#"((?:[`"\[]?\w+[`"\]]?\.)?[`"\[]?\w+[`"\]]?)"#,
    ))
    .expect("valid alter table regex")
});

static CLASS_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z0-9]*$").expect("valid class name regex"));

static CLASS_TO_TARGET: Lazy<Regex> =
    Lazy::new(|| {
        Regex::new(r"^(?:Add|Alter)[A-Za-z0-9]*To([A-Z][A-Za-z0-9]*)$").expect("valid regex")
    });

static CLASS_ACTION_TARGET: Lazy<Regex> =
    Lazy::new(|| {
        Regex::new(r"^(?:Create|Alter|Modify|Update)([A-Z][A-Za-z0-9]*)$").expect("valid regex")
    });

static NAME_TO_TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.+_to_([a-z0-9_]+)$").expect("valid regex"));

static NAME_ACTION_TARGET: Lazy<Regex> =
    Lazy::new(|| {
        Regex::new(r"^(?:create|add|alter|modify|update)_([a-z0-9_]+)$").expect("valid regex")
    });

/// What a strategy may look at
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveInput<'a> {
    /// Ledger identifier or file name
    pub identifier: &'a str,
    /// Declared type-style name of the migration, if known
    pub class_name: Option<&'a str>,
    /// Forward schema source, if the definition could be loaded
    pub source: Option<&'a str>,
}

impl<'a> ResolveInput<'a> {
    pub fn new(identifier: &'a str) -> Self {
        Self {
            identifier,
            class_name: None,
            source: None,
        }
    }

    /// Input enriched with a loaded definition
    pub fn from_definition(identifier: &'a str, definition: &'a dyn ReversibleMigration) -> Self {
        Self {
            identifier,
            class_name: definition.class_name(),
            source: definition.schema_source(),
        }
    }

    pub fn with_class_name(mut self, class_name: &'a str) -> Self {
        self.class_name = Some(class_name);
        self
    }

    pub fn with_source(mut self, source: &'a str) -> Self {
        self.source = Some(source);
        self
    }
}

/// One table inference strategy
pub trait TableNameStrategy: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn resolve(&self, input: &ResolveInput<'_>) -> Option<String>;
}

/// Reads the table named by the first `CREATE TABLE`, else the first `ALTER TABLE`
#[derive(Debug, Default, Clone, Copy)]
pub struct DefinitionInspection;

impl TableNameStrategy for DefinitionInspection {
    fn name(&self) -> &'static str {
        "definition"
    }

    fn resolve(&self, input: &ResolveInput<'_>) -> Option<String> {
        let source = input.source?;
        CREATE_TABLE
            .captures(source)
            .or_else(|| ALTER_TABLE.captures(source))
            .and_then(|caps| caps.get(1))
            .map(|m| unqualify(m.as_str()))
            .filter(|table| !table.is_empty())
    }
}

/// CamelCase names: `CreateUserProfilesTable`, `AddTimestampsToPostsTable`
#[derive(Debug, Default, Clone, Copy)]
pub struct ClassNameHeuristic;

impl TableNameStrategy for ClassNameHeuristic {
    fn name(&self) -> &'static str {
        "class-name"
    }

    fn resolve(&self, input: &ResolveInput<'_>) -> Option<String> {
        let name = input
            .class_name
            .or_else(|| CLASS_NAME.is_match(input.identifier).then_some(input.identifier))?;

        let cleaned = match name.strip_suffix("Table") {
            Some(stripped) if !stripped.is_empty() => stripped,
            _ => name,
        };

        let target = CLASS_TO_TARGET
            .captures(cleaned)
            .or_else(|| CLASS_ACTION_TARGET.captures(cleaned))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .unwrap_or(cleaned);

        Some(to_snake_case(target))
    }
}

/// File-style names: `2024_01_01_000001_create_users_table`
#[derive(Debug, Default, Clone, Copy)]
pub struct MigrationNameHeuristic;

impl TableNameStrategy for MigrationNameHeuristic {
    fn name(&self) -> &'static str {
        "migration-name"
    }

    fn resolve(&self, input: &ResolveInput<'_>) -> Option<String> {
        let name = input
            .identifier
            .trim_end_matches(".sql")
            .trim_end_matches(".rs");
        let name = strip_timestamp_prefix(name);
        let name = name.strip_suffix("_table").unwrap_or(name);

        NAME_TO_TARGET
            .captures(name)
            .or_else(|| NAME_ACTION_TARGET.captures(name))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Ordered list of strategies
pub struct TableNameResolver {
    strategies: Vec<Box<dyn TableNameStrategy>>,
}

impl Default for TableNameResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TableNameResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableNameResolver")
            .field("strategies", &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl TableNameResolver {
    /// Resolver with the three built-in strategies
    pub fn new() -> Self {
        Self::with_strategies(vec![
            Box::new(DefinitionInspection),
            Box::new(ClassNameHeuristic),
            Box::new(MigrationNameHeuristic),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn TableNameStrategy>>) -> Self {
        Self { strategies }
    }

    /// Resolve from the identifier alone
    pub fn resolve(&self, identifier: &str) -> Option<String> {
        self.resolve_input(&ResolveInput::new(identifier))
    }

    /// Resolve using a loaded definition when there is one
    pub fn resolve_definition(
        &self,
        identifier: &str,
        definition: Option<&dyn ReversibleMigration>,
    ) -> Option<String> {
        match definition {
            Some(definition) => {
                self.resolve_input(&ResolveInput::from_definition(identifier, definition))
            }
            None => self.resolve(identifier),
        }
    }

    pub fn resolve_input(&self, input: &ResolveInput<'_>) -> Option<String> {
        for strategy in &self.strategies {
            if let Some(table) = strategy.resolve(input) {
                tracing::trace!(
                    migration = %input.identifier,
                    strategy = strategy.name(),
                    table = %table,
                    "resolved migration table"
                );
                return Some(table);
            }
        }
        tracing::debug!(migration = %input.identifier, "no table could be determined");
        None
    }
}

/// Strip identifier quotes and any schema qualifier
fn unqualify(name: &str) -> String {
    name.rsplit('.')
        .next()
        .unwrap_or(name)
        .trim_matches(|c| matches!(c, '`' | '"' | '[' | ']'))
        .to_string()
}
