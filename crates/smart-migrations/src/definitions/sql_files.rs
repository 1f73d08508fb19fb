//! SQL migration files
//!
//! A migration file is `<identifier>.sql` with an up section and a down
//! section:
//!
//! ```sql
//! -- Migration: create users table
//! -- Up migration
//! CREATE TABLE users (id SERIAL PRIMARY KEY);
//!
//! -- Down migration
//! DROP TABLE users;
//! ```
//!
//! Several directories can be searched. Parsed files are cached, so locating
//! the same identifier twice reads the disk once.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{DefinitionLocator, ReversibleMigration};
use crate::database::SchemaExecutor;
use crate::error::{SmartMigrationError, SmartResult};
use crate::naming::strip_timestamp_prefix;

/// A migration expressed as up and down SQL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    /// Ledger identifier (file stem)
    pub identifier: String,
    /// Human-readable name
    pub name: String,
    /// SQL statements to apply the migration
    pub up_sql: String,
    /// SQL statements to rollback the migration
    pub down_sql: String,
    /// File the migration was read from, if any
    pub path: Option<PathBuf>,
}

impl SqlMigration {
    /// Create an in-memory SQL migration
    pub fn new(identifier: &str, up_sql: &str, down_sql: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            name: display_name(identifier),
            up_sql: up_sql.to_string(),
            down_sql: down_sql.to_string(),
            path: None,
        }
    }

    /// Parse a migration file
    pub fn from_file(path: &Path) -> SmartResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SmartMigrationError::Definition(format!(
                "Failed to read migration file {}: {}",
                path.display(),
                e
            ))
        })?;

        let identifier = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                SmartMigrationError::Definition("Invalid migration filename".to_string())
            })?;

        let (up_sql, down_sql) = parse_migration_content(&content);

        Ok(Self {
            identifier: identifier.to_string(),
            name: display_name(identifier),
            up_sql,
            down_sql,
            path: Some(path.to_path_buf()),
        })
    }

    fn same_content(&self, other: &SqlMigration) -> bool {
        self.up_sql == other.up_sql && self.down_sql == other.down_sql
    }
}

#[async_trait]
impl ReversibleMigration for SqlMigration {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn schema_source(&self) -> Option<&str> {
        if self.up_sql.is_empty() {
            None
        } else {
            Some(&self.up_sql)
        }
    }

    async fn down(&self, schema: &dyn SchemaExecutor) -> SmartResult<()> {
        let statements = split_sql_statements(&self.down_sql);
        if statements.is_empty() {
            tracing::warn!(
                migration = %self.identifier,
                "migration has no down statements; schema objects it created are left in place"
            );
            return Ok(());
        }

        schema
            .execute_statements(&statements)
            .await
            .map_err(|e| SmartMigrationError::reversal(&self.identifier, e))
    }
}

/// Locates `<identifier>.sql` files in a list of directories
pub struct SqlFileLocator {
    paths: Vec<PathBuf>,
    cache: DashMap<String, Arc<SqlMigration>>,
}

impl SqlFileLocator {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            cache: DashMap::new(),
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Identifiers of all migration files on disk, sorted and deduplicated
    pub fn discover(&self) -> SmartResult<Vec<String>> {
        let mut identifiers = Vec::new();
        for dir in &self.paths {
            if !dir.exists() {
                continue;
            }
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == "sql") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        identifiers.push(stem.to_string());
                    }
                }
            }
        }
        identifiers.sort();
        identifiers.dedup();
        Ok(identifiers)
    }

    fn candidates(&self, identifier: &str) -> Vec<PathBuf> {
        let filename = format!("{}.sql", identifier.trim_end_matches(".sql"));
        self.paths
            .iter()
            .map(|dir| dir.join(&filename))
            .filter(|path| path.is_file())
            .collect()
    }
}

#[async_trait]
impl DefinitionLocator for SqlFileLocator {
    async fn locate(&self, identifier: &str) -> SmartResult<Option<Arc<dyn ReversibleMigration>>> {
        if let Some(cached) = self.cache.get(identifier) {
            return Ok(Some(cached.value().clone() as Arc<dyn ReversibleMigration>));
        }

        let candidates = self.candidates(identifier);
        let mut parsed: Vec<SqlMigration> = Vec::with_capacity(candidates.len());
        for path in &candidates {
            let migration = SqlMigration::from_file(path)?;
            // the same file copied into two search paths is one definition
            if !parsed.iter().any(|existing| existing.same_content(&migration)) {
                parsed.push(migration);
            }
        }

        match parsed.len() {
            0 => Ok(None),
            1 => {
                let migration = Arc::new(parsed.remove(0));
                self.cache.insert(identifier.to_string(), migration.clone());
                Ok(Some(migration as Arc<dyn ReversibleMigration>))
            }
            _ => Err(SmartMigrationError::AmbiguousDefinition {
                identifier: identifier.to_string(),
                candidates: candidates.iter().map(|p| p.display().to_string()).collect(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Up,
    Down,
}

/// Whole-line `-- Up` / `-- Up migration` / `-- Down` / `-- Down migration` markers.
fn section_marker(line: &str) -> Option<Section> {
    let comment = line.trim().strip_prefix("--")?;
    let words = comment.split_whitespace().collect::<Vec<_>>().join(" ");
    match words.to_ascii_lowercase().as_str() {
        "up" | "up migration" => Some(Section::Up),
        "down" | "down migration" => Some(Section::Down),
        _ => None,
    }
}

/// Parse migration content to extract UP and DOWN SQL
fn parse_migration_content(content: &str) -> (String, String) {
    let mut up_sql = Vec::new();
    let mut down_sql = Vec::new();
    let mut current_section = None;

    for line in content.lines() {
        if let Some(section) = section_marker(line) {
            current_section = Some(section);
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }

        match current_section {
            Some(Section::Up) => up_sql.push(line),
            Some(Section::Down) => down_sql.push(line),
            None => {}
        }
    }

    (
        up_sql.join("\n").trim().to_string(),
        down_sql.join("\n").trim().to_string(),
    )
}

/// Split SQL into statements, falling back to `;` splitting if parsing fails
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    if sql.trim().is_empty() {
        return Vec::new();
    }

    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(parsed) => parsed.into_iter().map(|stmt| format!("{};", stmt)).collect(),
        Err(e) => {
            tracing::warn!("SQL parsing failed, using naive semicolon splitting: {}", e);
            sql.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| format!("{};", s))
                .collect()
        }
    }
}

fn display_name(identifier: &str) -> String {
    strip_timestamp_prefix(identifier).replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CapturingSchema {
        executed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SchemaExecutor for CapturingSchema {
        fn backend(&self) -> crate::database::Backend {
            crate::database::Backend::Sqlite
        }

        async fn execute_statements(&self, statements: &[String]) -> SmartResult<()> {
            self.executed.lock().unwrap().extend(statements.iter().cloned());
            Ok(())
        }
    }

    const USERS_MIGRATION: &str = "-- Migration: create users table\n\
        -- Up migration\n\
        CREATE TABLE users (id INTEGER PRIMARY KEY, email VARCHAR(255));\n\
        \n\
        -- Down migration\n\
        DROP TABLE users;\n";

    #[test]
    fn test_parse_migration_content() {
        let (up, down) = parse_migration_content(USERS_MIGRATION);
        assert!(up.starts_with("CREATE TABLE users"));
        assert_eq!(down, "DROP TABLE users;");
    }

    #[test]
    fn test_comments_inside_sections_do_not_switch_section() {
        let content = "-- Up migration\n\
            CREATE TABLE users (id INTEGER);\n\
            -- upsert seed rows later\n\
            CREATE INDEX idx_users ON users (id);\n\
            -- Down migration\n\
            -- update: drop the index before the table\n\
            DROP INDEX idx_users;\n\
            -- downgrade note\n\
            DROP TABLE users;\n";
        let (up, down) = parse_migration_content(content);
        assert_eq!(
            up,
            "CREATE TABLE users (id INTEGER);\nCREATE INDEX idx_users ON users (id);"
        );
        assert_eq!(down, "DROP INDEX idx_users;\nDROP TABLE users;");
    }

    #[test]
    fn test_section_markers() {
        assert_eq!(section_marker("-- Up"), Some(Section::Up));
        assert_eq!(section_marker("  --   DOWN   Migration "), Some(Section::Down));
        assert_eq!(section_marker("-- update users"), None);
        assert_eq!(section_marker("-- Migration: create users table"), None);
        assert_eq!(section_marker("SELECT 1 -- up"), None);
    }

    #[tokio::test]
    async fn test_down_after_inline_comment_runs_every_statement() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2024_01_01_000001_create_users_table.sql");
        fs::write(
            &path,
            "-- Up migration\nCREATE TABLE users (id INTEGER);\n\n\
             -- Down migration\n-- update: drop the index before the table\n\
             DROP INDEX idx_users;\nDROP TABLE users;\n",
        )
        .unwrap();

        let migration = SqlMigration::from_file(&path).unwrap();
        assert_eq!(migration.schema_source(), Some("CREATE TABLE users (id INTEGER);"));

        let schema = CapturingSchema::default();
        migration.down(&schema).await.unwrap();
        let executed = schema.executed.lock().unwrap();
        assert_eq!(executed.len(), 2);
        assert!(executed[0].starts_with("DROP INDEX idx_users"));
        assert!(executed[1].starts_with("DROP TABLE users"));
    }

    #[test]
    fn test_split_sql_statements() {
        let statements = split_sql_statements(
            "ALTER TABLE users DROP COLUMN email;\nDROP INDEX idx_users_email;",
        );
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("ALTER TABLE users"));
        assert!(statements.iter().all(|s| s.ends_with(';')));

        assert!(split_sql_statements("   ").is_empty());
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2024_01_01_000001_create_users_table.sql");
        fs::write(&path, USERS_MIGRATION).unwrap();

        let migration = SqlMigration::from_file(&path).unwrap();
        assert_eq!(migration.identifier, "2024_01_01_000001_create_users_table");
        assert_eq!(migration.name, "create users table");
        assert_eq!(migration.path.as_deref(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_locate_across_paths() {
        let app = TempDir::new().unwrap();
        let module = TempDir::new().unwrap();
        fs::write(
            module.path().join("2024_01_01_000001_create_users_table.sql"),
            USERS_MIGRATION,
        )
        .unwrap();

        let locator = SqlFileLocator::new([app.path(), module.path()]);
        let found = locator
            .locate("2024_01_01_000001_create_users_table")
            .await
            .unwrap()
            .expect("definition");
        assert!(found.schema_source().unwrap().contains("CREATE TABLE users"));

        assert!(locator.locate("2024_01_01_000002_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_locate_is_cached() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2024_01_01_000001_create_users_table.sql");
        fs::write(&path, USERS_MIGRATION).unwrap();

        let locator = SqlFileLocator::new([dir.path()]);
        assert!(locator.locate("2024_01_01_000001_create_users_table").await.unwrap().is_some());

        fs::remove_file(&path).unwrap();
        assert!(locator.locate("2024_01_01_000001_create_users_table").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_identical_duplicates_are_one_definition() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        for dir in [&a, &b] {
            fs::write(dir.path().join("2024_01_01_000001_create_users_table.sql"), USERS_MIGRATION)
                .unwrap();
        }

        let locator = SqlFileLocator::new([a.path(), b.path()]);
        assert!(locator.locate("2024_01_01_000001_create_users_table").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_conflicting_duplicates_are_ambiguous() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        fs::write(a.path().join("2024_01_01_000001_create_users_table.sql"), USERS_MIGRATION).unwrap();
        fs::write(
            b.path().join("2024_01_01_000001_create_users_table.sql"),
            "-- Up migration\nCREATE TABLE members (id INTEGER);\n\
             -- Down migration\nDROP TABLE members;\n",
        )
        .unwrap();

        let locator = SqlFileLocator::new([a.path(), b.path()]);
        let err = locator
            .locate("2024_01_01_000001_create_users_table")
            .await
            .err()
            .expect("expected an error");
        match err {
            SmartMigrationError::AmbiguousDefinition { candidates, .. } => {
                assert_eq!(candidates.len(), 2)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_down_runs_split_statements() {
        let migration = SqlMigration::new(
            "2024_01_02_000001_add_email_to_users_table",
            "ALTER TABLE users ADD COLUMN email VARCHAR(255);",
            "ALTER TABLE users DROP COLUMN email;",
        );
        let schema = CapturingSchema::default();
        migration.down(&schema).await.unwrap();

        let executed = schema.executed.lock().unwrap();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].contains("DROP COLUMN email"));
    }

    #[tokio::test]
    async fn test_empty_down_is_a_no_op() {
        let migration = SqlMigration::new(
            "2024_01_01_000001_create_users_table",
            "CREATE TABLE users (id INTEGER);",
            "",
        );
        let schema = CapturingSchema::default();
        migration.down(&schema).await.unwrap();
        assert!(schema.executed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_discover() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("2024_01_02_000001_add_email_to_users_table.sql"), "").unwrap();
        fs::write(dir.path().join("2024_01_01_000001_create_users_table.sql"), "").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();

        let locator =
            SqlFileLocator::new([dir.path().to_path_buf(), PathBuf::from("/nonexistent/smart")]);
        assert_eq!(
            locator.discover().unwrap(),
            vec![
                "2024_01_01_000001_create_users_table".to_string(),
                "2024_01_02_000001_add_email_to_users_table".to_string(),
            ]
        );
    }
}
