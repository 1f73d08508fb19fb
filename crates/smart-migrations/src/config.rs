//! Configuration for the rollback engine and the `smart-migrate` CLI
//!
//! Values come from three layers, later layers winning: built-in defaults,
//! an optional TOML file, and environment variables. The origin of each
//! overridden key is kept in a [`ConfigSource`] map for diagnostics.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::executor::LedgerCleanup;
use crate::ledger::LedgerSchema;
use crate::logging::LogFormat;
use crate::resolvers::model_table::ModelEntry;

/// Default namespace used to qualify short model names
pub const DEFAULT_MODEL_NAMESPACE: &str = "app::models";

/// Default configuration file looked up by the CLI
pub const DEFAULT_CONFIG_FILE: &str = "smart-migrations.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Parsing error in {path}: {message}")]
    ParsingError { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value loaded from environment variable
    EnvVar(String),
    /// Value loaded from file
    File(String),
    /// Value provided programmatically
    Programmatic,
}

impl ConfigSource {
    /// Get source description
    pub fn description(&self) -> String {
        match self {
            ConfigSource::EnvVar(var) => format!("Environment variable: {}", var),
            ConfigSource::File(path) => format!("Configuration file: {}", path),
            ConfigSource::Programmatic => "Programmatically set".to_string(),
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Audit trail settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Write rollback events to `path`
    pub enabled: bool,
    /// JSON-lines file receiving audit events
    pub path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("storage/logs/smart-migrations.jsonl"),
        }
    }
}

/// Logging settings as read from configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartMigrationsConfig {
    /// Database connection URL (`postgres://`, `mysql://`, `sqlite:`)
    pub database_url: Option<String>,
    /// Ledger table layout
    pub ledger: LedgerSchema,
    /// Directories searched for `<identifier>.sql` migration files
    pub migration_paths: Vec<PathBuf>,
    /// Namespace prepended to short model names
    pub model_namespace: String,
    /// Models known to the model resolver
    pub models: Vec<ModelEntry>,
    pub audit: AuditConfig,
    /// What happens to ledger records whose reversal did not succeed
    pub ledger_cleanup: LedgerCleanup,
    pub logging: LogSettings,
    #[serde(skip)]
    sources: HashMap<String, ConfigSource>,
}

impl Default for SmartMigrationsConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            ledger: LedgerSchema::default(),
            migration_paths: vec![PathBuf::from("migrations")],
            model_namespace: DEFAULT_MODEL_NAMESPACE.to_string(),
            models: Vec::new(),
            audit: AuditConfig::default(),
            ledger_cleanup: LedgerCleanup::default(),
            logging: LogSettings::default(),
            sources: HashMap::new(),
        }
    }
}

impl SmartMigrationsConfig {
    /// Load configuration: optional file, then environment, then validate.
    ///
    /// A missing file at the default location is not an error; an explicitly
    /// given path that does not exist is.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParsingError { message, .. } => ConfigError::ParsingError {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })?;

        let origin = ConfigSource::File(path.display().to_string());
        let table: toml::Table =
            content.parse().map_err(|e: toml::de::Error| ConfigError::ParsingError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        for key in table.keys() {
            config.sources.insert(key.clone(), origin.clone());
        }
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParsingError {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = Some(url);
            self.mark_env("database_url", "DATABASE_URL");
        }

        if let Some(table) = lookup("SMART_MIGRATIONS_TABLE") {
            self.ledger.table = table;
            self.mark_env("ledger", "SMART_MIGRATIONS_TABLE");
        }

        if let Some(paths) = lookup("SMART_MIGRATIONS_PATHS") {
            self.migration_paths = paths
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
            self.mark_env("migration_paths", "SMART_MIGRATIONS_PATHS");
        }

        if let Some(namespace) = lookup("SMART_MIGRATIONS_MODEL_NAMESPACE") {
            self.model_namespace = namespace;
            self.mark_env("model_namespace", "SMART_MIGRATIONS_MODEL_NAMESPACE");
        }

        if let Some(enabled) = lookup("SMART_MIGRATIONS_AUDIT") {
            self.audit.enabled = parse_bool("audit.enabled", &enabled)?;
            self.mark_env("audit", "SMART_MIGRATIONS_AUDIT");
        }

        if let Some(path) = lookup("SMART_MIGRATIONS_AUDIT_PATH") {
            self.audit.path = PathBuf::from(path);
            self.mark_env("audit", "SMART_MIGRATIONS_AUDIT_PATH");
        }

        if let Some(policy) = lookup("SMART_MIGRATIONS_LEDGER_CLEANUP") {
            self.ledger_cleanup = policy.parse()?;
            self.mark_env("ledger_cleanup", "SMART_MIGRATIONS_LEDGER_CLEANUP");
        }

        if let Some(level) = lookup("SMART_MIGRATIONS_LOG_LEVEL") {
            self.logging.level = level;
            self.mark_env("logging", "SMART_MIGRATIONS_LOG_LEVEL");
        }

        if let Some(format) = lookup("SMART_MIGRATIONS_LOG_FORMAT") {
            self.logging.format = format.parse()?;
            self.mark_env("logging", "SMART_MIGRATIONS_LOG_FORMAT");
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_sql_identifier(&self.ledger.table) {
            return Err(ConfigError::InvalidValue {
                field: "ledger.table".to_string(),
                value: self.ledger.table.clone(),
                expected: "a plain SQL identifier".to_string(),
            });
        }
        for (field, value) in [
            ("ledger.identifier_column", &self.ledger.identifier_column),
            ("ledger.batch_column", &self.ledger.batch_column),
        ] {
            if !is_sql_identifier(value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.clone(),
                    expected: "a plain SQL identifier".to_string(),
                });
            }
        }

        if self.model_namespace.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "model_namespace".to_string(),
                hint: "Set it in the config file or SMART_MIGRATIONS_MODEL_NAMESPACE".to_string(),
            });
        }

        if self.migration_paths.is_empty() {
            return Err(ConfigError::ValidationFailed {
                message: "at least one migration path is required".to_string(),
            });
        }

        if let Some(url) = &self.database_url {
            if !url.contains(':') {
                return Err(ConfigError::InvalidValue {
                    field: "database_url".to_string(),
                    value: url.clone(),
                    expected: "a URL such as postgres://, mysql:// or sqlite:".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Database URL or a `MissingRequired` error
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "database_url".to_string(),
                hint: "Set DATABASE_URL or database_url in smart-migrations.toml".to_string(),
            })
    }

    /// Where a top-level key was last set from, if not a default
    pub fn source_of(&self, key: &str) -> Option<&ConfigSource> {
        self.sources.get(key)
    }

    /// Record that a key was set programmatically
    pub fn mark_programmatic(&mut self, key: &str) {
        self.sources.insert(key.to_string(), ConfigSource::Programmatic);
    }

    fn mark_env(&mut self, key: &str, var: &str) {
        self.sources
            .insert(key.to_string(), ConfigSource::EnvVar(var.to_string()));
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            expected: "true or false".to_string(),
        }),
    }
}

pub(crate) fn is_sql_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SmartMigrationsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ledger.table, "migrations");
        assert_eq!(config.model_namespace, DEFAULT_MODEL_NAMESPACE);
        assert_eq!(config.ledger_cleanup, LedgerCleanup::Always);
        assert!(!config.audit.enabled);
    }

    #[test]
    fn test_from_toml_str() {
        let config = SmartMigrationsConfig::from_toml_str(
            r#"
            database_url = "sqlite::memory:"
            migration_paths = ["db/migrations", "modules/billing/migrations"]
            model_namespace = "shop::models"
            ledger_cleanup = "on-success"

            [ledger]
            table = "schema_migrations"

            [[models]]
            name = "shop::models::Order"

            [[models]]
            name = "shop::models::Person"
            table = "people"

            [[models]]
            name = "shop::models::Helpers"
            persistent = false
            "#,
        )
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(config.migration_paths.len(), 2);
        assert_eq!(config.ledger.table, "schema_migrations");
        assert_eq!(config.ledger.identifier_column, "migration");
        assert_eq!(config.ledger_cleanup, LedgerCleanup::OnSuccess);
        assert_eq!(config.models.len(), 3);
        assert_eq!(config.models[1].table.as_deref(), Some("people"));
        assert!(!config.models[2].persistent);
    }

    #[test]
    fn test_from_file_tracks_sources() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model_namespace = \"crm::models\"").unwrap();

        let config = SmartMigrationsConfig::from_file(file.path()).unwrap();
        assert_eq!(config.model_namespace, "crm::models");
        assert!(matches!(config.source_of("model_namespace"), Some(ConfigSource::File(_))));
        assert!(config.source_of("database_url").is_none());
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model_namespace = ").unwrap();

        let err = SmartMigrationsConfig::from_file(file.path()).unwrap_err();
        match err {
            ConfigError::ParsingError { path, .. } => {
                assert_eq!(path, file.path().display().to_string())
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_apply_env_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("DATABASE_URL", "postgres://localhost/app"),
            ("SMART_MIGRATIONS_PATHS", "db/migrations,vendor/migrations"),
            ("SMART_MIGRATIONS_AUDIT", "yes"),
            ("SMART_MIGRATIONS_LEDGER_CLEANUP", "on-success"),
            ("SMART_MIGRATIONS_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = SmartMigrationsConfig::default();
        config
            .apply_env_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(
            config.migration_paths,
            vec![PathBuf::from("db/migrations"), PathBuf::from("vendor/migrations")]
        );
        assert!(config.audit.enabled);
        assert_eq!(config.ledger_cleanup, LedgerCleanup::OnSuccess);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.source_of("database_url"),
            Some(&ConfigSource::EnvVar("DATABASE_URL".to_string()))
        );
    }

    #[test]
    fn test_env_paths_keep_drive_letters() {
        let mut config = SmartMigrationsConfig::default();
        config
            .apply_env_from(|key| {
                (key == "SMART_MIGRATIONS_PATHS")
                    .then(|| r"C:\app\migrations, D:\shared".to_string())
            })
            .unwrap();
        assert_eq!(
            config.migration_paths,
            vec![PathBuf::from(r"C:\app\migrations"), PathBuf::from(r"D:\shared")]
        );
    }

    #[test]
    fn test_apply_env_rejects_bad_bool() {
        let mut config = SmartMigrationsConfig::default();
        let err = config
            .apply_env_from(|key| (key == "SMART_MIGRATIONS_AUDIT").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    #[serial]
    fn test_apply_env_reads_process_environment() {
        env::set_var("SMART_MIGRATIONS_MODEL_NAMESPACE", "tenant_a::models");
        let mut config = SmartMigrationsConfig::default();
        config.apply_env().unwrap();
        env::remove_var("SMART_MIGRATIONS_MODEL_NAMESPACE");

        assert_eq!(config.model_namespace, "tenant_a::models");
    }

    #[test]
    fn test_validate_rejects_bad_ledger_table() {
        let mut config = SmartMigrationsConfig::default();
        config.ledger.table = "migrations; DROP TABLE users".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "ledger.table"
        ));
    }

    #[test]
    fn test_require_database_url() {
        let mut config = SmartMigrationsConfig::default();
        assert!(matches!(
            config.require_database_url(),
            Err(ConfigError::MissingRequired { .. })
        ));
        config.database_url = Some("sqlite::memory:".to_string());
        assert_eq!(config.require_database_url().unwrap(), "sqlite::memory:");
    }
}
