//! # smart-migrations: table-aware migration rollbacks
//!
//! Reads the migration ledger, works out which table each executed
//! migration touched, and rolls back by table, model, batch or single
//! migration with batch-safety checks and advisory foreign-key warnings.
//!
//! ```no_run
//! use smart_migrations::{RollbackOptions, SmartMigrations, SmartMigrationsConfig};
//!
//! # async fn run() -> smart_migrations::SmartResult<()> {
//! let config = SmartMigrationsConfig::load(None)?;
//! let engine = SmartMigrations::connect(&config).await?;
//! let results = engine.rollback_by_table("users", &RollbackOptions::latest()).await?;
//! for result in results {
//!     println!("{} -> {}", result.identifier, result.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod database;
pub mod definitions;
pub mod error;
pub mod executor;
pub mod inspector;
pub mod ledger;
pub mod logging;
pub mod naming;
pub mod orchestrator;
pub mod resolvers;
pub mod selector;

pub use audit::{
    AuditEvent, AuditEventKind, AuditSink, AuditTrail, JsonLinesAuditSink, MemoryAuditSink,
};
pub use config::{ConfigError, ConfigSource, SmartMigrationsConfig};
pub use database::{Backend, Database, DetachedSchema, SchemaCatalog, SchemaExecutor};
pub use definitions::{
    ChainLocator, DefinitionLocator, EmptyLocator, RegistryLocator, ReversibleMigration,
    SqlFileLocator, SqlMigration,
};
pub use error::{SmartMigrationError, SmartResult};
pub use executor::{
    LedgerCleanup, ReversalStatus, RollbackExecutor, RollbackResult, RollbackSummary,
};
pub use inspector::{DependencyInspector, DependencyReport, ForeignKeyEdge};
pub use ledger::{
    InMemoryLedgerStore, LedgerSchema, LedgerStore, MigrationLedger, MigrationRecord,
    SqlLedgerStore,
};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use orchestrator::{
    RollbackPlan, RollbackTarget, SmartMigrations, SmartMigrationsBuilder, TableStatus,
};
pub use resolvers::{
    Model, ModelCatalog, ModelEntry, ModelTableResolver, TableNameResolver, TableNameStrategy,
};
pub use selector::{RollbackOptions, RollbackSelector, SelectionIntent};
