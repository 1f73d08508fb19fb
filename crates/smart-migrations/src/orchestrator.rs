//! `SmartMigrations` - table, model, batch and single-migration rollbacks
//!
//! Every rollback is planned first (lookup, selection, safety checks,
//! advisory foreign-key report) and only then executed. Planning never
//! mutates anything, which is what the CLI's dry-run and confirmation use.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::audit::{AuditTrail, JsonLinesAuditSink};
use crate::config::{ConfigError, SmartMigrationsConfig};
use crate::database::{Database, DetachedSchema, SchemaCatalog, SchemaExecutor};
use crate::definitions::{ChainLocator, DefinitionLocator, SqlFileLocator};
use crate::error::{SmartMigrationError, SmartResult};
use crate::executor::{LedgerCleanup, RollbackExecutor, RollbackResult, RollbackSummary};
use crate::inspector::{DependencyInspector, DependencyReport};
use crate::ledger::{LedgerSchema, LedgerStore, MigrationLedger, MigrationRecord, SqlLedgerStore};
use crate::resolvers::{ModelCatalog, ModelTableResolver, TableNameResolver};
use crate::selector::{distinct_batches, RollbackOptions, RollbackSelector};

/// What a rollback was asked to undo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RollbackTarget {
    Table { table: String },
    Model { model: String, table: String },
    Batch { batch: i64 },
    Migration { identifier: String },
}

impl fmt::Display for RollbackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackTarget::Table { table } => write!(f, "table '{}'", table),
            RollbackTarget::Model { model, table } => {
                write!(f, "model '{}' (table '{}')", model, table)
            }
            RollbackTarget::Batch { batch } => write!(f, "batch {}", batch),
            RollbackTarget::Migration { identifier } => write!(f, "migration '{}'", identifier),
        }
    }
}

/// A validated selection, ready to execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackPlan {
    pub target: RollbackTarget,
    /// Execution order, newest first
    pub selection: Vec<MigrationRecord>,
    pub batches: Vec<i64>,
    /// Advisory only
    pub dependencies: Vec<DependencyReport>,
}

impl RollbackPlan {
    pub fn len(&self) -> usize {
        self.selection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selection.is_empty()
    }

    /// Foreign-key warnings across every inspected table
    pub fn warnings(&self) -> Vec<String> {
        self.dependencies.iter().flat_map(DependencyReport::warnings).collect()
    }
}

/// Read model for `status` queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStatus {
    pub table: String,
    pub count: usize,
    pub batches: Vec<i64>,
    /// 0 when nothing is recorded
    pub latest_batch: i64,
}

/// The rollback engine with its collaborators
#[derive(Debug, Clone)]
pub struct SmartMigrations {
    ledger: MigrationLedger,
    models: ModelTableResolver,
    inspector: DependencyInspector,
    selector: RollbackSelector,
    executor: RollbackExecutor,
    audit: AuditTrail,
}

impl SmartMigrations {
    pub fn builder() -> SmartMigrationsBuilder {
        SmartMigrationsBuilder::new()
    }

    /// Connect using configuration: SQL ledger, SQL-file definitions, catalog
    pub async fn connect(config: &SmartMigrationsConfig) -> SmartResult<Self> {
        config.validate()?;
        let url = config.require_database_url()?;
        let db = Arc::new(Database::connect(url).await?);
        tracing::info!(
            backend = %db.backend(),
            table = %config.ledger.table,
            "connected to migration ledger"
        );

        SmartMigrationsBuilder::from_config(config)
            .database(db, config.ledger.clone())
            .build()
    }

    pub fn ledger(&self) -> &MigrationLedger {
        &self.ledger
    }

    pub fn models(&self) -> &ModelTableResolver {
        &self.models
    }

    pub fn inspector(&self) -> &DependencyInspector {
        &self.inspector
    }

    pub fn cleanup(&self) -> LedgerCleanup {
        self.executor.cleanup()
    }

    pub fn set_model_namespace(&mut self, namespace: &str) {
        self.models.set_namespace(namespace);
    }

    /// Plan a rollback of migrations affecting `table`
    pub async fn plan_table_rollback(
        &self,
        table: &str,
        options: &RollbackOptions,
    ) -> SmartResult<RollbackPlan> {
        let candidates = self.ledger.records_for_table(table).await?;
        if candidates.is_empty() {
            return Err(SmartMigrationError::no_migrations(format!("table '{}'", table)));
        }

        let selection = self.selector.select_and_check(&candidates, options)?;
        let dependencies = vec![self.inspector.dependencies(table).await];
        Ok(Self::plan(
            RollbackTarget::Table {
                table: table.to_string(),
            },
            selection,
            dependencies,
        ))
    }

    /// Plan a rollback for the table behind `model`; unknown models fail before the ledger is read
    pub async fn plan_model_rollback(
        &self,
        model: &str,
        options: &RollbackOptions,
    ) -> SmartResult<RollbackPlan> {
        let table = self.models.resolve_table(model)?;
        let mut plan = self.plan_table_rollback(&table, options).await?;
        plan.target = RollbackTarget::Model {
            model: self.models.build_fully_qualified_name(model),
            table,
        };
        Ok(plan)
    }

    pub async fn plan_batch_rollback(
        &self,
        batch: i64,
        options: &RollbackOptions,
    ) -> SmartResult<RollbackPlan> {
        let candidates = self.ledger.records_for_batch(batch).await?;
        if candidates.is_empty() {
            return Err(SmartMigrationError::no_migrations(format!("batch {}", batch)));
        }

        let selection = self.selector.select_and_check(&candidates, options)?;
        let dependencies = self.dependencies_for(&selection).await;
        Ok(Self::plan(RollbackTarget::Batch { batch }, selection, dependencies))
    }

    /// Plan the rollback of one migration, by identifier or timestamp prefix
    pub async fn plan_migration_rollback(&self, prefix: &str) -> SmartResult<RollbackPlan> {
        let record = self
            .find_migration(prefix)
            .await?
            .ok_or_else(|| SmartMigrationError::no_migrations(format!("migration '{}'", prefix)))?;

        let selection = vec![record];
        self.selector.check(&selection, false)?;
        let dependencies = self.dependencies_for(&selection).await;
        Ok(Self::plan(
            RollbackTarget::Migration {
                identifier: selection[0].identifier.clone(),
            },
            selection,
            dependencies,
        ))
    }

    /// Execute a plan. Per-record failures are in the results, not the error.
    pub async fn execute_plan(&self, plan: &RollbackPlan) -> SmartResult<Vec<RollbackResult>> {
        for warning in plan.warnings() {
            tracing::warn!("{}", warning);
        }
        tracing::info!(rollback = %plan.target, migrations = plan.len(), "rolling back");

        let target = plan.target.to_string();
        self.audit.started(&target, &plan.selection).await;

        let mut results = Vec::with_capacity(plan.selection.len());
        for record in &plan.selection {
            let result = self.executor.reverse_one(record).await;
            self.audit.record(&target, &result).await;
            results.push(result);
        }

        let summary = RollbackSummary::from_results(&results);
        if summary.all_succeeded() {
            tracing::info!(
                rollback = %plan.target,
                reversed = summary.succeeded,
                "rollback complete"
            );
        } else {
            tracing::warn!(
                rollback = %plan.target,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "rollback finished with failures"
            );
        }

        self.audit.finished(&target, &results).await;
        Ok(results)
    }

    pub async fn rollback_by_table(
        &self,
        table: &str,
        options: &RollbackOptions,
    ) -> SmartResult<Vec<RollbackResult>> {
        let plan = self.plan_table_rollback(table, options).await?;
        self.execute_plan(&plan).await
    }

    pub async fn rollback_by_model(
        &self,
        model: &str,
        options: &RollbackOptions,
    ) -> SmartResult<Vec<RollbackResult>> {
        let plan = self.plan_model_rollback(model, options).await?;
        self.execute_plan(&plan).await
    }

    pub async fn rollback_by_batch(
        &self,
        batch: i64,
        options: &RollbackOptions,
    ) -> SmartResult<Vec<RollbackResult>> {
        let plan = self.plan_batch_rollback(batch, options).await?;
        self.execute_plan(&plan).await
    }

    pub async fn rollback_migration(&self, prefix: &str) -> SmartResult<Vec<RollbackResult>> {
        let plan = self.plan_migration_rollback(prefix).await?;
        self.execute_plan(&plan).await
    }

    /// Ledger records for a table, ascending
    pub async fn list_for_table(&self, table: &str) -> SmartResult<Vec<MigrationRecord>> {
        self.ledger.records_for_table(table).await
    }

    pub async fn list_for_model(&self, model: &str) -> SmartResult<Vec<MigrationRecord>> {
        let table = self.models.resolve_table(model)?;
        self.list_for_table(&table).await
    }

    pub async fn status_for_table(&self, table: &str) -> SmartResult<TableStatus> {
        let records = self.ledger.records_for_table(table).await?;
        let batches = distinct_batches(&records);
        Ok(TableStatus {
            table: table.to_string(),
            count: records.len(),
            latest_batch: batches.last().copied().unwrap_or(0),
            batches,
        })
    }

    pub async fn status_for_model(&self, model: &str) -> SmartResult<TableStatus> {
        let table = self.models.resolve_table(model)?;
        self.status_for_table(&table).await
    }

    pub async fn executed_batches(&self) -> SmartResult<Vec<i64>> {
        self.ledger.executed_batches().await
    }

    pub async fn dependencies(&self, table: &str) -> DependencyReport {
        self.inspector.dependencies(table).await
    }

    /// Exact identifier first, then the oldest prefix match
    pub async fn find_migration(&self, prefix: &str) -> SmartResult<Option<MigrationRecord>> {
        let records = self.ledger.records().await?;
        if let Some(exact) = records.iter().find(|r| r.identifier == prefix) {
            return Ok(Some(exact.clone()));
        }
        self.ledger.record_by_identifier_prefix(prefix).await
    }

    async fn dependencies_for(&self, selection: &[MigrationRecord]) -> Vec<DependencyReport> {
        let mut tables = BTreeSet::new();
        for record in selection {
            if let Some(table) = self.ledger.table_for(&record.identifier).await {
                tables.insert(table);
            }
        }

        let mut reports = Vec::with_capacity(tables.len());
        for table in tables {
            reports.push(self.inspector.dependencies(&table).await);
        }
        reports
    }

    fn plan(
        target: RollbackTarget,
        selection: Vec<MigrationRecord>,
        dependencies: Vec<DependencyReport>,
    ) -> RollbackPlan {
        RollbackPlan {
            target,
            batches: distinct_batches(&selection),
            selection,
            dependencies,
        }
    }
}

/// Assembles a [`SmartMigrations`] from its parts
#[derive(Default)]
pub struct SmartMigrationsBuilder {
    store: Option<Arc<dyn LedgerStore>>,
    schema: Option<Arc<dyn SchemaExecutor>>,
    catalog: Option<Arc<dyn SchemaCatalog>>,
    locators: Vec<Arc<dyn DefinitionLocator>>,
    migration_paths: Vec<PathBuf>,
    table_resolver: Option<Arc<TableNameResolver>>,
    models: ModelTableResolver,
    audit: AuditTrail,
    cleanup: LedgerCleanup,
}

impl SmartMigrationsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Models, namespace, migration paths, audit and cleanup policy from configuration
    pub fn from_config(config: &SmartMigrationsConfig) -> Self {
        let mut audit = AuditTrail::disabled();
        if config.audit.enabled {
            audit = audit.with_sink(Arc::new(JsonLinesAuditSink::new(config.audit.path.clone())));
        }

        Self {
            migration_paths: config.migration_paths.clone(),
            models: ModelTableResolver::with_namespace(
                ModelCatalog::from_entries(&config.models),
                &config.model_namespace,
            ),
            audit,
            cleanup: config.ledger_cleanup,
            ..Self::default()
        }
    }

    /// Use one database for the ledger, reversal statements and catalog reads
    pub fn database(mut self, db: Arc<Database>, schema: LedgerSchema) -> Self {
        self.store = Some(Arc::new(SqlLedgerStore::new(db.clone(), schema)));
        self.schema = Some(db.clone());
        self.catalog = Some(db);
        self
    }

    pub fn ledger_store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn schema_executor(mut self, schema: Arc<dyn SchemaExecutor>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn SchemaCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Add a definition locator; locators added here are consulted before SQL files
    pub fn definitions(mut self, locator: Arc<dyn DefinitionLocator>) -> Self {
        self.locators.push(locator);
        self
    }

    pub fn migration_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.migration_paths.push(path.into());
        self
    }

    pub fn table_resolver(mut self, resolver: TableNameResolver) -> Self {
        self.table_resolver = Some(Arc::new(resolver));
        self
    }

    pub fn models(mut self, models: ModelTableResolver) -> Self {
        self.models = models;
        self
    }

    pub fn audit(mut self, audit: AuditTrail) -> Self {
        self.audit = audit;
        self
    }

    pub fn ledger_cleanup(mut self, cleanup: LedgerCleanup) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn build(self) -> SmartResult<SmartMigrations> {
        let store = self.store.ok_or_else(|| ConfigError::MissingRequired {
            field: "ledger".to_string(),
            hint: "Provide a ledger store or a database connection".to_string(),
        })?;

        let mut chain = ChainLocator::new();
        for locator in self.locators {
            chain = chain.with(locator);
        }
        if !self.migration_paths.is_empty() {
            chain = chain.with(Arc::new(SqlFileLocator::new(self.migration_paths)));
        }
        let definitions: Arc<dyn DefinitionLocator> = Arc::new(chain);

        let ledger = MigrationLedger::new(store)
            .with_resolver(self.table_resolver.unwrap_or_default())
            .with_definitions(definitions.clone());

        let schema = self.schema.unwrap_or_else(|| Arc::new(DetachedSchema));
        let executor =
            RollbackExecutor::new(ledger.clone(), definitions, schema).with_cleanup(self.cleanup);

        let inspector = match self.catalog {
            Some(catalog) => DependencyInspector::new(catalog),
            None => DependencyInspector::disabled(),
        };

        Ok(SmartMigrations {
            ledger,
            models: self.models,
            inspector,
            selector: RollbackSelector::new(),
            executor,
            audit: self.audit,
        })
    }
}
