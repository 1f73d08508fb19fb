//! Resolvers mapping migrations and models to the tables they affect

pub mod model_table;
pub mod table_name;

pub use model_table::{Model, ModelCatalog, ModelEntry, ModelTableResolver};
pub use table_name::{
    ClassNameHeuristic, DefinitionInspection, MigrationNameHeuristic, ResolveInput,
    TableNameResolver, TableNameStrategy,
};
