mod commands;
mod output;

use clap::{Args, Parser, Subcommand};
use console::style;
use smart_migrations::{RollbackOptions, SmartMigrationError};
use std::path::PathBuf;
use std::process::ExitCode;

use commands::{Context, Outcome};

#[derive(Parser)]
#[command(name = "smart-migrate")]
#[command(about = "Table, model and batch aware migration rollbacks")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Configuration file (defaults to ./smart-migrations.toml when present)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL, overrides configuration and DATABASE_URL
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Namespace for short model names
    #[arg(long, global = true)]
    pub namespace: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Roll back migrations
    Rollback {
        #[command(subcommand)]
        rollback_command: RollbackCommands,
    },

    /// List executed migrations
    List {
        #[command(subcommand)]
        list_command: TargetCommands,
    },

    /// Show migration status for a table or model
    Status {
        #[command(subcommand)]
        status_command: TargetCommands,
    },

    /// Show foreign keys around a table
    Dependencies {
        /// Table name
        table: String,
    },

    /// List executed batch numbers
    Batches,
}

#[derive(Subcommand)]
enum RollbackCommands {
    /// Roll back migrations affecting a table
    Table {
        /// Table name
        table: String,

        #[command(flatten)]
        selection: SelectionArgs,

        #[command(flatten)]
        confirm: ConfirmArgs,
    },

    /// Roll back migrations affecting a model's table
    Model {
        /// Model name, short (`User`) or fully qualified
        model: String,

        #[command(flatten)]
        selection: SelectionArgs,

        #[command(flatten)]
        confirm: ConfirmArgs,
    },

    /// Roll back one batch
    Batch {
        /// Batch number
        batch: i64,

        #[command(flatten)]
        selection: BatchSelectionArgs,

        #[command(flatten)]
        confirm: ConfirmArgs,
    },

    /// Roll back a single migration by identifier or timestamp prefix
    Migration {
        /// Identifier or prefix, e.g. 2024_01_01_000001
        identifier: String,

        #[command(flatten)]
        confirm: ConfirmArgs,
    },
}

#[derive(Subcommand)]
enum TargetCommands {
    /// By table name
    Table {
        /// Table name
        table: String,
    },

    /// By model name
    Model {
        /// Model name
        model: String,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Only the most recent matching migration
    #[arg(long)]
    pub latest: bool,

    /// Only the oldest matching migration
    #[arg(long)]
    pub oldest: bool,

    /// Only migrations in this batch
    #[arg(long)]
    pub batch: Option<i64>,

    /// Every matching migration
    #[arg(long)]
    pub all: bool,

    /// Allow rolling back across several batches
    #[arg(long)]
    pub force: bool,
}

impl From<SelectionArgs> for RollbackOptions {
    fn from(args: SelectionArgs) -> Self {
        RollbackOptions {
            latest: args.latest,
            oldest: args.oldest,
            batch: args.batch,
            all: args.all,
            force: args.force,
        }
    }
}

/// Narrows a batch rollback; the batch itself comes from the positional argument
#[derive(Args, Debug, Clone, Default)]
pub struct BatchSelectionArgs {
    /// Only the most recent migration in the batch
    #[arg(long, conflicts_with = "oldest")]
    pub latest: bool,

    /// Only the oldest migration in the batch
    #[arg(long)]
    pub oldest: bool,
}

impl From<BatchSelectionArgs> for RollbackOptions {
    fn from(args: BatchSelectionArgs) -> Self {
        RollbackOptions {
            latest: args.latest,
            oldest: args.oldest,
            ..RollbackOptions::new()
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConfirmArgs {
    /// Show what would be rolled back without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(long, short)]
    pub yes: bool,
}

async fn run(cli: Cli) -> anyhow::Result<Outcome> {
    let ctx = Context::connect(&cli.global).await?;

    match cli.command {
        Commands::Rollback { rollback_command } => match rollback_command {
            RollbackCommands::Table {
                table,
                selection,
                confirm,
            } => commands::rollback::table(&ctx, &table, &selection.into(), &confirm).await,
            RollbackCommands::Model {
                model,
                selection,
                confirm,
            } => commands::rollback::model(&ctx, &model, &selection.into(), &confirm).await,
            RollbackCommands::Batch {
                batch,
                selection,
                confirm,
            } => commands::rollback::batch(&ctx, batch, &selection.into(), &confirm).await,
            RollbackCommands::Migration { identifier, confirm } => {
                commands::rollback::migration(&ctx, &identifier, &confirm).await
            }
        },
        Commands::List { list_command } => match list_command {
            TargetCommands::Table { table } => commands::list::table(&ctx, &table).await,
            TargetCommands::Model { model } => commands::list::model(&ctx, &model).await,
        },
        Commands::Status { status_command } => match status_command {
            TargetCommands::Table { table } => commands::status::table(&ctx, &table).await,
            TargetCommands::Model { model } => commands::status::model(&ctx, &model).await,
        },
        Commands::Dependencies { table } => commands::dependencies::run(&ctx, &table).await,
        Commands::Batches => commands::batches::run(&ctx).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            match e.downcast_ref::<SmartMigrationError>() {
                Some(err) if err.is_precondition() => {
                    eprintln!("{} {}", style("✗").red(), err);
                }
                _ => eprintln!("{} {:#}", style("Error:").red().bold(), e),
            }
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_rollback_table_flags() {
        let cli = Cli::parse_from([
            "smart-migrate",
            "rollback",
            "table",
            "users",
            "--all",
            "--force",
            "--dry-run",
            "--json",
        ]);
        assert!(cli.global.json);
        match cli.command {
            Commands::Rollback {
                rollback_command: RollbackCommands::Table {
                    table,
                    selection,
                    confirm,
                },
            } => {
                assert_eq!(table, "users");
                let options: RollbackOptions = selection.into();
                assert!(options.all && options.force);
                assert!(confirm.dry_run);
                assert!(!confirm.yes);
            }
            _ => panic!("expected rollback table"),
        }
    }

    #[test]
    fn test_rollback_batch_and_migration() {
        let cli = Cli::parse_from(["smart-migrate", "rollback", "batch", "3", "-y"]);
        assert!(matches!(
            cli.command,
            Commands::Rollback {
                rollback_command: RollbackCommands::Batch { batch: 3, .. }
            }
        ));

        let cli = Cli::parse_from([
            "smart-migrate",
            "rollback",
            "batch",
            "2",
            "--oldest",
            "--dry-run",
        ]);
        match cli.command {
            Commands::Rollback {
                rollback_command:
                    RollbackCommands::Batch {
                        batch,
                        selection,
                        confirm,
                    },
            } => {
                assert_eq!(batch, 2);
                let options: RollbackOptions = selection.into();
                assert!(options.oldest && !options.latest);
                assert_eq!(options.batch, None);
                assert!(confirm.dry_run);
            }
            _ => panic!("expected rollback batch"),
        }

        let conflicting = Cli::try_parse_from([
            "smart-migrate",
            "rollback",
            "batch",
            "2",
            "--latest",
            "--oldest",
        ]);
        assert!(conflicting.is_err());

        let cli = Cli::parse_from(["smart-migrate", "rollback", "migration", "2024_01_01"]);
        assert!(matches!(
            cli.command,
            Commands::Rollback {
                rollback_command: RollbackCommands::Migration { .. }
            }
        ));
    }

    #[test]
    fn test_status_model_with_namespace() {
        let cli = Cli::parse_from([
            "smart-migrate",
            "--namespace",
            "crm::models",
            "status",
            "model",
            "Lead",
        ]);
        assert_eq!(cli.global.namespace.as_deref(), Some("crm::models"));
        assert!(matches!(
            cli.command,
            Commands::Status {
                status_command: TargetCommands::Model { .. }
            }
        ));
    }
}
