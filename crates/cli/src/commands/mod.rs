pub mod batches;
pub mod dependencies;
pub mod list;
pub mod rollback;
pub mod status;

use anyhow::Context as _;
use smart_migrations::{init_logging, LoggingConfig, SmartMigrations, SmartMigrationsConfig};
use std::process::ExitCode;

use crate::GlobalArgs;

/// How a command finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Some migrations failed to reverse
    PartialFailure,
    /// Operator declined the confirmation prompt
    Cancelled,
}

impl Outcome {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Success | Outcome::Cancelled => ExitCode::SUCCESS,
            Outcome::PartialFailure => ExitCode::from(2),
        }
    }
}

/// Engine plus output settings shared by every command
pub struct Context {
    pub engine: SmartMigrations,
    pub json: bool,
}

impl Context {
    pub async fn connect(global: &GlobalArgs) -> anyhow::Result<Self> {
        let config = load_config(global)?;

        let logging = if global.verbose {
            LoggingConfig::verbose().with_format(config.logging.format)
        } else {
            LoggingConfig::from(&config.logging)
        };
        if let Err(e) = init_logging(&logging) {
            eprintln!("Failed to initialize logging: {}", e);
        }

        let engine = SmartMigrations::connect(&config)
            .await
            .context("Failed to open migration ledger")?;

        Ok(Self {
            engine,
            json: global.json,
        })
    }
}

/// Configuration file and environment, then command-line overrides
fn load_config(global: &GlobalArgs) -> anyhow::Result<SmartMigrationsConfig> {
    let mut config = SmartMigrationsConfig::load(global.config.as_deref())?;

    if let Some(url) = &global.database_url {
        config.database_url = Some(url.clone());
        config.mark_programmatic("database_url");
    }
    if let Some(namespace) = &global.namespace {
        config.model_namespace = namespace.clone();
        config.mark_programmatic("model_namespace");
    }

    config.validate()?;
    Ok(config)
}

/// Print a serializable value as pretty JSON
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
