//! Structured logging setup
//!
//! Thin wrapper around `tracing-subscriber` used by the CLI and by
//! embedders that do not install their own subscriber.

use serde::{Deserialize, Serialize};
use std::io;
use std::str::FromStr;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{ConfigError, LogSettings};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human readable output
    #[default]
    Plain,
    /// Multi-line output for development
    Pretty,
    /// JSON objects, one per line
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Ok(LogFormat::Plain),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidValue {
                field: "logging.format".to_string(),
                value: s.to_string(),
                expected: "plain, pretty or json".to_string(),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    pub format: LogFormat,
    /// Environment filter (e.g. "smart_migrations=debug,sqlx=warn")
    pub env_filter: Option<String>,
    /// Write to stderr instead of stdout
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
            env_filter: None,
            stderr: true,
        }
    }
}

impl From<&LogSettings> for LoggingConfig {
    fn from(settings: &LogSettings) -> Self {
        Self {
            level: settings.level.clone(),
            format: settings.format,
            ..Self::default()
        }
    }
}

impl LoggingConfig {
    /// Verbose logging for `--verbose` runs
    pub fn verbose() -> Self {
        Self {
            level: "debug".to_string(),
            env_filter: Some("smart_migrations=debug,sqlx=warn".to_string()),
            ..Self::default()
        }
    }

    /// Set environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Set output format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    fn filter_directive(&self) -> &str {
        self.env_filter.as_deref().unwrap_or(&self.level)
    }
}

/// Install a global subscriber. `RUST_LOG` takes precedence over the config.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directive()))?;

    let registry = tracing_subscriber::registry().with(filter);

    match (config.format, config.stderr) {
        (LogFormat::Json, true) => registry
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()?,
        (LogFormat::Json, false) => registry
            .with(Layer::new().with_writer(io::stdout).json())
            .try_init()?,
        (LogFormat::Pretty, true) => registry
            .with(Layer::new().with_writer(io::stderr).pretty())
            .try_init()?,
        (LogFormat::Pretty, false) => registry
            .with(Layer::new().with_writer(io::stdout).pretty())
            .try_init()?,
        (LogFormat::Plain, true) => registry.with(Layer::new().with_writer(io::stderr)).try_init()?,
        (LogFormat::Plain, false) => {
            registry.with(Layer::new().with_writer(io::stdout)).try_init()?
        }
    }

    tracing::debug!(level = %config.level, format = ?config.format, "logging initialized");
    Ok(())
}
