//! Error types for the migration rollback engine
//!
//! Precondition failures (`NoMigrationsFound`, `ModelNotFound`,
//! `SelectionInvalid`) abort an operation before anything is mutated.
//! Per-record reversal failures are not errors at this level; they are
//! reported inside [`crate::executor::RollbackResult`].

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for rollback engine operations
pub type SmartResult<T> = Result<T, SmartMigrationError>;

/// Error types for migration lookup, selection and reversal
#[derive(Debug, Error)]
pub enum SmartMigrationError {
    /// No ledger record matched the requested table, model or batch
    #[error("No migrations found for {target}")]
    NoMigrationsFound { target: String },

    /// Model reference did not resolve to a registered persistence model
    #[error("Model '{model}' not found or is not a persistence model")]
    ModelNotFound { model: String },

    /// Selected migrations failed the safety checks
    #[error("Invalid rollback selection: {reason}")]
    SelectionInvalid { reason: String },

    /// More than one distinct definition was found for an identifier
    #[error("Ambiguous definition for migration '{identifier}': {}", candidates.join(", "))]
    AmbiguousDefinition {
        identifier: String,
        candidates: Vec<String>,
    },

    /// A migration's down operation failed
    #[error("Failed to reverse migration '{identifier}': {message}")]
    Reversal { identifier: String, message: String },

    /// Database connection or query error
    #[error("Database error: {0}")]
    Database(String),

    /// Migration definition could not be read or parsed
    #[error("Definition error: {0}")]
    Definition(String),

    /// Audit sink failure
    #[error("Audit error: {0}")]
    Audit(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SmartMigrationError {
    /// Create a new `NoMigrationsFound` error
    pub fn no_migrations<T: ToString>(target: T) -> Self {
        Self::NoMigrationsFound {
            target: target.to_string(),
        }
    }

    /// Create a new `SelectionInvalid` error
    pub fn selection_invalid<T: ToString>(reason: T) -> Self {
        Self::SelectionInvalid {
            reason: reason.to_string(),
        }
    }

    /// Create a new `Reversal` error
    pub fn reversal<I: ToString, M: ToString>(identifier: I, message: M) -> Self {
        Self::Reversal {
            identifier: identifier.to_string(),
            message: message.to_string(),
        }
    }

    /// True for errors raised before any ledger or schema mutation.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NoMigrationsFound { .. }
                | Self::ModelNotFound { .. }
                | Self::SelectionInvalid { .. }
        )
    }
}

impl From<sqlx::Error> for SmartMigrationError {
    fn from(err: sqlx::Error) -> Self {
        SmartMigrationError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for SmartMigrationError {
    fn from(err: serde_json::Error) -> Self {
        SmartMigrationError::Audit(err.to_string())
    }
}
