//! Rollback audit trail
//!
//! Events are written to an [`AuditSink`] on a best-effort basis: a failing
//! sink is logged and otherwise ignored, so auditing can never change the
//! outcome of a rollback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;

use crate::error::{SmartMigrationError, SmartResult};
use crate::executor::{RollbackResult, RollbackSummary};
use crate::ledger::MigrationRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventKind {
    #[serde(rename = "rollback.started")]
    RollbackStarted,
    #[serde(rename = "rollback.record")]
    RollbackRecord,
    #[serde(rename = "rollback.finished")]
    RollbackFinished,
}

/// One audit line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: AuditEventKind,
    /// What the rollback was aimed at, e.g. `table users`
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<RollbackResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RollbackSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<String>,
}

impl AuditEvent {
    fn new(kind: AuditEventKind, target: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            target: target.to_string(),
            record: None,
            summary: None,
            identifiers: Vec::new(),
        }
    }

    pub fn started(target: &str, identifiers: Vec<String>) -> Self {
        Self {
            identifiers,
            ..Self::new(AuditEventKind::RollbackStarted, target)
        }
    }

    pub fn record(target: &str, result: &RollbackResult) -> Self {
        Self {
            record: Some(result.clone()),
            ..Self::new(AuditEventKind::RollbackRecord, target)
        }
    }

    pub fn finished(target: &str, results: &[RollbackResult]) -> Self {
        Self {
            summary: Some(RollbackSummary::from_results(results)),
            ..Self::new(AuditEventKind::RollbackFinished, target)
        }
    }
}

/// Destination for audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, event: &AuditEvent) -> SmartResult<()>;
}

/// Appends one JSON object per line
#[derive(Debug, Clone)]
pub struct JsonLinesAuditSink {
    path: PathBuf,
}

impl JsonLinesAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonLinesAuditSink {
    async fn write(&self, event: &AuditEvent) -> SmartResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Keeps events in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, event: &AuditEvent) -> SmartResult<()> {
        self.events
            .lock()
            .map_err(|_| SmartMigrationError::Audit("audit buffer poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }
}

/// Fans events out to the configured sinks
#[derive(Clone, Default)]
pub struct AuditTrail {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail").field("sinks", &self.sinks.len()).finish()
    }
}

impl AuditTrail {
    /// Trail with no sinks
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.sinks.is_empty()
    }

    /// Deliver an event; sink errors are logged, never returned
    pub async fn notify(&self, event: AuditEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.write(&event).await {
                tracing::warn!(kind = ?event.kind, "audit sink failed: {}", e);
            }
        }
    }

    /// Announce a rollback before any record is touched
    pub async fn started(&self, target: &str, records: &[MigrationRecord]) {
        if !self.is_enabled() {
            return;
        }
        let identifiers = records.iter().map(|r| r.identifier.clone()).collect();
        self.notify(AuditEvent::started(target, identifiers)).await;
    }

    pub async fn record(&self, target: &str, result: &RollbackResult) {
        if self.is_enabled() {
            self.notify(AuditEvent::record(target, result)).await;
        }
    }

    pub async fn finished(&self, target: &str, results: &[RollbackResult]) {
        if self.is_enabled() {
            self.notify(AuditEvent::finished(target, results)).await;
        }
    }
}
