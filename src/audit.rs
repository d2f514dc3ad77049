//! Audit logging for operations that touch the nodes
//!
//! Every build, scrub, read and local check appends one JSON line to
//! `audit.log` in the state directory. Events from one CLI invocation share
//! a run id so they can be matched against the tracing output.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::core::policy::Target;

/// Types of auditable events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Build,
    Scrub,
    Read,
    Check,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    pub run_id: Uuid,

    pub event_type: EventType,

    pub success: bool,

    /// Additional structured data about the event
    pub details: serde_json::Value,

    /// Error message if the operation failed
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(
        run_id: Uuid,
        event_type: EventType,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            run_id,
            event_type,
            success,
            details,
            error,
        }
    }

    /// One-line rendering for `podfw audit`
    pub fn summary(&self) -> String {
        let target = match (
            self.details.get("namespace").and_then(serde_json::Value::as_str),
            self.details.get("table").and_then(serde_json::Value::as_str),
        ) {
            (Some(namespace), Some(table)) => format!(" {namespace}/{table}"),
            _ => String::new(),
        };
        let status = if self.success { "ok" } else { "FAILED" };

        let mut line = format!(
            "{} {} {:?}{} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.run_id,
            self.event_type,
            target,
            status
        );
        if let Some(error) = &self.error {
            line.push_str(": ");
            line.push_str(error.lines().next().unwrap_or_default());
        }
        line
    }
}

/// Audit log writer
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Opens the log in the state directory
    ///
    /// # Errors
    ///
    /// Returns `Err` if state directory cannot be determined
    pub fn new() -> std::io::Result<Self> {
        let mut log_path = crate::utils::get_state_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;
        log_path.push("audit.log");

        Ok(Self { log_path })
    }

    /// Opens the log at an explicit path
    pub fn at(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    /// Appends an event to the audit log
    ///
    /// Events are written as JSON-lines format (one JSON object per line)
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be opened or written
    pub async fn log(&self, event: &AuditEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(event)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Reads the most recent events from the log, newest first
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be read
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = tokio::fs::read_to_string(&self.log_path).await?;

        let events: Vec<AuditEvent> = content
            .lines()
            .rev()
            .take(count)
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();

        Ok(events)
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

async fn record(event: AuditEvent) {
    if let Err(e) = crate::utils::ensure_dirs() {
        tracing::warn!("Failed to create state directory: {}", e);
        return;
    }
    if let Ok(audit) = AuditLog::new()
        && let Err(e) = audit.log(&event).await
    {
        tracing::warn!("Failed to write audit log: {}", e);
    }
}

fn target_details(target: &Target) -> serde_json::Value {
    serde_json::json!({
        "namespace": target.namespace,
        "table": target.table,
        "priority": target.priority,
    })
}

/// Logs a build across both nodes
pub async fn log_build(
    run_id: Uuid,
    target: &Target,
    checksum: &str,
    success: bool,
    error: Option<String>,
) {
    let mut details = target_details(target);
    details["checksum"] = serde_json::json!(checksum);
    record(AuditEvent::new(run_id, EventType::Build, success, details, error)).await;
}

/// Logs a scrub across both nodes
pub async fn log_scrub(run_id: Uuid, target: &Target, success: bool, error: Option<String>) {
    record(AuditEvent::new(
        run_id,
        EventType::Scrub,
        success,
        target_details(target),
        error,
    ))
    .await;
}

/// Logs a read; `differs` is whether the two nodes returned different tables
pub async fn log_read(run_id: Uuid, target: &Target, success: bool, differs: bool) {
    let mut details = target_details(target);
    details["differs"] = serde_json::json!(differs);
    record(AuditEvent::new(run_id, EventType::Read, success, details, None)).await;
}

/// Logs a local document check
pub async fn log_check(run_id: Uuid, rule_count: usize, success: bool, error: Option<String>) {
    record(AuditEvent::new(
        run_id,
        EventType::Check,
        success,
        serde_json::json!({ "rule_count": rule_count }),
        error,
    ))
    .await;
}
