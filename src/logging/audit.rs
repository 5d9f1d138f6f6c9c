//! Audit trail for achievement workflow events
//!
//! Every successful transition and every orphaned resource becomes an
//! [`AuditEvent`]. Events go to `tracing` under the `merit::audit` target and,
//! when configured, are appended to a JSONL file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::lifecycle::status::AchievementStatus;

/// Audit event kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    DraftCreated,
    Submitted,
    Verified,
    Rejected,
    Updated,
    Deleted,
    AttachmentAdded,
    PointsAdjusted,
    /// Draft compensation removed the document record
    RecordCompensated,
    /// A document record exists with no reference pointing at it
    OrphanedRecord,
    /// A stored file is referenced by no record
    OrphanedFile,
}

impl AuditAction {
    pub fn is_orphan(&self) -> bool {
        matches!(self, Self::OrphanedRecord | Self::OrphanedFile)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    /// Acting user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Reference id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievement_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AchievementStatus>,
    /// Stored file name or URL, for attachment and orphan-file events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Failure description for compensation and orphan events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(action: AuditAction) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            actor: None,
            achievement_id: None,
            record_id: None,
            student_id: None,
            status: None,
            file: None,
            error: None,
        }
    }

    pub fn with_actor(mut self, user_id: &str) -> Self {
        self.actor = Some(user_id.to_string());
        self
    }

    pub fn with_achievement(mut self, id: &str) -> Self {
        self.achievement_id = Some(id.to_string());
        self
    }

    pub fn with_record(mut self, record_id: &str) -> Self {
        self.record_id = Some(record_id.to_string());
        self
    }

    pub fn with_student(mut self, student_id: &str) -> Self {
        self.student_id = Some(student_id.to_string());
        self
    }

    pub fn with_status(mut self, status: AchievementStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_file(mut self, file: &str) -> Self {
        self.file = Some(file.to_string());
        self
    }

    pub fn with_error(mut self, error: impl std::fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Audit logger; always traces, optionally appends to a JSONL file.
#[derive(Clone, Default)]
pub struct AuditLogger {
    inner: Arc<Mutex<AuditLoggerInner>>,
}

#[derive(Default)]
struct AuditLoggerInner {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize file logging to the specified path
    pub async fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut inner = self.inner.lock().await;
        inner.writer = Some(BufWriter::new(file));
        inner.path = Some(path.clone());

        info!("Audit logging initialized to {}", path.display());
        Ok(())
    }

    pub async fn log(&self, event: AuditEvent) {
        let jsonl = match event.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        if event.action.is_orphan() {
            warn!(target: "merit::audit", event = %jsonl, "Orphaned resource");
        } else {
            info!(target: "merit::audit", event = %jsonl, "Audit");
        }

        let mut inner = self.inner.lock().await;
        if let Some(ref mut writer) = inner.writer {
            if let Err(e) = writeln!(writer, "{}", jsonl) {
                error!("Failed to write audit event: {}", e);
            }
            if let Err(e) = writer.flush() {
                error!("Failed to flush audit log: {}", e);
            }
        }
    }

    pub async fn path(&self) -> Option<PathBuf> {
        self.inner.lock().await.path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_skips_empty_fields() {
        let event = AuditEvent::new(AuditAction::Submitted)
            .with_actor("u1")
            .with_achievement("a1")
            .with_status(AchievementStatus::Submitted);
        let line = event.to_jsonl().unwrap();

        assert!(line.contains("\"action\":\"submitted\""));
        assert!(line.contains("\"status\":\"submitted\""));
        assert!(!line.contains("record_id"));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_orphan_actions() {
        assert!(AuditAction::OrphanedRecord.is_orphan());
        assert!(AuditAction::OrphanedFile.is_orphan());
        assert!(!AuditAction::RecordCompensated.is_orphan());
    }

    #[tokio::test]
    async fn test_file_logging_appends_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let logger = AuditLogger::new();
        logger.init_file(path.clone()).await.unwrap();

        logger
            .log(
                AuditEvent::new(AuditAction::OrphanedRecord)
                    .with_record("rec-1")
                    .with_error("reference insert failed"),
            )
            .await;
        logger
            .log(AuditEvent::new(AuditAction::DraftCreated).with_record("rec-2"))
            .await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: AuditEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.action, AuditAction::OrphanedRecord);
        assert_eq!(first.record_id.as_deref(), Some("rec-1"));
        assert_eq!(logger.path().await, Some(path));
    }
}
