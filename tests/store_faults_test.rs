//! Store failure integration tests
//!
//! Wraps the real stores to inject failures and stalls:
//! - draft compensation when the reference insert fails
//! - orphan events when compensation itself fails
//! - store timeouts, including reference inserts that finish late
//! - validation that must run before any store call

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{draft_input, fast_timeout, Fixture};
use merit::db::records::{AchievementRecord, Attachment, NewRecord, RecordPatch, RecordStore};
use merit::db::relational::{AchievementReference, ReferenceStore};
use merit::db::{MemoryRecordStore, RelationalDb};
use merit::lifecycle::{AchievementStatus, EngineConfig, EngineStores, ListQuery, ListScope, RejectInput};
use merit::logging::AuditAction;
use merit::{MeritError, Result};

// =============================================================================
// Wrappers
// =============================================================================

/// Reference store that can refuse inserts or stall transitions, and counts
/// every call it receives.
struct FaultyReferences {
    inner: RelationalDb,
    fail_insert: bool,
    stall: Option<Duration>,
    calls: AtomicUsize,
}

impl FaultyReferences {
    fn new(inner: RelationalDb) -> Self {
        Self {
            inner,
            fail_insert: false,
            stall: None,
            calls: AtomicUsize::new(0),
        }
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
    }
}

#[async_trait]
impl ReferenceStore for FaultyReferences {
    async fn insert_draft(&self, student_id: &str, record_id: &str) -> Result<AchievementReference> {
        self.enter().await;
        if self.fail_insert {
            return Err(MeritError::Database("disk I/O error".into()));
        }
        self.inner.insert_draft(student_id, record_id).await
    }

    async fn get(&self, id: &str) -> Result<Option<AchievementReference>> {
        self.enter().await;
        self.inner.get(id).await
    }

    async fn submit(&self, id: &str, student_id: &str) -> Result<bool> {
        self.enter().await;
        self.inner.submit(id, student_id).await
    }

    async fn verify(&self, id: &str, lecturer_id: &str) -> Result<bool> {
        self.enter().await;
        self.inner.verify(id, lecturer_id).await
    }

    async fn reject(&self, id: &str, lecturer_id: &str, note: &str) -> Result<bool> {
        self.enter().await;
        self.inner.reject(id, lecturer_id, note).await
    }

    async fn mark_deleted(&self, id: &str, student_id: &str) -> Result<bool> {
        self.enter().await;
        self.inner.mark_deleted(id, student_id).await
    }

    async fn touch_owned(
        &self,
        id: &str,
        student_id: &str,
        allowed: &[AchievementStatus],
    ) -> Result<Option<String>> {
        self.enter().await;
        self.inner.touch_owned(id, student_id, allowed).await
    }

    async fn list(
        &self,
        scope: &ListScope,
        query: &ListQuery,
    ) -> Result<(Vec<AchievementReference>, u64)> {
        self.enter().await;
        self.inner.list(scope, query).await
    }

    async fn scan(
        &self,
        scope: &ListScope,
        status: Option<AchievementStatus>,
    ) -> Result<Vec<AchievementReference>> {
        self.enter().await;
        self.inner.scan(scope, status).await
    }
}

/// Record store whose hard delete always fails.
struct UndeletableRecords {
    inner: Arc<MemoryRecordStore>,
    calls: AtomicUsize,
}

#[async_trait]
impl RecordStore for UndeletableRecords {
    async fn insert(&self, record: NewRecord) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(record).await
    }

    async fn find(&self, id: &str) -> Result<Option<AchievementRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.find(id).await
    }

    async fn find_many(&self, ids: &[String]) -> Result<Vec<AchievementRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.find_many(ids).await
    }

    async fn apply_patch(&self, id: &str, patch: &RecordPatch) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.apply_patch(id, patch).await
    }

    async fn set_points(&self, id: &str, points: i64) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.set_points(id, points).await
    }

    async fn push_attachment(&self, id: &str, attachment: &Attachment) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.push_attachment(id, attachment).await
    }

    async fn delete(&self, _id: &str) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(MeritError::Database("connection reset".into()))
    }
}

/// Record store whose insert leaves the SQLite connection busy for `hold`,
/// so the reference insert that follows queues behind another caller.
struct ContendedRecords {
    inner: Arc<MemoryRecordStore>,
    db: RelationalDb,
    hold: Duration,
}

#[async_trait]
impl RecordStore for ContendedRecords {
    async fn insert(&self, record: NewRecord) -> Result<String> {
        let busy = self.db.clone();
        let hold = self.hold;
        tokio::spawn(async move {
            busy.call(move |_| {
                std::thread::sleep(hold);
                Ok(())
            })
            .await
        });
        // Give the blocking call time to take the lock.
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.inner.insert(record).await
    }

    async fn find(&self, id: &str) -> Result<Option<AchievementRecord>> {
        self.inner.find(id).await
    }

    async fn find_many(&self, ids: &[String]) -> Result<Vec<AchievementRecord>> {
        self.inner.find_many(ids).await
    }

    async fn apply_patch(&self, id: &str, patch: &RecordPatch) -> Result<bool> {
        self.inner.apply_patch(id, patch).await
    }

    async fn set_points(&self, id: &str, points: i64) -> Result<bool> {
        self.inner.set_points(id, points).await
    }

    async fn push_attachment(&self, id: &str, attachment: &Attachment) -> Result<bool> {
        self.inner.push_attachment(id, attachment).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.inner.delete(id).await
    }
}

// =============================================================================
// Draft compensation
// =============================================================================

#[tokio::test]
async fn test_failed_reference_insert_removes_record() {
    let fx = Fixture::new().await;
    let references = FaultyReferences {
        fail_insert: true,
        ..FaultyReferences::new(fx.db.clone())
    };
    let engine = fx.engine_with(
        EngineStores {
            references: Arc::new(references),
            ..fx.stores()
        },
        EngineConfig::default(),
    );

    let err = engine
        .create_draft(&fx.s1.caller, draft_input("academic", "Lost", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, MeritError::Database(ref m) if m == "disk I/O error"), "got {:?}", err);
    assert!(fx.records.is_empty());

    let events = fx.audit_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::RecordCompensated);
    assert_eq!(events[0].student_id.as_deref(), Some(fx.s1.profile_id.as_str()));
}

#[tokio::test]
async fn test_failed_compensation_logs_orphan_and_keeps_original_error() {
    let fx = Fixture::new().await;
    let references = FaultyReferences {
        fail_insert: true,
        ..FaultyReferences::new(fx.db.clone())
    };
    let records = UndeletableRecords {
        inner: fx.records.clone(),
        calls: AtomicUsize::new(0),
    };
    let engine = fx.engine_with(
        EngineStores {
            references: Arc::new(references),
            records: Arc::new(records),
            ..fx.stores()
        },
        EngineConfig::default(),
    );

    let err = engine
        .create_draft(&fx.s1.caller, draft_input("academic", "Orphan", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, MeritError::Database(ref m) if m == "disk I/O error"), "got {:?}", err);
    assert_eq!(fx.records.len(), 1);

    let events = fx.audit_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::OrphanedRecord);
    let detail = events[0].error.as_deref().unwrap();
    assert!(detail.contains("disk I/O error"));
    assert!(detail.contains("connection reset"));
    assert!(events[0].record_id.is_some());
}

// =============================================================================
// Timeouts
// =============================================================================

#[tokio::test]
async fn test_stalled_store_times_out() {
    let fx = Fixture::new().await;
    let handle = fx.draft(&fx.s1, "Slow").await;

    let references = FaultyReferences {
        stall: Some(Duration::from_secs(5)),
        ..FaultyReferences::new(fx.db.clone())
    };
    let engine = fx.engine_with(
        EngineStores {
            references: Arc::new(references),
            ..fx.stores()
        },
        fast_timeout(),
    );

    let err = engine.submit(&fx.s1.caller, &handle.id).await.unwrap_err();
    match err {
        MeritError::Timeout { operation, after_ms } => {
            assert_eq!(operation, "reference submit");
            assert_eq!(after_ms, 100);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_reference_insert_committing_after_timeout_keeps_record() {
    let fx = Fixture::new().await;
    let records = ContendedRecords {
        inner: fx.records.clone(),
        db: fx.db.clone(),
        hold: Duration::from_millis(400),
    };
    let engine = fx.engine_with(
        EngineStores {
            records: Arc::new(records),
            ..fx.stores()
        },
        fast_timeout(),
    );

    let err = engine
        .create_draft(&fx.s1.caller, draft_input("academic", "Queued", 5))
        .await
        .unwrap_err();
    match err {
        MeritError::Timeout { operation, after_ms } => {
            assert_eq!(operation, "reference insert");
            assert_eq!(after_ms, 100);
        }
        other => panic!("expected timeout, got {:?}", other),
    }

    // The queued insert commits once the connection is released.
    tokio::time::sleep(Duration::from_millis(800)).await;

    let page = fx
        .engine
        .list(&fx.s1.caller, &ListQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    let view = &page.items[0];
    assert_eq!(view.reference.status, AchievementStatus::Draft);
    assert_eq!(view.record.as_ref().unwrap().title, "Queued");
    assert_eq!(fx.records.len(), 1);

    let patch = RecordPatch {
        title: Some("Queued, then edited".into()),
        ..Default::default()
    };
    fx.engine
        .update(&fx.s1.caller, &view.reference.id, patch)
        .await
        .unwrap();

    let events = fx.audit_events();
    assert!(events.iter().any(|e| e.action == AuditAction::DraftCreated));
    assert!(events
        .iter()
        .all(|e| e.action != AuditAction::RecordCompensated && !e.action.is_orphan()));
}

#[tokio::test]
async fn test_reference_insert_failing_after_timeout_is_compensated() {
    let fx = Fixture::new().await;
    let references = FaultyReferences {
        fail_insert: true,
        stall: Some(Duration::from_millis(300)),
        ..FaultyReferences::new(fx.db.clone())
    };
    let engine = fx.engine_with(
        EngineStores {
            references: Arc::new(references),
            ..fx.stores()
        },
        fast_timeout(),
    );

    let err = engine
        .create_draft(&fx.s1.caller, draft_input("academic", "Late failure", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, MeritError::Timeout { .. }), "got {:?}", err);

    // Still in flight, nothing removed yet
    assert_eq!(fx.records.len(), 1);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(fx.records.is_empty());

    let events = fx.audit_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::RecordCompensated);
    assert!(events[0].error.as_deref().unwrap().contains("disk I/O error"));
}

// =============================================================================
// Validation before I/O
// =============================================================================

#[tokio::test]
async fn test_empty_reject_note_touches_no_store() {
    let fx = Fixture::new().await;
    let handle = fx.submitted(&fx.s1, "Untouched").await;

    let references = Arc::new(FaultyReferences::new(fx.db.clone()));
    let records = Arc::new(UndeletableRecords {
        inner: fx.records.clone(),
        calls: AtomicUsize::new(0),
    });
    let engine = fx.engine_with(
        EngineStores {
            references: references.clone(),
            records: records.clone(),
            ..fx.stores()
        },
        EngineConfig::default(),
    );

    let err = engine
        .reject(&fx.l1.caller, &handle.id, RejectInput { note: String::new() })
        .await
        .unwrap_err();
    assert!(matches!(err, MeritError::Validation(_)), "got {:?}", err);
    assert_eq!(references.calls.load(Ordering::SeqCst), 0);
    assert_eq!(records.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_draft_touches_no_store() {
    let fx = Fixture::new().await;
    let references = Arc::new(FaultyReferences::new(fx.db.clone()));
    let engine = fx.engine_with(
        EngineStores {
            references: references.clone(),
            ..fx.stores()
        },
        EngineConfig::default(),
    );

    let err = engine
        .create_draft(&fx.s1.caller, draft_input("academic", "  ", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, MeritError::Validation(_)), "got {:?}", err);
    assert_eq!(references.calls.load(Ordering::SeqCst), 0);
    assert!(fx.records.is_empty());
}
