//! Achievement lifecycle engine
//!
//! Orchestrates every workflow operation across the two stores:
//!
//! ```text
//! caller ─▶ gate.require(permission)
//!        ─▶ resolve caller profile (student / lecturer)
//!        ─▶ one conditional UPDATE on the reference (row count decides)
//!        ─▶ record store follow-up (insert, $set, $push)
//! ```
//!
//! A transition that touches no row is classified afterwards by re-reading
//! the reference: missing → `NotFound`, wrong owner or advisor → `Forbidden`,
//! otherwise → `Conflict`. Authorization is checked before state, so a
//! stranger never learns the status of someone else's achievement.
//!
//! Draft creation is a two-step saga: record insert, then reference insert.
//! If the second step fails the record is deleted again; if that fails too
//! an orphan event is logged and the caller still gets the original error.
//! A reference insert that times out keeps running in its own task; the
//! record is only removed once that insert has actually failed.
//!
//! Every store call is bounded by [`EngineConfig::store_timeout`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::history::{history_of, HistoryEntry};
use super::listing::{ListQuery, ListScope, Page};
use super::status::AchievementStatus;
use crate::auth::gate::{resource_access, AuthorizationGate, Caller, ResourceAccess};
use crate::auth::permissions::{self, Tier};
use crate::db::records::{AchievementRecord, Attachment, Details, NewRecord, RecordPatch, RecordStore};
use crate::db::relational::{
    AchievementReference, Directory, LecturerProfile, ReferenceStore, StudentProfile,
};
use crate::logging::{AuditAction, AuditEvent, AuditLogger};
use crate::storage::{FileStore, FileUpload};
use crate::types::{MeritError, Result};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound for any single store call
    pub store_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
        }
    }
}

/// The backends the engine coordinates.
#[derive(Clone)]
pub struct EngineStores {
    pub references: Arc<dyn ReferenceStore>,
    pub directory: Arc<dyn Directory>,
    pub records: Arc<dyn RecordStore>,
    pub files: Arc<dyn FileStore>,
}

// ============================================================================
// Inputs and outputs
// ============================================================================

/// Payload for a new draft.
#[derive(Debug, Clone, Deserialize)]
pub struct DraftInput {
    pub achievement_type: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: Details,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub points: i64,
}

impl DraftInput {
    pub fn validate(&self) -> Result<()> {
        if self.achievement_type.trim().is_empty() {
            return Err(MeritError::Validation("achievement_type is required".into()));
        }
        if self.title.trim().is_empty() {
            return Err(MeritError::Validation("title is required".into()));
        }
        if self.points < 0 {
            return Err(MeritError::Validation("points cannot be negative".into()));
        }
        Ok(())
    }

    fn into_record(self, student_id: &str) -> NewRecord {
        NewRecord {
            student_id: student_id.to_string(),
            achievement_type: self.achievement_type.trim().to_string(),
            title: self.title.trim().to_string(),
            description: self.description,
            details: self.details,
            tags: self.tags,
            points: self.points,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyInput {
    /// Replaces the record's points when present.
    #[serde(default)]
    pub points: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RejectInput {
    #[serde(default)]
    pub note: String,
}

/// Reference and record ids of an achievement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AchievementHandle {
    pub id: String,
    pub record_id: String,
    pub status: AchievementStatus,
}

/// Outcome of a status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub id: String,
    pub status: AchievementStatus,
    /// Only set by verify when a points adjustment was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_adjusted: Option<bool>,
}

impl Transition {
    fn to(id: &str, status: AchievementStatus) -> Self {
        Self {
            id: id.to_string(),
            status,
            points_adjusted: None,
        }
    }
}

/// A reference joined with its record.
///
/// `record` is `None` only if the document store lost the record.
#[derive(Debug, Clone, Serialize)]
pub struct AchievementView {
    #[serde(flatten)]
    pub reference: AchievementReference,
    pub record: Option<AchievementRecord>,
}

// ============================================================================
// Store plumbing
// ============================================================================

async fn within<T, F>(limit: Duration, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let after_ms = limit.as_millis() as u64;
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, after_ms, "Store call timed out");
            Err(MeritError::Timeout {
                operation: operation.to_string(),
                after_ms,
            })
        }
    }
}

/// Undo for a draft whose record exists but whose reference may not.
///
/// Owns its handles so it can outlive the request that created the draft.
struct DraftCleanup {
    records: Arc<dyn RecordStore>,
    audit: AuditLogger,
    limit: Duration,
    actor: String,
    student_id: String,
    record_id: String,
}

impl DraftCleanup {
    /// Best-effort delete of a record whose reference was never written.
    async fn compensate(&self, cause: &MeritError) {
        let event = match within(
            self.limit,
            "record compensation",
            self.records.delete(&self.record_id),
        )
        .await
        {
            Ok(removed) => {
                if !removed {
                    debug!(record_id = %self.record_id, "Compensated record was already gone");
                }
                AuditEvent::new(AuditAction::RecordCompensated).with_error(cause)
            }
            Err(e) => AuditEvent::new(AuditAction::OrphanedRecord).with_error(format!(
                "reference insert failed: {}; record delete failed: {}",
                cause, e
            )),
        };
        self.audit
            .log(
                event
                    .with_actor(&self.actor)
                    .with_record(&self.record_id)
                    .with_student(&self.student_id),
            )
            .await;
    }

    /// Wait out a timed-out reference insert. A late commit leaves a complete
    /// draft; a late failure is compensated like any other.
    async fn settle(self, insert: JoinHandle<Result<AchievementReference>>) {
        match insert.await.map_err(MeritError::from).and_then(|r| r) {
            Ok(reference) => {
                info!(
                    achievement_id = %reference.id,
                    record_id = %self.record_id,
                    "Draft committed after its request timed out"
                );
                self.audit
                    .log(
                        AuditEvent::new(AuditAction::DraftCreated)
                            .with_actor(&self.actor)
                            .with_achievement(&reference.id)
                            .with_record(&self.record_id)
                            .with_student(&self.student_id)
                            .with_status(AchievementStatus::Draft),
                    )
                    .await;
            }
            Err(e) => {
                error!(record_id = %self.record_id, error = %e, "Late reference insert failed, compensating");
                self.compensate(&e).await;
            }
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct AchievementEngine {
    stores: EngineStores,
    gate: Arc<AuthorizationGate>,
    audit: AuditLogger,
    config: EngineConfig,
}

impl AchievementEngine {
    pub fn new(
        stores: EngineStores,
        gate: Arc<AuthorizationGate>,
        audit: AuditLogger,
        config: EngineConfig,
    ) -> Self {
        Self {
            stores,
            gate,
            audit,
            config,
        }
    }

    pub fn gate(&self) -> &Arc<AuthorizationGate> {
        &self.gate
    }

    pub fn references(&self) -> &Arc<dyn ReferenceStore> {
        &self.stores.references
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.stores.records
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.stores.directory
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a store call under the configured timeout.
    pub async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        within(self.config.store_timeout, operation, call).await
    }

    async fn require(&self, caller: &Caller, permission: &str) -> Result<()> {
        self.bounded("permission lookup", self.gate.require(caller, permission))
            .await
    }

    async fn caller_student(&self, caller: &Caller) -> Result<StudentProfile> {
        self.bounded(
            "student lookup",
            self.stores.directory.student_for_user(&caller.user_id),
        )
        .await?
        .ok_or_else(|| MeritError::Forbidden("caller is not a student".into()))
    }

    async fn caller_lecturer(&self, caller: &Caller) -> Result<LecturerProfile> {
        self.bounded(
            "lecturer lookup",
            self.stores.directory.lecturer_for_user(&caller.user_id),
        )
        .await?
        .ok_or_else(|| MeritError::Forbidden("caller is not a lecturer".into()))
    }

    async fn load_reference(&self, id: &str) -> Result<AchievementReference> {
        self.bounded("reference lookup", self.stores.references.get(id))
            .await?
            .ok_or_else(|| MeritError::NotFound(format!("achievement '{}'", id)))
    }

    /// Explain why an owner transition touched no row.
    async fn classify_owned(&self, id: &str, student_id: &str, action: &str) -> MeritError {
        let reference = match self.load_reference(id).await {
            Ok(reference) => reference,
            Err(e) => return e,
        };
        if reference.student_id != student_id {
            return MeritError::Forbidden(format!("achievement '{}' belongs to another student", id));
        }
        MeritError::Conflict(format!(
            "cannot {} achievement in status '{}'",
            action, reference.status
        ))
    }

    /// Explain why an advisor decision touched no row.
    async fn classify_advised(&self, id: &str, lecturer_id: &str, action: &str) -> MeritError {
        let reference = match self.load_reference(id).await {
            Ok(reference) => reference,
            Err(e) => return e,
        };
        let owner = match self
            .bounded("student lookup", self.stores.directory.student(&reference.student_id))
            .await
        {
            Ok(owner) => owner,
            Err(e) => return e,
        };
        if owner.and_then(|s| s.advisor_id).as_deref() != Some(lecturer_id) {
            return MeritError::Forbidden(format!(
                "not the advisor of record for achievement '{}'",
                id
            ));
        }
        MeritError::Conflict(format!(
            "cannot {} achievement in status '{}'",
            action, reference.status
        ))
    }

    /// Caller must hold the `all` tier, own the resource, or advise its owner.
    async fn ensure_visible(&self, caller: &Caller, owner_id: &str) -> Result<ResourceAccess> {
        let owner = self
            .bounded("student lookup", self.stores.directory.student(owner_id))
            .await?
            .ok_or_else(|| MeritError::NotFound(format!("student '{}'", owner_id)))?;

        let tier = self
            .bounded("permission lookup", self.gate.list_tier(caller))
            .await?;
        if tier == Some(Tier::All) {
            return Ok(ResourceAccess::All);
        }

        // A user whose role changed keeps both profiles; either can grant access.
        let student = self
            .bounded(
                "student lookup",
                self.stores.directory.student_for_user(&caller.user_id),
            )
            .await?;
        let lecturer = self
            .bounded(
                "lecturer lookup",
                self.stores.directory.lecturer_for_user(&caller.user_id),
            )
            .await?;

        resource_access(
            tier,
            student.as_ref().map(|s| s.id.as_str()),
            lecturer.as_ref().map(|l| l.id.as_str()),
            &owner,
        )
        .ok_or_else(|| MeritError::Forbidden("not allowed to view this student's achievements".into()))
    }

    // ------------------------------------------------------------------------
    // Owner operations
    // ------------------------------------------------------------------------

    pub async fn create_draft(&self, caller: &Caller, input: DraftInput) -> Result<AchievementHandle> {
        input.validate()?;
        self.require(caller, permissions::ACHIEVEMENT_CREATE).await?;
        let student = self.caller_student(caller).await?;

        let record = input.into_record(&student.id);
        let record_id = self
            .bounded("record insert", self.stores.records.insert(record))
            .await?;

        let cleanup = DraftCleanup {
            records: Arc::clone(&self.stores.records),
            audit: self.audit.clone(),
            limit: self.config.store_timeout,
            actor: caller.user_id.clone(),
            student_id: student.id.clone(),
            record_id: record_id.clone(),
        };

        // Own task: a timed-out insert keeps running and may still commit.
        let references = Arc::clone(&self.stores.references);
        let (owner, record) = (student.id.clone(), record_id.clone());
        let mut insert =
            tokio::spawn(async move { references.insert_draft(&owner, &record).await });

        let reference = match tokio::time::timeout(self.config.store_timeout, &mut insert).await {
            Ok(joined) => match joined.map_err(MeritError::from).and_then(|r| r) {
                Ok(reference) => reference,
                Err(e) => {
                    error!(record_id = %record_id, error = %e, "Reference insert failed, compensating");
                    cleanup.compensate(&e).await;
                    return Err(e);
                }
            },
            Err(_) => {
                let after_ms = self.config.store_timeout.as_millis() as u64;
                warn!(
                    operation = "reference insert",
                    after_ms,
                    record_id = %record_id,
                    "Store call timed out, settling draft in background"
                );
                tokio::spawn(cleanup.settle(insert));
                return Err(MeritError::Timeout {
                    operation: "reference insert".to_string(),
                    after_ms,
                });
            }
        };

        info!(
            achievement_id = %reference.id,
            record_id = %record_id,
            student_id = %student.id,
            "Draft created"
        );
        self.audit
            .log(
                AuditEvent::new(AuditAction::DraftCreated)
                    .with_actor(&caller.user_id)
                    .with_achievement(&reference.id)
                    .with_record(&record_id)
                    .with_student(&student.id)
                    .with_status(AchievementStatus::Draft),
            )
            .await;

        Ok(AchievementHandle {
            id: reference.id,
            record_id,
            status: reference.status,
        })
    }

    pub async fn submit(&self, caller: &Caller, id: &str) -> Result<Transition> {
        self.require(caller, permissions::ACHIEVEMENT_SUBMIT).await?;
        let student = self.caller_student(caller).await?;

        let moved = self
            .bounded("reference submit", self.stores.references.submit(id, &student.id))
            .await?;
        if !moved {
            return Err(self.classify_owned(id, &student.id, "submit").await);
        }

        info!(achievement_id = %id, student_id = %student.id, "Achievement submitted");
        self.audit
            .log(
                AuditEvent::new(AuditAction::Submitted)
                    .with_actor(&caller.user_id)
                    .with_achievement(id)
                    .with_student(&student.id)
                    .with_status(AchievementStatus::Submitted),
            )
            .await;
        Ok(Transition::to(id, AchievementStatus::Submitted))
    }

    /// Partial update of the record. Draft only.
    ///
    /// The status check and the record patch are two writes, like
    /// [`Self::add_attachment`]. A submit landing between them succeeds and
    /// the patch still applies, so the submitted record carries the edit.
    pub async fn update(
        &self,
        caller: &Caller,
        id: &str,
        patch: RecordPatch,
    ) -> Result<AchievementHandle> {
        patch.validate()?;
        self.require(caller, permissions::ACHIEVEMENT_UPDATE).await?;
        let student = self.caller_student(caller).await?;

        let allowed = [AchievementStatus::Draft];
        let record_id = match self
            .bounded(
                "reference touch",
                self.stores.references.touch_owned(id, &student.id, &allowed),
            )
            .await?
        {
            Some(record_id) => record_id,
            None => return Err(self.classify_owned(id, &student.id, "update").await),
        };

        let applied = self
            .bounded("record update", self.stores.records.apply_patch(&record_id, &patch))
            .await?;
        if !applied {
            error!(achievement_id = %id, record_id = %record_id, "Reference points at a missing record");
            return Err(MeritError::Internal(format!(
                "record for achievement '{}' is missing",
                id
            )));
        }

        self.audit
            .log(
                AuditEvent::new(AuditAction::Updated)
                    .with_actor(&caller.user_id)
                    .with_achievement(id)
                    .with_record(&record_id)
                    .with_student(&student.id),
            )
            .await;
        Ok(AchievementHandle {
            id: id.to_string(),
            record_id,
            status: AchievementStatus::Draft,
        })
    }

    /// Soft delete: the reference moves to `deleted`, the record stays.
    pub async fn delete(&self, caller: &Caller, id: &str) -> Result<Transition> {
        self.require(caller, permissions::ACHIEVEMENT_DELETE).await?;
        let student = self.caller_student(caller).await?;

        let moved = self
            .bounded(
                "reference delete",
                self.stores.references.mark_deleted(id, &student.id),
            )
            .await?;
        if !moved {
            return Err(self.classify_owned(id, &student.id, "delete").await);
        }

        info!(achievement_id = %id, student_id = %student.id, "Achievement deleted");
        self.audit
            .log(
                AuditEvent::new(AuditAction::Deleted)
                    .with_actor(&caller.user_id)
                    .with_achievement(id)
                    .with_student(&student.id)
                    .with_status(AchievementStatus::Deleted),
            )
            .await;
        Ok(Transition::to(id, AchievementStatus::Deleted))
    }

    /// Store an evidence file and append it to the record.
    ///
    /// Allowed while the reference is `draft` or `submitted`. The status check
    /// and the append are two writes; a verify landing between them still
    /// sees its own transition succeed and the attachment is kept.
    pub async fn add_attachment(
        &self,
        caller: &Caller,
        id: &str,
        upload: FileUpload,
    ) -> Result<Attachment> {
        upload.validate()?;
        self.require(caller, permissions::ACHIEVEMENT_UPLOAD).await?;
        let student = self.caller_student(caller).await?;

        let allowed = [AchievementStatus::Draft, AchievementStatus::Submitted];
        let record_id = match self
            .bounded(
                "reference touch",
                self.stores.references.touch_owned(id, &student.id, &allowed),
            )
            .await?
        {
            Some(record_id) => record_id,
            None => {
                return Err(self.classify_owned(id, &student.id, "attach files to").await)
            }
        };

        let stored = self
            .bounded("file save", self.stores.files.save(&upload))
            .await?;
        let attachment = Attachment {
            file_name: upload.file_name.clone(),
            file_url: stored.url.clone(),
            file_type: upload.file_type().to_string(),
            uploaded_at: Utc::now(),
        };

        let pushed = self
            .bounded(
                "record attachment",
                self.stores.records.push_attachment(&record_id, &attachment),
            )
            .await;
        match pushed {
            Ok(true) => {}
            Ok(false) => {
                self.discard_file(caller, id, &stored.stored_name, "record missing")
                    .await;
                return Err(MeritError::Internal(format!(
                    "record for achievement '{}' is missing",
                    id
                )));
            }
            Err(e) => {
                self.discard_file(caller, id, &stored.stored_name, &e.to_string())
                    .await;
                return Err(e);
            }
        }

        debug!(achievement_id = %id, file = %stored.stored_name, "Attachment added");
        self.audit
            .log(
                AuditEvent::new(AuditAction::AttachmentAdded)
                    .with_actor(&caller.user_id)
                    .with_achievement(id)
                    .with_record(&record_id)
                    .with_student(&student.id)
                    .with_file(&stored.url),
            )
            .await;
        Ok(attachment)
    }

    async fn discard_file(&self, caller: &Caller, id: &str, stored_name: &str, cause: &str) {
        if let Err(e) = self
            .bounded("file remove", self.stores.files.remove(stored_name))
            .await
        {
            self.audit
                .log(
                    AuditEvent::new(AuditAction::OrphanedFile)
                        .with_actor(&caller.user_id)
                        .with_achievement(id)
                        .with_file(stored_name)
                        .with_error(format!("attachment append failed: {}; remove failed: {}", cause, e)),
                )
                .await;
        }
    }

    // ------------------------------------------------------------------------
    // Advisor operations
    // ------------------------------------------------------------------------

    pub async fn verify(&self, caller: &Caller, id: &str, input: VerifyInput) -> Result<Transition> {
        if matches!(input.points, Some(p) if p < 0) {
            return Err(MeritError::Validation("points cannot be negative".into()));
        }
        self.require(caller, permissions::ACHIEVEMENT_VERIFY).await?;
        let lecturer = self.caller_lecturer(caller).await?;

        let moved = self
            .bounded("reference verify", self.stores.references.verify(id, &lecturer.id))
            .await?;
        if !moved {
            return Err(self.classify_advised(id, &lecturer.id, "verify").await);
        }

        info!(achievement_id = %id, verified_by = %lecturer.id, "Achievement verified");
        self.audit
            .log(
                AuditEvent::new(AuditAction::Verified)
                    .with_actor(&caller.user_id)
                    .with_achievement(id)
                    .with_status(AchievementStatus::Verified),
            )
            .await;

        let mut transition = Transition::to(id, AchievementStatus::Verified);
        if let Some(points) = input.points {
            transition.points_adjusted = Some(self.adjust_points(caller, id, points).await);
        }
        Ok(transition)
    }

    /// The verify itself has already committed; a failure here is reported
    /// through the returned flag only.
    async fn adjust_points(&self, caller: &Caller, id: &str, points: i64) -> bool {
        let record_id = match self.load_reference(id).await {
            Ok(reference) => reference.record_id,
            Err(e) => {
                warn!(achievement_id = %id, error = %e, "Points adjustment skipped");
                return false;
            }
        };
        match self
            .bounded("record points", self.stores.records.set_points(&record_id, points))
            .await
        {
            Ok(true) => {
                self.audit
                    .log(
                        AuditEvent::new(AuditAction::PointsAdjusted)
                            .with_actor(&caller.user_id)
                            .with_achievement(id)
                            .with_record(&record_id),
                    )
                    .await;
                true
            }
            Ok(false) => {
                warn!(achievement_id = %id, record_id = %record_id, "Points adjustment found no record");
                false
            }
            Err(e) => {
                warn!(achievement_id = %id, error = %e, "Points adjustment failed");
                false
            }
        }
    }

    pub async fn reject(&self, caller: &Caller, id: &str, input: RejectInput) -> Result<Transition> {
        let note = input.note.trim();
        if note.is_empty() {
            return Err(MeritError::Validation("rejection note is required".into()));
        }
        self.require(caller, permissions::ACHIEVEMENT_REJECT).await?;
        let lecturer = self.caller_lecturer(caller).await?;

        let moved = self
            .bounded(
                "reference reject",
                self.stores.references.reject(id, &lecturer.id, note),
            )
            .await?;
        if !moved {
            return Err(self.classify_advised(id, &lecturer.id, "reject").await);
        }

        info!(achievement_id = %id, verified_by = %lecturer.id, "Achievement rejected");
        self.audit
            .log(
                AuditEvent::new(AuditAction::Rejected)
                    .with_actor(&caller.user_id)
                    .with_achievement(id)
                    .with_status(AchievementStatus::Rejected),
            )
            .await;
        Ok(Transition::to(id, AchievementStatus::Rejected))
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Map the caller's listing tier to a scope.
    pub async fn scope_for(&self, caller: &Caller) -> Result<ListScope> {
        let tier = self
            .bounded("permission lookup", self.gate.list_tier(caller))
            .await?;
        match tier {
            Some(Tier::All) => Ok(ListScope::All),
            Some(Tier::Advisor) => {
                let lecturer = self.caller_lecturer(caller).await?;
                Ok(ListScope::Advisees {
                    lecturer_id: lecturer.id,
                })
            }
            Some(Tier::SelfOnly) => {
                let student = self.caller_student(caller).await?;
                Ok(ListScope::Student {
                    student_id: student.id,
                })
            }
            None => Err(MeritError::Forbidden("no listing tier granted".into())),
        }
    }

    pub async fn list(&self, caller: &Caller, query: &ListQuery) -> Result<Page<AchievementView>> {
        self.require(caller, permissions::ACHIEVEMENT_LIST).await?;
        let scope = self.scope_for(caller).await?;
        self.list_scoped(&scope, query).await
    }

    async fn list_scoped(&self, scope: &ListScope, query: &ListQuery) -> Result<Page<AchievementView>> {
        let (references, total) = self
            .bounded("reference list", self.stores.references.list(scope, query))
            .await?;
        let items = self.join_records(references).await?;
        Ok(Page::new(items, total, query))
    }

    /// Attach records to references, preserving reference order.
    pub async fn join_records(
        &self,
        references: Vec<AchievementReference>,
    ) -> Result<Vec<AchievementView>> {
        let ids: Vec<String> = references.iter().map(|r| r.record_id.clone()).collect();
        let mut records: HashMap<String, AchievementRecord> = self
            .bounded("record lookup", self.stores.records.find_many(&ids))
            .await?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        Ok(references
            .into_iter()
            .map(|reference| {
                let record = records.remove(&reference.record_id);
                if record.is_none() {
                    warn!(achievement_id = %reference.id, record_id = %reference.record_id, "Record missing for reference");
                }
                AchievementView { reference, record }
            })
            .collect())
    }

    pub async fn detail(&self, caller: &Caller, id: &str) -> Result<AchievementView> {
        self.require(caller, permissions::ACHIEVEMENT_DETAIL).await?;
        let reference = self.load_reference(id).await?;
        self.ensure_visible(caller, &reference.student_id).await?;

        let record = self
            .bounded("record lookup", self.stores.records.find(&reference.record_id))
            .await?;
        if record.is_none() {
            warn!(achievement_id = %id, record_id = %reference.record_id, "Record missing for reference");
        }
        Ok(AchievementView { reference, record })
    }

    pub async fn history(&self, caller: &Caller, id: &str) -> Result<Vec<HistoryEntry>> {
        self.require(caller, permissions::ACHIEVEMENT_HISTORY).await?;
        let reference = self.load_reference(id).await?;
        self.ensure_visible(caller, &reference.student_id).await?;
        Ok(history_of(&reference))
    }

    /// Verify the caller may see a student's achievements.
    pub async fn ensure_student_visible(&self, caller: &Caller, student_id: &str) -> Result<ResourceAccess> {
        self.ensure_visible(caller, student_id).await
    }

    pub async fn student_achievements(
        &self,
        caller: &Caller,
        student_id: &str,
        query: &ListQuery,
    ) -> Result<Page<AchievementView>> {
        self.require(caller, permissions::STUDENT_LIST).await?;
        self.ensure_visible(caller, student_id).await?;
        let scope = ListScope::Student {
            student_id: student_id.to_string(),
        };
        self.list_scoped(&scope, query).await
    }
}
