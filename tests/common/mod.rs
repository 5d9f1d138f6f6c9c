//! Shared fixture for the lifecycle integration tests
//!
//! Builds the full engine over an in-memory SQLite database, the in-memory
//! record store and a temporary upload directory. The cast:
//!
//! - `s1` - student advised by `l1`
//! - `s2` - student advised by `l2`
//! - `l1`, `l2` - lecturers
//! - `admin`

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tempfile::TempDir;

use merit::auth::permissions::{ROLE_ADMIN, ROLE_LECTURER, ROLE_STUDENT};
use merit::auth::{AuthorizationGate, Caller, PermissionCacheConfig, PermissionResolver};
use merit::db::relational::{Directory, NewUser};
use merit::db::{MemoryRecordStore, RelationalDb};
use merit::lifecycle::{AchievementEngine, AchievementHandle, DraftInput, EngineConfig, EngineStores};
use merit::logging::{AuditEvent, AuditLogger};
use merit::storage::{FileUpload, LocalFileStore};

pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024;

/// A user together with the profile id the engine acts on.
#[derive(Debug, Clone)]
pub struct Actor {
    pub caller: Caller,
    /// Student or lecturer id; empty for the admin.
    pub profile_id: String,
}

pub struct Fixture {
    pub db: RelationalDb,
    pub records: Arc<MemoryRecordStore>,
    pub files: Arc<LocalFileStore>,
    pub gate: Arc<AuthorizationGate>,
    pub audit: AuditLogger,
    pub engine: Arc<AchievementEngine>,
    pub s1: Actor,
    pub s2: Actor,
    pub l1: Actor,
    pub l2: Actor,
    pub admin: Actor,
    pub dir: TempDir,
}

async fn add_user(db: &RelationalDb, username: &str, role: &str) -> Caller {
    let role = db.require_role_by_name(role).await.unwrap();
    let account = db
        .create_user(NewUser {
            username: username.to_string(),
            email: format!("{}@campus.test", username),
            password_hash: "unused".to_string(),
            full_name: format!("User {}", username),
            role_id: role.id,
            ..Default::default()
        })
        .await
        .unwrap();
    Caller::new(account.id, account.role_id)
}

async fn student(db: &RelationalDb, username: &str) -> Actor {
    let caller = add_user(db, username, ROLE_STUDENT).await;
    let profile = db.student_for_user(&caller.user_id).await.unwrap().unwrap();
    Actor {
        caller,
        profile_id: profile.id,
    }
}

async fn lecturer(db: &RelationalDb, username: &str) -> Actor {
    let caller = add_user(db, username, ROLE_LECTURER).await;
    let profile = db.lecturer_for_user(&caller.user_id).await.unwrap().unwrap();
    Actor {
        caller,
        profile_id: profile.id,
    }
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = RelationalDb::open_in_memory().unwrap();

        let s1 = student(&db, "s1").await;
        let s2 = student(&db, "s2").await;
        let l1 = lecturer(&db, "l1").await;
        let l2 = lecturer(&db, "l2").await;
        let admin = Actor {
            caller: add_user(&db, "admin", ROLE_ADMIN).await,
            profile_id: String::new(),
        };
        db.set_advisor(&s1.profile_id, Some(l1.profile_id.as_str())).await.unwrap();
        db.set_advisor(&s2.profile_id, Some(l2.profile_id.as_str())).await.unwrap();

        let resolver = Arc::new(PermissionResolver::new(
            Arc::new(db.clone()),
            PermissionCacheConfig::default(),
        ));
        let gate = Arc::new(AuthorizationGate::new(resolver));

        let audit = AuditLogger::new();
        audit.init_file(dir.path().join("audit.jsonl")).await.unwrap();

        let files = Arc::new(LocalFileStore::new(
            dir.path().join("uploads"),
            "/uploads",
            MAX_UPLOAD_BYTES,
        ));
        files.ensure_dir().await.unwrap();

        let records = Arc::new(MemoryRecordStore::new());

        let stores = EngineStores {
            references: Arc::new(db.clone()),
            directory: Arc::new(db.clone()),
            records: records.clone(),
            files: files.clone(),
        };
        let engine = Arc::new(AchievementEngine::new(
            stores,
            Arc::clone(&gate),
            audit.clone(),
            EngineConfig::default(),
        ));

        Self {
            db,
            records,
            files,
            gate,
            audit,
            engine,
            s1,
            s2,
            l1,
            l2,
            admin,
            dir,
        }
    }

    /// The default backends, for tests that wrap one of them.
    pub fn stores(&self) -> EngineStores {
        EngineStores {
            references: Arc::new(self.db.clone()),
            directory: Arc::new(self.db.clone()),
            records: self.records.clone(),
            files: self.files.clone(),
        }
    }

    pub fn engine_with(&self, stores: EngineStores, config: EngineConfig) -> AchievementEngine {
        AchievementEngine::new(stores, Arc::clone(&self.gate), self.audit.clone(), config)
    }

    /// Every audit event written so far.
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        let raw = std::fs::read_to_string(self.dir.path().join("audit.jsonl")).unwrap_or_default();
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    pub async fn draft(&self, actor: &Actor, title: &str) -> AchievementHandle {
        self.engine
            .create_draft(&actor.caller, draft_input("academic", title, 10))
            .await
            .unwrap()
    }

    pub async fn submitted(&self, actor: &Actor, title: &str) -> AchievementHandle {
        let handle = self.draft(actor, title).await;
        self.engine.submit(&actor.caller, &handle.id).await.unwrap();
        handle
    }
}

pub fn draft_input(achievement_type: &str, title: &str, points: i64) -> DraftInput {
    serde_json::from_value(serde_json::json!({
        "achievement_type": achievement_type,
        "title": title,
        "points": points,
    }))
    .unwrap()
}

pub fn upload(name: &str, body: &'static [u8]) -> FileUpload {
    FileUpload {
        file_name: name.to_string(),
        content_type: Some("application/pdf".to_string()),
        bytes: Bytes::from_static(body),
    }
}

/// Short timeout for tests that stall a store on purpose.
pub fn fast_timeout() -> EngineConfig {
    EngineConfig {
        store_timeout: Duration::from_millis(100),
    }
}
