//! Achievement references: authoritative workflow state.
//!
//! Every transition is one conditional `UPDATE` whose `WHERE` clause carries
//! the ownership (or advisor) predicate and the required source status. The
//! affected-row count is the only concurrency control: of two racing
//! transitions from the same status, exactly one sees a row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::{opt_time_column, time_column, to_db_time, RelationalDb};
use crate::lifecycle::listing::{ListQuery, ListScope};
use crate::lifecycle::status::AchievementStatus;
use crate::types::{MeritError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AchievementReference {
    pub id: String,
    pub student_id: String,
    pub record_id: String,
    pub status: AchievementStatus,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<String>,
    pub rejection_note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

const REFERENCE_COLUMNS: &str = "id, student_id, record_id, status, created_at, submitted_at, \
     verified_at, verified_by, rejection_note, updated_at";

impl AchievementReference {
    fn from_row(row: &Row) -> std::result::Result<Self, rusqlite::Error> {
        let status: String = row.get("status")?;
        let status = status.parse::<AchievementStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
            )
        })?;
        Ok(Self {
            id: row.get("id")?,
            student_id: row.get("student_id")?,
            record_id: row.get("record_id")?,
            status,
            created_at: time_column(row, "created_at")?,
            submitted_at: opt_time_column(row, "submitted_at")?,
            verified_at: opt_time_column(row, "verified_at")?,
            verified_by: row.get("verified_by")?,
            rejection_note: row.get("rejection_note")?,
            updated_at: time_column(row, "updated_at")?,
        })
    }
}

/// Relational store for achievement references.
///
/// Transition methods return `false` when their conditional update touched
/// no row; the caller decides what that means.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn insert_draft(&self, student_id: &str, record_id: &str) -> Result<AchievementReference>;

    async fn get(&self, id: &str) -> Result<Option<AchievementReference>>;

    /// draft → submitted, owner only.
    async fn submit(&self, id: &str, student_id: &str) -> Result<bool>;

    /// submitted → verified, advisor-of-record only.
    async fn verify(&self, id: &str, lecturer_id: &str) -> Result<bool>;

    /// submitted → rejected with a note, advisor-of-record only.
    async fn reject(&self, id: &str, lecturer_id: &str, note: &str) -> Result<bool>;

    /// draft → deleted, owner only.
    async fn mark_deleted(&self, id: &str, student_id: &str) -> Result<bool>;

    /// Bump `updated_at` if the owner matches and the status is one of
    /// `allowed`. Returns the record id on success.
    ///
    /// Used to gate record edits on the authoritative workflow state.
    async fn touch_owned(
        &self,
        id: &str,
        student_id: &str,
        allowed: &[AchievementStatus],
    ) -> Result<Option<String>>;

    async fn list(
        &self,
        scope: &ListScope,
        query: &ListQuery,
    ) -> Result<(Vec<AchievementReference>, u64)>;

    /// Every reference in scope, optionally filtered by status. Unpaginated.
    async fn scan(
        &self,
        scope: &ListScope,
        status: Option<AchievementStatus>,
    ) -> Result<Vec<AchievementReference>>;
}

// =============================================================================
// Queries
// =============================================================================

pub fn insert_draft(
    conn: &Connection,
    student_id: &str,
    record_id: &str,
    now: DateTime<Utc>,
) -> Result<AchievementReference> {
    let id = uuid::Uuid::new_v4().to_string();
    let ts = to_db_time(now);
    conn.execute(
        "INSERT INTO achievement_references
            (id, student_id, record_id, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![id, student_id, record_id, AchievementStatus::Draft.as_str(), ts],
    )?;
    get_reference(conn, &id)?
        .ok_or_else(|| MeritError::Database("inserted reference not found".into()))
}

pub fn get_reference(conn: &Connection, id: &str) -> Result<Option<AchievementReference>> {
    let sql = format!(
        "SELECT {} FROM achievement_references WHERE id = ?1",
        REFERENCE_COLUMNS
    );
    Ok(conn
        .query_row(&sql, [id], AchievementReference::from_row)
        .optional()?)
}

pub fn submit(conn: &Connection, id: &str, student_id: &str, now: DateTime<Utc>) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE achievement_references
         SET status = ?4, submitted_at = ?5, updated_at = ?5
         WHERE id = ?1 AND student_id = ?2 AND status = ?3",
        params![
            id,
            student_id,
            AchievementStatus::Draft.as_str(),
            AchievementStatus::Submitted.as_str(),
            to_db_time(now)
        ],
    )?)
}

/// Record an advisor decision (verified or rejected).
pub fn decide(
    conn: &Connection,
    id: &str,
    lecturer_id: &str,
    outcome: AchievementStatus,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> Result<usize> {
    if !matches!(outcome, AchievementStatus::Verified | AchievementStatus::Rejected) {
        return Err(MeritError::Internal(format!(
            "'{}' is not an advisor decision",
            outcome
        )));
    }
    Ok(conn.execute(
        "UPDATE achievement_references
         SET status = ?4, verified_by = ?2, verified_at = ?5, rejection_note = ?6, updated_at = ?5
         WHERE id = ?1 AND status = ?3
           AND student_id IN (SELECT id FROM students WHERE advisor_id = ?2)",
        params![
            id,
            lecturer_id,
            AchievementStatus::Submitted.as_str(),
            outcome.as_str(),
            to_db_time(now),
            note
        ],
    )?)
}

pub fn mark_deleted(
    conn: &Connection,
    id: &str,
    student_id: &str,
    now: DateTime<Utc>,
) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE achievement_references
         SET status = ?4, updated_at = ?5
         WHERE id = ?1 AND student_id = ?2 AND status = ?3",
        params![
            id,
            student_id,
            AchievementStatus::Draft.as_str(),
            AchievementStatus::Deleted.as_str(),
            to_db_time(now)
        ],
    )?)
}

pub fn touch_owned(
    conn: &Connection,
    id: &str,
    student_id: &str,
    allowed: &[AchievementStatus],
    now: DateTime<Utc>,
) -> Result<Option<String>> {
    if allowed.is_empty() {
        return Ok(None);
    }
    let placeholders = (0..allowed.len())
        .map(|i| format!("?{}", i + 4))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE achievement_references SET updated_at = ?3
         WHERE id = ?1 AND student_id = ?2 AND status IN ({})
         RETURNING record_id",
        placeholders
    );

    let mut values: Vec<Value> = vec![
        Value::Text(id.to_string()),
        Value::Text(student_id.to_string()),
        Value::Text(to_db_time(now)),
    ];
    values.extend(allowed.iter().map(|s| Value::Text(s.as_str().to_string())));

    Ok(conn
        .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))
        .optional()?)
}

/// Build the `WHERE` clause for a scope and optional status filter.
fn scope_filter(
    scope: &ListScope,
    status: Option<AchievementStatus>,
    values: &mut Vec<Value>,
) -> String {
    let mut clauses: Vec<String> = Vec::new();
    match scope {
        ListScope::All => {}
        ListScope::Advisees { lecturer_id } => {
            values.push(Value::Text(lecturer_id.clone()));
            clauses.push(format!(
                "student_id IN (SELECT id FROM students WHERE advisor_id = ?{})",
                values.len()
            ));
        }
        ListScope::Student { student_id } => {
            values.push(Value::Text(student_id.clone()));
            clauses.push(format!("student_id = ?{}", values.len()));
        }
    }
    if let Some(status) = status {
        values.push(Value::Text(status.as_str().to_string()));
        clauses.push(format!("status = ?{}", values.len()));
    }

    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}

pub fn list_references(
    conn: &Connection,
    scope: &ListScope,
    query: &ListQuery,
) -> Result<(Vec<AchievementReference>, u64)> {
    let mut values = Vec::new();
    let filter = scope_filter(scope, query.status, &mut values);

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM achievement_references {}", filter),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    values.push(Value::Integer(query.limit as i64));
    let limit_idx = values.len();
    values.push(Value::Integer(query.offset() as i64));
    let offset_idx = values.len();

    // Sort column and direction come from closed enums; rowid breaks ties
    // so pages never overlap.
    let sql = format!(
        "SELECT {} FROM achievement_references {}
         ORDER BY {} {}, rowid {}
         LIMIT ?{} OFFSET ?{}",
        REFERENCE_COLUMNS,
        filter,
        query.sort.column(),
        query.order.keyword(),
        query.order.keyword(),
        limit_idx,
        offset_idx
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), AchievementReference::from_row)?;
    let items = rows.collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((items, total.max(0) as u64))
}

pub fn scan_references(
    conn: &Connection,
    scope: &ListScope,
    status: Option<AchievementStatus>,
) -> Result<Vec<AchievementReference>> {
    let mut values = Vec::new();
    let filter = scope_filter(scope, status, &mut values);
    let sql = format!(
        "SELECT {} FROM achievement_references {} ORDER BY created_at, rowid",
        REFERENCE_COLUMNS, filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), AchievementReference::from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

// =============================================================================
// Async store
// =============================================================================

#[async_trait]
impl ReferenceStore for RelationalDb {
    async fn insert_draft(&self, student_id: &str, record_id: &str) -> Result<AchievementReference> {
        let (student_id, record_id) = (student_id.to_string(), record_id.to_string());
        self.call(move |conn| insert_draft(conn, &student_id, &record_id, Utc::now()))
            .await
    }

    async fn get(&self, id: &str) -> Result<Option<AchievementReference>> {
        let id = id.to_string();
        self.call(move |conn| get_reference(conn, &id)).await
    }

    async fn submit(&self, id: &str, student_id: &str) -> Result<bool> {
        let (id, student_id) = (id.to_string(), student_id.to_string());
        let rows = self
            .call(move |conn| submit(conn, &id, &student_id, Utc::now()))
            .await?;
        Ok(rows == 1)
    }

    async fn verify(&self, id: &str, lecturer_id: &str) -> Result<bool> {
        let (id, lecturer_id) = (id.to_string(), lecturer_id.to_string());
        let rows = self
            .call(move |conn| {
                decide(conn, &id, &lecturer_id, AchievementStatus::Verified, None, Utc::now())
            })
            .await?;
        Ok(rows == 1)
    }

    async fn reject(&self, id: &str, lecturer_id: &str, note: &str) -> Result<bool> {
        let (id, lecturer_id, note) = (id.to_string(), lecturer_id.to_string(), note.to_string());
        let rows = self
            .call(move |conn| {
                decide(
                    conn,
                    &id,
                    &lecturer_id,
                    AchievementStatus::Rejected,
                    Some(&note),
                    Utc::now(),
                )
            })
            .await?;
        Ok(rows == 1)
    }

    async fn mark_deleted(&self, id: &str, student_id: &str) -> Result<bool> {
        let (id, student_id) = (id.to_string(), student_id.to_string());
        let rows = self
            .call(move |conn| mark_deleted(conn, &id, &student_id, Utc::now()))
            .await?;
        Ok(rows == 1)
    }

    async fn touch_owned(
        &self,
        id: &str,
        student_id: &str,
        allowed: &[AchievementStatus],
    ) -> Result<Option<String>> {
        let (id, student_id, allowed) = (id.to_string(), student_id.to_string(), allowed.to_vec());
        self.call(move |conn| touch_owned(conn, &id, &student_id, &allowed, Utc::now()))
            .await
    }

    async fn list(
        &self,
        scope: &ListScope,
        query: &ListQuery,
    ) -> Result<(Vec<AchievementReference>, u64)> {
        let (scope, query) = (scope.clone(), query.clone());
        self.call(move |conn| list_references(conn, &scope, &query))
            .await
    }

    async fn scan(
        &self,
        scope: &ListScope,
        status: Option<AchievementStatus>,
    ) -> Result<Vec<AchievementReference>> {
        let scope = scope.clone();
        self.call(move |conn| scan_references(conn, &scope, status))
            .await
    }
}
