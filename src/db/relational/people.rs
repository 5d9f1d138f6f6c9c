//! Users, students and lecturers

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;

use super::access::get_role;
use super::{time_column, to_db_time, RelationalDb};
use crate::auth::permissions::{ROLE_ADMIN, ROLE_LECTURER, ROLE_STUDENT};
use crate::types::{MeritError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAccount {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role_id: String,
    pub role_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Account plus password hash, only ever loaded for login.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub account: UserAccount,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentProfile {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    pub student_number: Option<String>,
    pub program_study: Option<String>,
    pub advisor_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LecturerProfile {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    pub lecturer_number: Option<String>,
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role_id: String,
    /// Profile fields, used when the role is `student` or `lecturer`.
    pub student_number: Option<String>,
    pub program_study: Option<String>,
    pub lecturer_number: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
}

/// Identity lookups needed by the lifecycle engine and reports.
#[async_trait]
pub trait Directory: Send + Sync {
    /// The student profile of a user, if the user is a student.
    async fn student_for_user(&self, user_id: &str) -> Result<Option<StudentProfile>>;

    /// The lecturer profile of a user, if the user is a lecturer.
    async fn lecturer_for_user(&self, user_id: &str) -> Result<Option<LecturerProfile>>;

    async fn student(&self, student_id: &str) -> Result<Option<StudentProfile>>;

    /// Full names keyed by student id. Unknown ids are omitted.
    async fn student_names(&self, student_ids: &[String]) -> Result<HashMap<String, String>>;
}

// =============================================================================
// Row mapping
// =============================================================================

const USER_SELECT: &str = "SELECT u.id, u.username, u.email, u.full_name, u.role_id, \
     r.name AS role_name, u.is_active, u.created_at, u.updated_at, u.password_hash \
     FROM users u JOIN roles r ON r.id = u.role_id";

const STUDENT_SELECT: &str = "SELECT s.id, s.user_id, u.full_name, s.student_number, \
     s.program_study, s.advisor_id, s.created_at \
     FROM students s JOIN users u ON u.id = s.user_id";

const LECTURER_SELECT: &str = "SELECT l.id, l.user_id, u.full_name, l.lecturer_number, \
     l.department, l.created_at \
     FROM lecturers l JOIN users u ON u.id = l.user_id";

impl UserAccount {
    fn from_row(row: &Row) -> std::result::Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            email: row.get("email")?,
            full_name: row.get("full_name")?,
            role_id: row.get("role_id")?,
            role_name: row.get("role_name")?,
            is_active: row.get("is_active")?,
            created_at: time_column(row, "created_at")?,
            updated_at: time_column(row, "updated_at")?,
        })
    }
}

impl StudentProfile {
    fn from_row(row: &Row) -> std::result::Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            full_name: row.get("full_name")?,
            student_number: row.get("student_number")?,
            program_study: row.get("program_study")?,
            advisor_id: row.get("advisor_id")?,
            created_at: time_column(row, "created_at")?,
        })
    }
}

impl LecturerProfile {
    fn from_row(row: &Row) -> std::result::Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            full_name: row.get("full_name")?,
            lecturer_number: row.get("lecturer_number")?,
            department: row.get("department")?,
            created_at: time_column(row, "created_at")?,
        })
    }
}

/// Unique-constraint violations become conflicts; everything else stays a
/// database error.
fn map_write_error(err: rusqlite::Error, what: &str) -> MeritError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            MeritError::Conflict(format!("{} conflicts with an existing record", what))
        }
        _ => MeritError::Database(err.to_string()),
    }
}

// =============================================================================
// Users
// =============================================================================

pub fn get_user(conn: &Connection, id: &str) -> Result<Option<UserAccount>> {
    Ok(conn
        .query_row(
            &format!("{} WHERE u.id = ?1", USER_SELECT),
            [id],
            UserAccount::from_row,
        )
        .optional()?)
}

/// Look a user up by username or email.
pub fn find_credentials(conn: &Connection, identifier: &str) -> Result<Option<UserCredentials>> {
    Ok(conn
        .query_row(
            &format!("{} WHERE u.username = ?1 OR u.email = ?1", USER_SELECT),
            [identifier],
            |row| {
                Ok(UserCredentials {
                    account: UserAccount::from_row(row)?,
                    password_hash: row.get("password_hash")?,
                })
            },
        )
        .optional()?)
}

pub fn list_users(conn: &Connection) -> Result<Vec<UserAccount>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY u.username", USER_SELECT))?;
    let rows = stmt.query_map([], UserAccount::from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Create the profile row matching a role, if the role has one and the
/// user does not have it yet.
fn ensure_profile(
    conn: &Connection,
    user_id: &str,
    role_name: &str,
    user: Option<&NewUser>,
    now: &str,
) -> Result<()> {
    match role_name {
        ROLE_STUDENT => {
            conn.execute(
                "INSERT OR IGNORE INTO students (id, user_id, student_number, program_study, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    user_id,
                    user.and_then(|u| u.student_number.as_deref()),
                    user.and_then(|u| u.program_study.as_deref()),
                    now
                ],
            )?;
        }
        ROLE_LECTURER => {
            conn.execute(
                "INSERT OR IGNORE INTO lecturers (id, user_id, lecturer_number, department, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    user_id,
                    user.and_then(|u| u.lecturer_number.as_deref()),
                    user.and_then(|u| u.department.as_deref()),
                    now
                ],
            )?;
        }
        _ => {}
    }
    Ok(())
}

pub fn create_user(conn: &mut Connection, user: &NewUser) -> Result<UserAccount> {
    let role = get_role(conn, &user.role_id)?
        .ok_or_else(|| MeritError::Validation(format!("unknown role '{}'", user.role_id)))?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = to_db_time(Utc::now());

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO users (id, username, email, password_hash, full_name, role_id, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
        params![
            id,
            user.username,
            user.email,
            user.password_hash,
            user.full_name,
            user.role_id,
            now
        ],
    )
    .map_err(|e| map_write_error(e, "username or email"))?;
    ensure_profile(&tx, &id, &role.name, Some(user), &now)?;
    tx.commit()?;

    get_user(conn, &id)?.ok_or_else(|| MeritError::Database("created user not found".into()))
}

pub fn update_user(conn: &Connection, id: &str, update: &UserUpdate) -> Result<Option<UserAccount>> {
    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    let mut push = |column: &str, value: Value| {
        values.push(value);
        sets.push(format!("{} = ?{}", column, values.len()));
    };

    if let Some(v) = &update.username {
        push("username", Value::Text(v.clone()));
    }
    if let Some(v) = &update.email {
        push("email", Value::Text(v.clone()));
    }
    if let Some(v) = &update.full_name {
        push("full_name", Value::Text(v.clone()));
    }
    if let Some(v) = &update.password_hash {
        push("password_hash", Value::Text(v.clone()));
    }
    if let Some(v) = update.is_active {
        push("is_active", Value::Integer(v as i64));
    }
    push("updated_at", Value::Text(to_db_time(Utc::now())));

    values.push(Value::Text(id.to_string()));
    let sql = format!(
        "UPDATE users SET {} WHERE id = ?{}",
        sets.join(", "),
        values.len()
    );
    let rows = conn
        .execute(&sql, params_from_iter(values.iter()))
        .map_err(|e| map_write_error(e, "username or email"))?;
    if rows == 0 {
        return Ok(None);
    }
    get_user(conn, id)
}

/// Change a user's role, creating the matching profile if needed.
///
/// An existing student or lecturer profile is kept so historical references
/// stay attached to it.
pub fn set_user_role(conn: &mut Connection, id: &str, role_id: &str) -> Result<Option<UserAccount>> {
    let role = get_role(conn, role_id)?
        .ok_or_else(|| MeritError::Validation(format!("unknown role '{}'", role_id)))?;
    let now = to_db_time(Utc::now());

    let tx = conn.transaction()?;
    let rows = tx.execute(
        "UPDATE users SET role_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![role_id, now, id],
    )?;
    if rows == 0 {
        return Ok(None);
    }
    ensure_profile(&tx, id, &role.name, None, &now)?;
    tx.commit()?;

    get_user(conn, id)
}

// =============================================================================
// Students & lecturers
// =============================================================================

pub fn get_student(conn: &Connection, id: &str) -> Result<Option<StudentProfile>> {
    Ok(conn
        .query_row(
            &format!("{} WHERE s.id = ?1", STUDENT_SELECT),
            [id],
            StudentProfile::from_row,
        )
        .optional()?)
}

pub fn student_by_user(conn: &Connection, user_id: &str) -> Result<Option<StudentProfile>> {
    Ok(conn
        .query_row(
            &format!("{} WHERE s.user_id = ?1", STUDENT_SELECT),
            [user_id],
            StudentProfile::from_row,
        )
        .optional()?)
}

pub fn list_students(conn: &Connection, advisor_id: Option<&str>) -> Result<Vec<StudentProfile>> {
    let (sql, values) = match advisor_id {
        Some(advisor) => (
            format!("{} WHERE s.advisor_id = ?1 ORDER BY u.full_name", STUDENT_SELECT),
            vec![advisor.to_string()],
        ),
        None => (format!("{} ORDER BY u.full_name", STUDENT_SELECT), vec![]),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), StudentProfile::from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub fn get_lecturer(conn: &Connection, id: &str) -> Result<Option<LecturerProfile>> {
    Ok(conn
        .query_row(
            &format!("{} WHERE l.id = ?1", LECTURER_SELECT),
            [id],
            LecturerProfile::from_row,
        )
        .optional()?)
}

pub fn lecturer_by_user(conn: &Connection, user_id: &str) -> Result<Option<LecturerProfile>> {
    Ok(conn
        .query_row(
            &format!("{} WHERE l.user_id = ?1", LECTURER_SELECT),
            [user_id],
            LecturerProfile::from_row,
        )
        .optional()?)
}

pub fn list_lecturers(conn: &Connection) -> Result<Vec<LecturerProfile>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY u.full_name", LECTURER_SELECT))?;
    let rows = stmt.query_map([], LecturerProfile::from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Assign or clear a student's advisor.
pub fn set_advisor(
    conn: &Connection,
    student_id: &str,
    lecturer_id: Option<&str>,
) -> Result<Option<StudentProfile>> {
    if let Some(lecturer_id) = lecturer_id {
        if get_lecturer(conn, lecturer_id)?.is_none() {
            return Err(MeritError::NotFound(format!(
                "lecturer '{}' not found",
                lecturer_id
            )));
        }
    }
    let rows = conn.execute(
        "UPDATE students SET advisor_id = ?1 WHERE id = ?2",
        params![lecturer_id, student_id],
    )?;
    if rows == 0 {
        return Ok(None);
    }
    get_student(conn, student_id)
}

pub fn student_names(conn: &Connection, ids: &[String]) -> Result<HashMap<String, String>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let placeholders = (1..=ids.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT s.id, u.full_name FROM students s JOIN users u ON u.id = s.user_id
         WHERE s.id IN ({})",
        placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    Ok(rows.collect::<std::result::Result<HashMap<_, _>, _>>()?)
}

// =============================================================================
// Async API
// =============================================================================

impl RelationalDb {
    pub async fn user(&self, id: &str) -> Result<Option<UserAccount>> {
        let id = id.to_string();
        self.call(move |conn| get_user(conn, &id)).await
    }

    pub async fn credentials(&self, identifier: &str) -> Result<Option<UserCredentials>> {
        let identifier = identifier.to_string();
        self.call(move |conn| find_credentials(conn, &identifier))
            .await
    }

    pub async fn users(&self) -> Result<Vec<UserAccount>> {
        self.call(|conn| list_users(conn)).await
    }

    pub async fn create_user(&self, user: NewUser) -> Result<UserAccount> {
        self.call(move |conn| create_user(conn, &user)).await
    }

    pub async fn update_user(&self, id: &str, update: UserUpdate) -> Result<Option<UserAccount>> {
        let id = id.to_string();
        self.call(move |conn| update_user(conn, &id, &update)).await
    }

    /// Deactivate instead of deleting, so ownership of references survives.
    pub async fn deactivate_user(&self, id: &str) -> Result<Option<UserAccount>> {
        self.update_user(
            id,
            UserUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn set_user_role(&self, id: &str, role_id: &str) -> Result<Option<UserAccount>> {
        let (id, role_id) = (id.to_string(), role_id.to_string());
        self.call(move |conn| set_user_role(conn, &id, &role_id))
            .await
    }

    pub async fn students(&self, advisor_id: Option<&str>) -> Result<Vec<StudentProfile>> {
        let advisor_id = advisor_id.map(str::to_string);
        self.call(move |conn| list_students(conn, advisor_id.as_deref()))
            .await
    }

    pub async fn lecturer(&self, id: &str) -> Result<Option<LecturerProfile>> {
        let id = id.to_string();
        self.call(move |conn| get_lecturer(conn, &id)).await
    }

    pub async fn lecturers(&self) -> Result<Vec<LecturerProfile>> {
        self.call(|conn| list_lecturers(conn)).await
    }

    pub async fn set_advisor(
        &self,
        student_id: &str,
        lecturer_id: Option<&str>,
    ) -> Result<Option<StudentProfile>> {
        let student_id = student_id.to_string();
        let lecturer_id = lecturer_id.map(str::to_string);
        self.call(move |conn| set_advisor(conn, &student_id, lecturer_id.as_deref()))
            .await
    }

    /// Create the bootstrap admin account unless the username is taken.
    ///
    /// Returns `true` if an account was created.
    pub async fn ensure_admin(
        &self,
        username: &str,
        email: &str,
        password_hash: String,
    ) -> Result<bool> {
        if self.credentials(username).await?.is_some() {
            return Ok(false);
        }
        let role = self.require_role_by_name(ROLE_ADMIN).await?;
        let account = self
            .create_user(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
                full_name: "Administrator".to_string(),
                role_id: role.id,
                ..Default::default()
            })
            .await?;
        info!(user_id = %account.id, username, "Created bootstrap admin");
        Ok(true)
    }
}

#[async_trait]
impl Directory for RelationalDb {
    async fn student_for_user(&self, user_id: &str) -> Result<Option<StudentProfile>> {
        let user_id = user_id.to_string();
        self.call(move |conn| student_by_user(conn, &user_id)).await
    }

    async fn lecturer_for_user(&self, user_id: &str) -> Result<Option<LecturerProfile>> {
        let user_id = user_id.to_string();
        self.call(move |conn| lecturer_by_user(conn, &user_id)).await
    }

    async fn student(&self, student_id: &str) -> Result<Option<StudentProfile>> {
        let student_id = student_id.to_string();
        self.call(move |conn| get_student(conn, &student_id)).await
    }

    async fn student_names(&self, student_ids: &[String]) -> Result<HashMap<String, String>> {
        let ids = student_ids.to_vec();
        self.call(move |conn| student_names(conn, &ids)).await
    }
}
