//! SQLite store for workflow state, people and access control
//!
//! ## Tables
//!
//! - `roles`, `permissions`, `role_permissions` - role → permission sets
//! - `users` - login identities, each with exactly one role
//! - `students`, `lecturers` - academic profiles; a student has at most one
//!   advisor (a lecturer)
//! - `achievement_references` - authoritative workflow status of every
//!   achievement, paired 1:1 with a document-store record
//!
//! The connection sits behind a blocking mutex; every async entry point
//! hops onto the blocking pool through [`RelationalDb::call`].

pub mod access;
pub mod people;
pub mod references;
pub mod schema;

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use tracing::{debug, info};

use crate::types::{MeritError, Result};

pub use people::{
    Directory, LecturerProfile, NewUser, StudentProfile, UserAccount, UserCredentials, UserUpdate,
};
pub use references::{AchievementReference, ReferenceStore};

/// SQLite database shared by the reference store, directory and permission source
#[derive(Clone)]
pub struct RelationalDb {
    conn: Arc<Mutex<Connection>>,
}

impl RelationalDb {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening SQLite database at {:?}", path);

        let conn = Connection::open(path)
            .map_err(|e| MeritError::Database(format!("Failed to open SQLite: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| MeritError::Database(format!("Failed to set PRAGMA: {}", e)))?;

        Self::init(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory().map_err(|e| {
            MeritError::Database(format!("Failed to open in-memory SQLite: {}", e))
        })?;

        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| MeritError::Database(format!("Failed to set PRAGMA: {}", e)))?;
        schema::init_schema(&conn)?;
        access::seed_default_roles(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| MeritError::Internal(format!("Lock poisoned: {}", e)))?;
            f(&mut guard)
        })
        .await?
    }
}

/// Fixed-width RFC 3339 timestamp; sorts lexicographically in time order.
pub(crate) fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn time_column(row: &Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    parse_db_time(&raw)
}

pub(crate) fn opt_time_column(row: &Row, column: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(column)?;
    raw.as_deref().map(parse_db_time).transpose()
}

fn parse_db_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_on_disk_seeds_roles() {
        let dir = tempfile::tempdir().unwrap();
        let db = RelationalDb::open(&dir.path().join("merit.db")).unwrap();

        let roles: i64 = db
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM roles", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(roles, 3);
    }

    #[test]
    fn test_db_time_sorts_chronologically() {
        let early = DateTime::parse_from_rfc3339("2024-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = early + chrono::Duration::microseconds(1500);
        assert!(to_db_time(early) < to_db_time(late));
        assert_eq!(parse_db_time(&to_db_time(late)).unwrap(), late);
    }

    #[tokio::test]
    async fn test_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merit.db");
        drop(RelationalDb::open(&path).unwrap());
        let db = RelationalDb::open(&path).unwrap();

        let grants: i64 = db
            .call(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM role_permissions", [], |r| r.get(0))?)
            })
            .await
            .unwrap();
        let expected: usize = crate::auth::permissions::default_role_permissions()
            .iter()
            .map(|(_, perms)| perms.len())
            .sum();
        assert_eq!(grants as usize, expected);
    }
}
