//! Roles, permissions and their grants

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::debug;

use super::RelationalDb;
use crate::auth::permissions::{all_permissions, default_role_permissions};
use crate::auth::resolver::PermissionSource;
use crate::types::{MeritError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl Role {
    fn from_row(row: &Row) -> std::result::Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
        })
    }
}

/// Insert the built-in roles, permissions and grants if missing.
///
/// Existing grants are left alone, so permissions revoked by an operator
/// are only re-added if the role itself was removed.
pub fn seed_default_roles(conn: &Connection) -> Result<()> {
    for name in all_permissions() {
        conn.execute(
            "INSERT OR IGNORE INTO permissions (id, name) VALUES (?1, ?2)",
            params![uuid::Uuid::new_v4().to_string(), name],
        )?;
    }

    for (role, perms) in default_role_permissions() {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO roles (id, name, description) VALUES (?1, ?2, ?3)",
            params![
                uuid::Uuid::new_v4().to_string(),
                role,
                format!("Built-in {} role", role)
            ],
        )?;
        if inserted == 0 {
            continue;
        }
        for perm in perms {
            conn.execute(
                "INSERT OR IGNORE INTO role_permissions (role_id, permission_id)
                 SELECT r.id, p.id FROM roles r, permissions p
                 WHERE r.name = ?1 AND p.name = ?2",
                params![role, perm],
            )?;
        }
        debug!(role, permissions = perms.len(), "Seeded role");
    }

    Ok(())
}

pub fn get_role(conn: &Connection, id: &str) -> Result<Option<Role>> {
    Ok(conn
        .query_row(
            "SELECT id, name, description FROM roles WHERE id = ?1",
            [id],
            Role::from_row,
        )
        .optional()?)
}

pub fn get_role_by_name(conn: &Connection, name: &str) -> Result<Option<Role>> {
    Ok(conn
        .query_row(
            "SELECT id, name, description FROM roles WHERE name = ?1",
            [name],
            Role::from_row,
        )
        .optional()?)
}

pub fn list_roles(conn: &Connection) -> Result<Vec<Role>> {
    let mut stmt = conn.prepare("SELECT id, name, description FROM roles ORDER BY name")?;
    let rows = stmt.query_map([], Role::from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub fn permissions_for_role(conn: &Connection, role_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT p.name FROM permissions p
         JOIN role_permissions rp ON rp.permission_id = p.id
         WHERE rp.role_id = ?1
         ORDER BY p.name",
    )?;
    let rows = stmt.query_map([role_id], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

impl RelationalDb {
    pub async fn role(&self, id: &str) -> Result<Option<Role>> {
        let id = id.to_string();
        self.call(move |conn| get_role(conn, &id)).await
    }

    pub async fn role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let name = name.to_string();
        self.call(move |conn| get_role_by_name(conn, &name)).await
    }

    pub async fn require_role_by_name(&self, name: &str) -> Result<Role> {
        self.role_by_name(name)
            .await?
            .ok_or_else(|| MeritError::NotFound(format!("role '{}' not found", name)))
    }

    pub async fn roles(&self) -> Result<Vec<Role>> {
        self.call(|conn| list_roles(conn)).await
    }
}

#[async_trait]
impl PermissionSource for RelationalDb {
    async fn permissions_for_role(&self, role_id: &str) -> Result<Vec<String>> {
        let role_id = role_id.to_string();
        self.call(move |conn| permissions_for_role(conn, &role_id)).await
    }
}
