//! User administration (`user:manage`)
//!
//! Deleting a user only deactivates the account; references owned by the
//! user's student profile must stay attached to it.

use bytes::Bytes;
use hyper::{Method, Request};
use serde::Deserialize;
use tracing::info;

use super::response::{authenticate, created, ok, parse_json, HttpResponse};
use crate::auth::gate::Caller;
use crate::auth::password::{hash_password, validate_password};
use crate::auth::permissions::USER_MANAGE;
use crate::db::relational::{NewUser, UserUpdate};
use crate::server::AppState;
use crate::types::{MeritError, Result};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    /// Role id; `role` (a role name) is accepted instead
    #[serde(default)]
    pub role_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub student_number: Option<String>,
    #[serde(default)]
    pub program_study: Option<String>,
    #[serde(default)]
    pub lecturer_number: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RoleRequest {
    pub role_id: Option<String>,
    pub role: Option<String>,
}

fn required(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(MeritError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

async fn resolve_role(
    state: &AppState,
    role_id: Option<String>,
    role_name: Option<String>,
) -> Result<String> {
    match (role_id, role_name) {
        (Some(id), _) => Ok(id),
        (None, Some(name)) => {
            let role = state
                .engine
                .bounded("role lookup", state.db.role_by_name(name.trim()))
                .await?
                .ok_or_else(|| MeritError::Validation(format!("unknown role '{}'", name)))?;
            Ok(role.id)
        }
        (None, None) => Err(MeritError::Validation("role_id or role is required".into())),
    }
}

async fn create_user(state: &AppState, caller: &Caller, body: CreateUserRequest) -> Result<HttpResponse> {
    let username = required(&body.username, "username")?;
    let email = required(&body.email, "email")?;
    let full_name = required(&body.full_name, "full_name")?;
    validate_password(&body.password)?;
    let role_id = resolve_role(state, body.role_id, body.role).await?;

    let user = NewUser {
        username,
        email,
        password_hash: hash_password(&body.password)?,
        full_name,
        role_id,
        student_number: body.student_number,
        program_study: body.program_study,
        lecturer_number: body.lecturer_number,
        department: body.department,
    };
    let account = state
        .engine
        .bounded("user insert", state.db.create_user(user))
        .await?;
    info!(user_id = %account.id, role = %account.role_name, by = %caller.user_id, "User created");
    Ok(created(&account))
}

async fn update_user(state: &AppState, id: &str, body: UpdateUserRequest) -> Result<HttpResponse> {
    let password_hash = match body.password.as_deref() {
        Some(password) => {
            validate_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };
    let update = UserUpdate {
        username: body.username.as_deref().map(|v| required(v, "username")).transpose()?,
        email: body.email.as_deref().map(|v| required(v, "email")).transpose()?,
        full_name: body
            .full_name
            .as_deref()
            .map(|v| required(v, "full_name"))
            .transpose()?,
        password_hash,
        is_active: body.is_active,
    };

    let account = state
        .engine
        .bounded("user update", state.db.update_user(id, update))
        .await?
        .ok_or_else(|| MeritError::NotFound(format!("user '{}'", id)))?;
    Ok(ok(&account))
}

pub async fn handle(
    state: &AppState,
    req: &Request<Bytes>,
    rest: &[&str],
) -> Result<Option<HttpResponse>> {
    let caller = authenticate(&state.jwt, req)?;
    state
        .engine
        .bounded("permission lookup", state.gate.require(&caller, USER_MANAGE))
        .await?;
    let engine = &state.engine;

    let response = match (req.method(), rest) {
        (&Method::GET, []) => ok(&engine.bounded("user list", state.db.users()).await?),
        (&Method::POST, []) => create_user(state, &caller, parse_json(req.body())?).await?,
        (&Method::GET, [id]) => {
            let account = engine
                .bounded("user lookup", state.db.user(id))
                .await?
                .ok_or_else(|| MeritError::NotFound(format!("user '{}'", id)))?;
            ok(&account)
        }
        (&Method::PUT, [id]) => update_user(state, id, parse_json(req.body())?).await?,
        (&Method::DELETE, [id]) => {
            let account = engine
                .bounded("user deactivate", state.db.deactivate_user(id))
                .await?
                .ok_or_else(|| MeritError::NotFound(format!("user '{}'", id)))?;
            info!(user_id = %account.id, by = %caller.user_id, "User deactivated");
            ok(&account)
        }
        (&Method::PUT, [id, "role"]) => {
            let body: RoleRequest = parse_json(req.body())?;
            let role_id = resolve_role(state, body.role_id, body.role).await?;
            let account = engine
                .bounded("user role", state.db.set_user_role(id, &role_id))
                .await?
                .ok_or_else(|| MeritError::NotFound(format!("user '{}'", id)))?;
            info!(user_id = %account.id, role = %account.role_name, by = %caller.user_id, "User role changed");
            ok(&account)
        }
        _ => return Ok(None),
    };
    Ok(Some(response))
}
