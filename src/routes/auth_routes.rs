//! Authentication routes
//!
//! - `POST /api/v1/auth/login` - username or email plus password → token pair
//! - `POST /api/v1/auth/refresh` - refresh token → new token pair
//! - `POST /api/v1/auth/logout` - tokens are stateless; the client discards them
//! - `GET /api/v1/auth/profile` - the current user with permissions and profiles

use bytes::Bytes;
use hyper::{Method, Request, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::response::{authenticate, message, ok, parse_json, HttpResponse};
use crate::auth::jwt::{TokenInput, TokenPair, TokenType};
use crate::auth::password::verify_password;
use crate::db::relational::{Directory, LecturerProfile, StudentProfile, UserAccount};
use crate::server::AppState;
use crate::types::{MeritError, Result};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// A user together with what they may do.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub account: UserAccount,
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<StudentProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lecturer: Option<LecturerProfile>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: ProfileResponse,
}

async fn build_profile(state: &AppState, account: UserAccount) -> Result<ProfileResponse> {
    let engine = &state.engine;
    let permissions = engine
        .bounded(
            "permission lookup",
            state.resolver().permissions(&account.role_id),
        )
        .await?;
    let mut permissions: Vec<String> = permissions.iter().cloned().collect();
    permissions.sort();

    let student = engine
        .bounded("student lookup", state.db.student_for_user(&account.id))
        .await?;
    let lecturer = match student {
        Some(_) => None,
        None => {
            engine
                .bounded("lecturer lookup", state.db.lecturer_for_user(&account.id))
                .await?
        }
    };

    Ok(ProfileResponse {
        account,
        permissions,
        student,
        lecturer,
    })
}

async fn issue_tokens(state: &AppState, account: UserAccount) -> Result<AuthResponse> {
    let tokens = state.jwt.generate_pair(&TokenInput {
        user_id: account.id.clone(),
        role_id: account.role_id.clone(),
        username: account.username.clone(),
    })?;
    Ok(AuthResponse {
        tokens,
        user: build_profile(state, account).await?,
    })
}

/// POST /api/v1/auth/login
async fn handle_login(state: &AppState, req: &Request<Bytes>) -> Result<HttpResponse> {
    let body: LoginRequest = parse_json(req.body())?;
    if body.username.trim().is_empty() || body.password.is_empty() {
        return Err(MeritError::Validation(
            "Missing required fields: username, password".into(),
        ));
    }

    let credentials = state
        .engine
        .bounded("credentials lookup", state.db.credentials(body.username.trim()))
        .await?;
    let Some(credentials) = credentials else {
        warn!("Login failed - user not found: {}", body.username);
        return Err(MeritError::Unauthorized("Invalid credentials".into()));
    };

    if !verify_password(&body.password, &credentials.password_hash)? {
        warn!("Login failed - invalid password: {}", body.username);
        return Err(MeritError::Unauthorized("Invalid credentials".into()));
    }
    if !credentials.account.is_active {
        return Err(MeritError::Forbidden("Account is inactive".into()));
    }

    info!(user_id = %credentials.account.id, "Login successful");
    Ok(ok(&issue_tokens(state, credentials.account).await?))
}

/// POST /api/v1/auth/refresh
async fn handle_refresh(state: &AppState, req: &Request<Bytes>) -> Result<HttpResponse> {
    let body: RefreshRequest = parse_json(req.body())?;
    let claims = state
        .jwt
        .verify_token(&body.refresh_token, TokenType::Refresh)
        .into_claims()?;

    let account = state
        .engine
        .bounded("user lookup", state.db.user(&claims.sub))
        .await?
        .ok_or_else(|| MeritError::Unauthorized("User no longer exists".into()))?;
    if !account.is_active {
        return Err(MeritError::Forbidden("Account is inactive".into()));
    }

    Ok(ok(&issue_tokens(state, account).await?))
}

/// GET /api/v1/auth/profile
async fn handle_profile(state: &AppState, req: &Request<Bytes>) -> Result<HttpResponse> {
    let caller = authenticate(&state.jwt, req)?;
    let account = state
        .engine
        .bounded("user lookup", state.db.user(&caller.user_id))
        .await?
        .ok_or_else(|| MeritError::Unauthorized("User no longer exists".into()))?;
    Ok(ok(&build_profile(state, account).await?))
}

pub async fn handle(
    state: &AppState,
    req: &Request<Bytes>,
    rest: &[&str],
) -> Result<Option<HttpResponse>> {
    let response = match (req.method(), rest) {
        (&Method::POST, ["login"]) => handle_login(state, req).await?,
        (&Method::POST, ["refresh"]) => handle_refresh(state, req).await?,
        (&Method::POST, ["logout"]) => {
            authenticate(&state.jwt, req)?;
            message(StatusCode::OK, "Logged out")
        }
        (&Method::GET, ["profile"]) => handle_profile(state, req).await?,
        _ => return Ok(None),
    };
    Ok(Some(response))
}
