//! Student and lecturer routes

use bytes::Bytes;
use hyper::{Method, Request};
use serde::Deserialize;
use tracing::info;

use super::response::{authenticate, ok, parse_json, query_params, HttpResponse};
use crate::auth::gate::Caller;
use crate::auth::permissions::{LECTURER_LIST, STUDENT_READ, STUDENT_SET_ADVISOR};
use crate::db::relational::Directory;
use crate::lifecycle::{ListParams, ListQuery};
use crate::server::AppState;
use crate::types::{MeritError, Result};

#[derive(Debug, Deserialize)]
pub struct AdvisorRequest {
    /// `null` clears the advisor
    pub advisor_id: Option<String>,
}

async fn require(state: &AppState, caller: &Caller, permission: &str) -> Result<()> {
    state
        .engine
        .bounded("permission lookup", state.gate.require(caller, permission))
        .await
}

/// `/api/v1/students/...`
pub async fn handle_students(
    state: &AppState,
    req: &Request<Bytes>,
    rest: &[&str],
) -> Result<Option<HttpResponse>> {
    let caller = authenticate(&state.jwt, req)?;
    let engine = &state.engine;

    let response = match (req.method(), rest) {
        (&Method::GET, []) => {
            require(state, &caller, STUDENT_READ).await?;
            ok(&engine.bounded("student list", state.db.students(None)).await?)
        }
        (&Method::GET, [id]) => {
            require(state, &caller, STUDENT_READ).await?;
            let student = engine
                .bounded("student lookup", state.db.student(id))
                .await?
                .ok_or_else(|| MeritError::NotFound(format!("student '{}'", id)))?;
            ok(&student)
        }
        (&Method::GET, [id, "achievements"]) => {
            let params: ListParams = query_params(req)?;
            let query = ListQuery::from_params(&params)?;
            ok(&engine.student_achievements(&caller, id, &query).await?)
        }
        (&Method::PUT, [id, "advisor"]) => {
            require(state, &caller, STUDENT_SET_ADVISOR).await?;
            let body: AdvisorRequest = parse_json(req.body())?;
            let advisor = body
                .advisor_id
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty());
            let student = engine
                .bounded("student advisor", state.db.set_advisor(id, advisor))
                .await?
                .ok_or_else(|| MeritError::NotFound(format!("student '{}'", id)))?;
            info!(
                student_id = %student.id,
                advisor_id = ?student.advisor_id,
                by = %caller.user_id,
                "Advisor assigned"
            );
            ok(&student)
        }
        _ => return Ok(None),
    };
    Ok(Some(response))
}

/// `/api/v1/lecturers/...`
pub async fn handle_lecturers(
    state: &AppState,
    req: &Request<Bytes>,
    rest: &[&str],
) -> Result<Option<HttpResponse>> {
    let caller = authenticate(&state.jwt, req)?;
    let engine = &state.engine;

    let response = match (req.method(), rest) {
        (&Method::GET, []) => {
            require(state, &caller, LECTURER_LIST).await?;
            ok(&engine.bounded("lecturer list", state.db.lecturers()).await?)
        }
        (&Method::GET, [id, "advisees"]) => {
            require(state, &caller, LECTURER_LIST).await?;
            engine
                .bounded("lecturer lookup", state.db.lecturer(id))
                .await?
                .ok_or_else(|| MeritError::NotFound(format!("lecturer '{}'", id)))?;
            ok(&engine
                .bounded("student list", state.db.students(Some(id)))
                .await?)
        }
        _ => return Ok(None),
    };
    Ok(Some(response))
}
