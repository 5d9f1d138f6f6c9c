//! HTTP routes for Merit
//!
//! [`dispatch`] splits the path into segments and hands the request to the
//! module owning the prefix. Route modules return `Ok(None)` for paths they
//! do not know, which becomes a 404.

pub mod achievements;
pub mod auth_routes;
pub mod health;
pub mod reports;
pub mod response;
pub mod students;
pub mod uploads;
pub mod users;

use std::sync::Arc;

use bytes::Bytes;
use hyper::{Method, Request};

use crate::server::AppState;
use response::HttpResponse;

pub use health::health_check;

/// Route a buffered request.
pub async fn dispatch(state: Arc<AppState>, req: Request<Bytes>) -> HttpResponse {
    if req.method() == Method::OPTIONS {
        return response::cors_preflight();
    }

    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let result = match segments.as_slice() {
        ["health"] if req.method() == Method::GET => Ok(Some(health_check(&state))),
        ["uploads", name] if req.method() == Method::GET => uploads::serve(&state, name).await,
        ["api", "v1", "auth", rest @ ..] => auth_routes::handle(&state, &req, rest).await,
        ["api", "v1", "achievements", rest @ ..] => achievements::handle(&state, &req, rest).await,
        ["api", "v1", "users", rest @ ..] => users::handle(&state, &req, rest).await,
        ["api", "v1", "students", rest @ ..] => students::handle_students(&state, &req, rest).await,
        ["api", "v1", "lecturers", rest @ ..] => {
            students::handle_lecturers(&state, &req, rest).await
        }
        ["api", "v1", "reports", rest @ ..] => reports::handle(&state, &req, rest).await,
        _ => Ok(None),
    };

    match result {
        Ok(Some(response)) => response,
        Ok(None) => response::not_found(&path),
        Err(e) => response::error_response(&e),
    }
}
