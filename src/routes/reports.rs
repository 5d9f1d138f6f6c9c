//! Report routes (`report:view`)

use bytes::Bytes;
use hyper::{Method, Request};

use super::response::{authenticate, ok, HttpResponse};
use crate::server::AppState;
use crate::types::Result;

pub async fn handle(
    state: &AppState,
    req: &Request<Bytes>,
    rest: &[&str],
) -> Result<Option<HttpResponse>> {
    let caller = authenticate(&state.jwt, req)?;

    let response = match (req.method(), rest) {
        (&Method::GET, ["statistics"]) => ok(&state.reports.statistics(&caller).await?),
        (&Method::GET, ["student", id]) => ok(&state.reports.student_report(&caller, id).await?),
        _ => return Ok(None),
    };
    Ok(Some(response))
}
