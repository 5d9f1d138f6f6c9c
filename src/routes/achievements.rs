//! Achievement routes, one per lifecycle operation
//!
//! | method | path | operation |
//! |---|---|---|
//! | POST | /api/v1/achievements | create draft |
//! | GET | /api/v1/achievements | list |
//! | GET | /api/v1/achievements/{id} | detail |
//! | PUT | /api/v1/achievements/{id} | update |
//! | DELETE | /api/v1/achievements/{id} | delete |
//! | POST | /api/v1/achievements/{id}/submit | submit |
//! | POST | /api/v1/achievements/{id}/verify | verify |
//! | POST | /api/v1/achievements/{id}/reject | reject |
//! | POST | /api/v1/achievements/{id}/attachments | add attachment |
//! | GET | /api/v1/achievements/{id}/history | history |

use bytes::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request};
use serde::Deserialize;

use super::response::{authenticate, created, header, ok, parse_json, query_params, HttpResponse};
use crate::db::records::RecordPatch;
use crate::lifecycle::{DraftInput, ListParams, ListQuery, RejectInput, VerifyInput};
use crate::server::AppState;
use crate::storage::FileUpload;
use crate::types::{MeritError, Result};

pub const FILE_NAME_HEADER: &str = "x-file-name";

#[derive(Debug, Default, Deserialize)]
struct AttachmentParams {
    file_name: Option<String>,
}

/// Raw body upload; the name comes from `X-File-Name` or `?file_name=`.
fn upload_from(req: &Request<Bytes>) -> Result<FileUpload> {
    let params: AttachmentParams = query_params(req)?;
    let file_name = header(req, FILE_NAME_HEADER)
        .map(str::to_string)
        .or(params.file_name)
        .ok_or_else(|| {
            MeritError::Validation("file name required (X-File-Name header or file_name)".into())
        })?;

    Ok(FileUpload {
        file_name,
        content_type: header(req, CONTENT_TYPE.as_str()).map(str::to_string),
        bytes: req.body().clone(),
    })
}

pub async fn handle(
    state: &AppState,
    req: &Request<Bytes>,
    rest: &[&str],
) -> Result<Option<HttpResponse>> {
    let caller = authenticate(&state.jwt, req)?;
    let engine = &state.engine;

    let response = match (req.method(), rest) {
        (&Method::POST, []) => {
            let input: DraftInput = parse_json(req.body())?;
            created(&engine.create_draft(&caller, input).await?)
        }
        (&Method::GET, []) => {
            let params: ListParams = query_params(req)?;
            let query = ListQuery::from_params(&params)?;
            ok(&engine.list(&caller, &query).await?)
        }
        (&Method::GET, [id]) => ok(&engine.detail(&caller, id).await?),
        (&Method::PUT, [id]) => {
            let patch: RecordPatch = parse_json(req.body())?;
            ok(&engine.update(&caller, id, patch).await?)
        }
        (&Method::DELETE, [id]) => ok(&engine.delete(&caller, id).await?),
        (&Method::POST, [id, "submit"]) => ok(&engine.submit(&caller, id).await?),
        (&Method::POST, [id, "verify"]) => {
            let input: VerifyInput = parse_json(req.body())?;
            ok(&engine.verify(&caller, id, input).await?)
        }
        (&Method::POST, [id, "reject"]) => {
            let input: RejectInput = parse_json(req.body())?;
            ok(&engine.reject(&caller, id, input).await?)
        }
        (&Method::POST, [id, "attachments"]) => {
            let upload = upload_from(req)?;
            created(&engine.add_attachment(&caller, id, upload).await?)
        }
        (&Method::GET, [id, "history"]) => ok(&engine.history(&caller, id).await?),
        _ => return Ok(None),
    };

    Ok(Some(response))
}
