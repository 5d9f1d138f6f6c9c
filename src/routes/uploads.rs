//! Serves stored evidence files back under `/uploads/{name}`

use super::response::{file_response, HttpResponse};
use crate::server::AppState;
use crate::types::Result;

pub async fn serve(state: &AppState, name: &str) -> Result<Option<HttpResponse>> {
    let bytes = state
        .engine
        .bounded("file read", state.files.read(name))
        .await?;
    Ok(bytes.map(file_response))
}
