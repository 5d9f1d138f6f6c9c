//! Liveness endpoint
//!
//! `/health` returns 200 while the process is serving, together with the
//! permission cache statistics.

use hyper::StatusCode;
use serde::Serialize;

use super::response::{json_response, HttpResponse};
use crate::auth::resolver::CacheStatsSnapshot;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    pub timestamp: String,
    pub dev_mode: bool,
    pub permission_cache: PermissionCacheHealth,
}

#[derive(Serialize)]
pub struct PermissionCacheHealth {
    pub entries: usize,
    #[serde(flatten)]
    pub stats: CacheStatsSnapshot,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let cache = state.resolver().cache();
    HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        dev_mode: state.args.dev_mode,
        permission_cache: PermissionCacheHealth {
            entries: cache.len(),
            stats: cache.stats(),
        },
    }
}

/// GET /health
pub fn health_check(state: &AppState) -> HttpResponse {
    json_response(StatusCode::OK, &build_health_response(state))
}
