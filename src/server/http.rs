//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Request bodies are
//! buffered (bounded by `MAX_UPLOAD_BYTES`) before routing, so handlers work
//! on `Request<Bytes>`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::gate::AuthorizationGate;
use crate::auth::jwt::JwtValidator;
use crate::auth::resolver::PermissionResolver;
use crate::config::Args;
use crate::db::records::RecordStore;
use crate::db::relational::RelationalDb;
use crate::lifecycle::{AchievementEngine, EngineStores};
use crate::logging::AuditLogger;
use crate::routes::{self, response};
use crate::services::ReportService;
use crate::storage::LocalFileStore;
use crate::types::{MeritError, Result};

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Users, roles, profiles and achievement references
    pub db: RelationalDb,
    /// Evidence files, also served back under `/uploads`
    pub files: Arc<LocalFileStore>,
    pub jwt: JwtValidator,
    pub gate: Arc<AuthorizationGate>,
    pub engine: Arc<AchievementEngine>,
    pub reports: ReportService,
    pub audit: AuditLogger,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the gate, engine and services on top of the given stores.
    pub fn new(
        args: Args,
        db: RelationalDb,
        records: Arc<dyn RecordStore>,
        audit: AuditLogger,
    ) -> Result<Self> {
        let jwt = args.jwt_validator()?;
        let resolver = Arc::new(PermissionResolver::new(
            Arc::new(db.clone()),
            args.permission_cache_config(),
        ));
        let gate = Arc::new(AuthorizationGate::new(resolver));
        let files = Arc::new(LocalFileStore::new(
            args.upload_dir.clone(),
            &args.public_upload_prefix,
            args.max_upload_bytes,
        ));

        let stores = EngineStores {
            references: Arc::new(db.clone()),
            directory: Arc::new(db.clone()),
            records,
            files: files.clone(),
        };
        let engine = Arc::new(AchievementEngine::new(
            stores,
            Arc::clone(&gate),
            audit.clone(),
            args.engine_config(),
        ));
        let reports = ReportService::new(Arc::clone(&engine));

        Ok(Self {
            args,
            db,
            files,
            jwt,
            gate,
            engine,
            reports,
            audit,
            started_at: Instant::now(),
        })
    }

    pub fn resolver(&self) -> &Arc<PermissionResolver> {
        self.gate.resolver()
    }
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Merit listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - dev JWT secret may be in use");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();

    let bytes = match Limited::new(body, state.args.max_upload_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            let err = if e.downcast_ref::<LengthLimitError>().is_some() {
                MeritError::PayloadTooLarge(format!(
                    "request body exceeds {} bytes",
                    state.args.max_upload_bytes
                ))
            } else {
                MeritError::Validation(format!("Failed to read body: {}", e))
            };
            return Ok(response::error_response(&err));
        }
    };

    let req = Request::from_parts(parts, bytes);
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = routes::dispatch(state, req).await;

    debug!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        remote = %addr,
        "Request handled"
    );
    Ok(response)
}
