//! Merit - academic achievement tracking backend

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use merit::{
    auth::password::hash_password,
    auth::resolver::spawn_permission_cleanup_task,
    config::Args,
    db::{records::RecordStore, MemoryRecordStore, MongoClient, MongoRecordStore, RelationalDb},
    logging::AuditLogger,
    server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("merit={},info", log_level).into());
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Merit - Achievement Tracking");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("SQLite: {}", args.sqlite_path.display());
    info!("MongoDB: {} (db: {})", args.mongodb_uri, args.mongodb_db);
    info!("Uploads: {}", args.upload_dir.display());
    info!("Store timeout: {}ms", args.store_timeout_ms);
    info!("======================================");

    let db = RelationalDb::open(&args.sqlite_path)?;

    // MongoDB holds the records; dev mode falls back to memory
    let records: Arc<dyn RecordStore> = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Arc::new(MongoRecordStore::new(&client).await?)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory records): {}", e);
                Arc::new(MemoryRecordStore::new())
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let audit = AuditLogger::new();
    if let Some(path) = &args.audit_log {
        audit.init_file(path.clone()).await?;
    }

    if let (Some(username), Some(password)) = (
        args.bootstrap_admin_username.as_deref(),
        args.bootstrap_admin_password.as_deref(),
    ) {
        let email = format!("{}@localhost", username);
        if db.ensure_admin(username, &email, hash_password(password)?).await? {
            info!("Bootstrap admin '{}' created", username);
        }
    }

    let state = Arc::new(server::AppState::new(args, db, records, audit)?);
    state.files.ensure_dir().await?;

    let _cleanup = spawn_permission_cleanup_task(Arc::clone(state.resolver()));

    server::run(state).await?;
    Ok(())
}
