//! Configuration for Merit
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::jwt::JwtValidator;
use crate::auth::resolver::PermissionCacheConfig;
use crate::lifecycle::EngineConfig;
use crate::types::{MeritError, Result};

/// Accepted range for `STORE_TIMEOUT_MS`
pub const STORE_TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 1_000..=10_000;

/// Merit - academic achievement tracking
#[derive(Parser, Debug, Clone)]
#[command(name = "merit")]
#[command(about = "Role-based academic achievement tracking backend")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (dev JWT secret, in-memory record store fallback)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "merit")]
    pub mongodb_db: String,

    /// SQLite database file for workflow state, users and roles
    #[arg(long, env = "SQLITE_PATH", default_value = "merit.db")]
    pub sqlite_path: PathBuf,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Access token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "86400")]
    pub jwt_expiry_seconds: u64,

    /// Refresh token expiry in seconds
    #[arg(long, env = "REFRESH_EXPIRY_SECONDS", default_value = "604800")]
    pub refresh_expiry_seconds: u64,

    /// Upper bound for a single store call, in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "5000")]
    pub store_timeout_ms: u64,

    /// How long a role's permission set stays cached
    #[arg(long, env = "PERMISSION_CACHE_TTL_SECS", default_value = "300")]
    pub permission_cache_ttl_secs: u64,

    /// Interval of the permission cache sweep
    #[arg(long, env = "PERMISSION_CACHE_CLEANUP_SECS", default_value = "600")]
    pub permission_cache_cleanup_secs: u64,

    /// Directory for uploaded evidence files
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// URL prefix under which uploaded files are served
    #[arg(long, env = "PUBLIC_UPLOAD_PREFIX", default_value = "/uploads")]
    pub public_upload_prefix: String,

    /// Largest accepted upload in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "10485760")]
    pub max_upload_bytes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Append audit events to this JSONL file
    #[arg(long, env = "AUDIT_LOG")]
    pub audit_log: Option<PathBuf>,

    /// Username of the admin account created on first start
    #[arg(long, env = "BOOTSTRAP_ADMIN_USERNAME")]
    pub bootstrap_admin_username: Option<String>,

    /// Password of the bootstrap admin account
    #[arg(long, env = "BOOTSTRAP_ADMIN_PASSWORD")]
    pub bootstrap_admin_password: Option<String>,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.dev_mode {
            match self.jwt_secret.as_deref() {
                None | Some("") => {
                    return Err(MeritError::Config(
                        "JWT_SECRET is required in production mode".into(),
                    ))
                }
                Some(secret) if secret.len() < 32 => {
                    return Err(MeritError::Config(
                        "JWT_SECRET must be at least 32 characters".into(),
                    ))
                }
                Some(_) => {}
            }
        }

        if !STORE_TIMEOUT_RANGE_MS.contains(&self.store_timeout_ms) {
            return Err(MeritError::Config(format!(
                "STORE_TIMEOUT_MS must be between {} and {}",
                STORE_TIMEOUT_RANGE_MS.start(),
                STORE_TIMEOUT_RANGE_MS.end()
            )));
        }

        if self.permission_cache_cleanup_secs < self.permission_cache_ttl_secs {
            return Err(MeritError::Config(
                "PERMISSION_CACHE_CLEANUP_SECS must not be shorter than PERMISSION_CACHE_TTL_SECS"
                    .into(),
            ));
        }

        if self.max_upload_bytes == 0 {
            return Err(MeritError::Config("MAX_UPLOAD_BYTES must be positive".into()));
        }

        match (&self.bootstrap_admin_username, &self.bootstrap_admin_password) {
            (Some(_), None) | (None, Some(_)) => Err(MeritError::Config(
                "BOOTSTRAP_ADMIN_USERNAME and BOOTSTRAP_ADMIN_PASSWORD must be set together"
                    .into(),
            )),
            _ => Ok(()),
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            store_timeout: self.store_timeout(),
        }
    }

    pub fn permission_cache_config(&self) -> PermissionCacheConfig {
        PermissionCacheConfig {
            ttl: Duration::from_secs(self.permission_cache_ttl_secs),
            cleanup_interval: Duration::from_secs(self.permission_cache_cleanup_secs),
        }
    }

    /// JWT validator for this configuration (dev secret when unset in dev mode)
    pub fn jwt_validator(&self) -> Result<JwtValidator> {
        match (&self.jwt_secret, self.dev_mode) {
            (None, true) => Ok(JwtValidator::new_dev()),
            (Some(secret), _) => JwtValidator::new(
                secret.clone(),
                self.jwt_expiry_seconds,
                self.refresh_expiry_seconds,
            ),
            (None, false) => Err(MeritError::Config(
                "JWT_SECRET is required in production mode".into(),
            )),
        }
    }
}
