//! Authentication and authorization for Merit
//!
//! Provides:
//! - JWT access/refresh token generation and validation
//! - Password hashing with Argon2
//! - Permission names and the built-in role table
//! - Cached role → permission resolution
//! - The authorization gate used by every lifecycle operation

pub mod gate;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod resolver;

pub use gate::{resource_access, AuthorizationGate, Caller, ResourceAccess};
pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput, TokenPair, TokenType};
pub use password::{hash_password, validate_password, verify_password};
pub use permissions::Tier;
pub use resolver::{
    spawn_permission_cleanup_task, CacheStatsSnapshot, PermissionCacheConfig, PermissionResolver,
    PermissionSource,
};
