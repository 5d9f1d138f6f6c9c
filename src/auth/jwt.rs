//! JWT access and refresh tokens
//!
//! - HS256 (HMAC-SHA256) signatures
//! - Access tokens expire after the configured lifetime (24 hours by default)
//! - Refresh tokens last 7 days and carry `token_type: refresh`; neither kind
//!   is accepted where the other is expected

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::gate::Caller;
use crate::types::MeritError;

pub const DEFAULT_ACCESS_EXPIRY_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_REFRESH_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Payload stored in JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    pub role_id: String,
    pub username: String,
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl Claims {
    pub fn caller(&self) -> Caller {
        Caller {
            user_id: self.sub.clone(),
            role_id: self.role_id.clone(),
        }
    }
}

/// Input for creating a new token
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub user_id: String,
    pub role_id: String,
    pub username: String,
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }

    /// Claims of a valid token, or an `Unauthorized` error.
    pub fn into_claims(self) -> Result<Claims, MeritError> {
        match self.claims {
            Some(claims) if self.valid => Ok(claims),
            _ => Err(MeritError::Unauthorized(
                self.error.unwrap_or_else(|| "Invalid token".into()),
            )),
        }
    }
}

/// An access token plus the refresh token that renews it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
    refresh_expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(
        secret: String,
        expiry_seconds: u64,
        refresh_expiry_seconds: u64,
    ) -> Result<Self, MeritError> {
        if secret.is_empty() {
            return Err(MeritError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(MeritError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
            refresh_expiry_seconds,
        })
    }

    /// Create a validator for dev mode (allows empty secret)
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            expiry_seconds: DEFAULT_ACCESS_EXPIRY_SECS,
            refresh_expiry_seconds: DEFAULT_REFRESH_EXPIRY_SECS,
        }
    }

    pub fn expiry_seconds(&self) -> u64 {
        self.expiry_seconds
    }

    fn sign(&self, input: &TokenInput, token_type: TokenType, ttl: u64) -> Result<String, MeritError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| MeritError::Internal(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            sub: input.user_id.clone(),
            role_id: input.role_id.clone(),
            username: input.username.clone(),
            token_type,
            iat: now,
            exp: now + ttl,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| MeritError::Internal(format!("Failed to generate token: {}", e)))
    }

    pub fn generate_token(&self, input: &TokenInput) -> Result<String, MeritError> {
        self.sign(input, TokenType::Access, self.expiry_seconds)
    }

    pub fn generate_refresh_token(&self, input: &TokenInput) -> Result<String, MeritError> {
        self.sign(input, TokenType::Refresh, self.refresh_expiry_seconds)
    }

    pub fn generate_pair(&self, input: &TokenInput) -> Result<TokenPair, MeritError> {
        Ok(TokenPair {
            token: self.generate_token(input)?,
            refresh_token: self.generate_refresh_token(input)?,
            expires_in: self.expiry_seconds,
        })
    }

    /// Verify and decode a JWT token of the expected type
    pub fn verify_token(&self, token: &str, expected: TokenType) -> TokenValidationResult {
        let validation = Validation::default();

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(token_data) if token_data.claims.token_type == expected => {
                TokenValidationResult::valid(token_data.claims)
            }
            Ok(_) => TokenValidationResult::invalid("Wrong token type"),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let error_msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidToken => "Invalid token",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    _ => "Token validation failed",
                };
                TokenValidationResult::invalid(error_msg)
            }
        }
    }
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format only.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let token = auth_header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
