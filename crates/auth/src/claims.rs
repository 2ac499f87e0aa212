use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AuthError;

/// `iss` claim on every token this service mints.
pub const ISSUER: &str = "ANI_TECH_LLC";

/// `aud` claim on every token this service mints.
pub const AUDIENCE: &str = "CUSTOMER_MANAGEMENT_SERVICE";

/// 30 minutes.
pub const ACCESS_TOKEN_LIFETIME_MS: i64 = 1_800_000;

/// 5 days.
pub const REFRESH_TOKEN_LIFETIME_MS: i64 = 432_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn lifetime(self) -> Duration {
        match self {
            TokenKind::Access => Duration::milliseconds(ACCESS_TOKEN_LIFETIME_MS),
            TokenKind::Refresh => Duration::milliseconds(REFRESH_TOKEN_LIFETIME_MS),
        }
    }
}

/// Signed token payload.
///
/// `iat`/`exp` travel as NumericDate (whole seconds). Refresh tokens carry no
/// `authorities` claim at all, which is different from an empty list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub iat: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub exp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorities: Option<Vec<String>>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

impl From<TokenValidationError> for AuthError {
    fn from(value: TokenValidationError) -> Self {
        match value {
            TokenValidationError::Expired => AuthError::TokenExpired,
            other => AuthError::TokenInvalid(other.to_string()),
        }
    }
}

/// Deterministically validate the time window of decoded claims.
///
/// Signature, issuer and audience are checked while decoding; this covers
/// what depends on the clock. A token is expired from the instant `exp` is
/// reached.
pub fn validate_claims(claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
