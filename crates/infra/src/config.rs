//! Environment-driven configuration, read once at startup.

use std::net::SocketAddr;

use chrono::Duration;
use thiserror::Error;
use tracing::warn;

use capita_auth::VerificationSettings;
use capita_auth::verification::{MFA_CODE_TTL_HOURS, RESET_LINK_TTL_HOURS};

pub const DEV_JWT_SECRET: &str = "dev-secret";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub public_base_url: String,
    pub bind_addr: SocketAddr,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub reset_link_ttl: Duration,
    pub mfa_code_ttl: Duration,
    pub bcrypt_cost: u32,
}

impl core::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("public_base_url", &self.public_base_url)
            .field("bind_addr", &self.bind_addr)
            .field("use_persistent_stores", &self.use_persistent_stores)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("reset_link_ttl", &self.reset_link_ttl)
            .field("mfa_code_ttl", &self.mfa_code_ttl)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source.
    ///
    /// With persistent stores enabled, `JWT_SECRET` and `DATABASE_URL` are
    /// mandatory. Otherwise a missing secret falls back to [`DEV_JWT_SECRET`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let use_persistent_stores = match get("USE_PERSISTENT_STORES") {
            Some(raw) => raw.trim().parse::<bool>().map_err(|e| ConfigError::Invalid {
                name: "USE_PERSISTENT_STORES",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => false,
        };

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if use_persistent_stores => return Err(ConfigError::Missing("JWT_SECRET")),
            None => {
                warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let database_url = get("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let bind_raw = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
            name: "BIND_ADDR",
            value: bind_raw.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            jwt_secret,
            public_base_url: get("PUBLIC_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string()),
            bind_addr,
            use_persistent_stores,
            database_url,
            reset_link_ttl: hours(get("RESET_LINK_TTL_HOURS"), "RESET_LINK_TTL_HOURS", RESET_LINK_TTL_HOURS)?,
            mfa_code_ttl: hours(get("MFA_CODE_TTL_HOURS"), "MFA_CODE_TTL_HOURS", MFA_CODE_TTL_HOURS)?,
            bcrypt_cost: bcrypt_cost(get("BCRYPT_COST"))?,
        })
    }

    pub fn verification_settings(&self) -> VerificationSettings {
        VerificationSettings {
            public_base_url: self.public_base_url.clone(),
            mfa_code_ttl: self.mfa_code_ttl,
            reset_link_ttl: self.reset_link_ttl,
        }
    }
}

fn hours(raw: Option<String>, name: &'static str, default: i64) -> Result<Duration, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Duration::hours(default));
    };
    match raw.trim().parse::<i64>() {
        Ok(h) if h > 0 => Ok(Duration::hours(h)),
        Ok(_) => Err(ConfigError::Invalid {
            name,
            value: raw,
            reason: "must be a positive number of hours".to_string(),
        }),
        Err(e) => Err(ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value: raw,
        }),
    }
}

fn bcrypt_cost(raw: Option<String>) -> Result<u32, ConfigError> {
    let Some(raw) = raw else {
        return Ok(bcrypt::DEFAULT_COST);
    };
    match raw.trim().parse::<u32>() {
        Ok(cost) if (4..=31).contains(&cost) => Ok(cost),
        _ => Err(ConfigError::Invalid {
            name: "BCRYPT_COST",
            value: raw,
            reason: "must be between 4 and 31".to_string(),
        }),
    }
}
