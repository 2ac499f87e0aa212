//! Short-lived verification artifacts and their generators.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use capita_core::UserId;

/// Length of an MFA code.
pub const MFA_CODE_LENGTH: usize = 8;

/// Default MFA code lifetime (24 hours).
pub const MFA_CODE_TTL_HOURS: i64 = 24;

/// Default password-reset link lifetime (24 hours).
pub const RESET_LINK_TTL_HOURS: i64 = 24;

/// A one-time MFA code; at most one is live per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCode {
    pub user_id: UserId,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl VerificationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationType {
    Account,
    Password,
}

impl VerificationType {
    /// Path segment used in link URLs.
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationType::Account => "account",
            VerificationType::Password => "password",
        }
    }
}

impl core::fmt::Display for VerificationType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account-activation or password-reset link.
///
/// Account links never expire (`expires_at == None`) and are kept after use so
/// a second visit can report "already verified". Password links expire and
/// are deleted when consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationLink {
    pub user_id: UserId,
    pub key: String,
    pub url: String,
    pub kind: VerificationType,
    pub expires_at: Option<DateTime<Utc>>,
}

impl VerificationLink {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// `{base}/users/verify/{kind}/{key}`
pub fn verification_url(base_url: &str, kind: VerificationType, key: &str) -> String {
    format!("{}/users/verify/{}/{}", base_url.trim_end_matches('/'), kind, key)
}

/// Codes are compared in canonical (trimmed, upper-case) form.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Source of unguessable codes and keys.
pub trait SecretGenerator: Send + Sync {
    /// An [`MFA_CODE_LENGTH`]-character upper-case alphanumeric code.
    fn mfa_code(&self) -> String;

    /// An opaque URL-safe key for verification links.
    fn link_key(&self) -> String;
}

/// CSPRNG-backed generator (thread-local ChaCha seeded from the OS, UUIDv4 keys).
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSecretGenerator;

impl SecretGenerator for RandomSecretGenerator {
    fn mfa_code(&self) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(MFA_CODE_LENGTH)
            .map(char::from)
            .collect::<String>()
            .to_ascii_uppercase()
    }

    fn link_key(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
