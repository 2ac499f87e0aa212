//! Identity records and registration input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use capita_core::{DomainError, DomainResult, UserId};

/// A registered identity as the identity store keeps it.
///
/// # Invariants
/// - `email` is unique and stored normalized (see [`normalize_email`]).
/// - A fresh identity is disabled and unlocked; `enabled` flips to `true`
///   through account verification only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: Option<String>,
    pub enabled: bool,
    pub locked: bool,
    pub mfa_enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to insert a new identity (password already hashed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIdentity {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub mfa_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl NewIdentity {
    /// Materialize the record with registration defaults.
    pub fn into_identity(self) -> Identity {
        Identity {
            id: self.id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            password_hash: self.password_hash,
            phone: self.phone,
            enabled: false,
            locked: false,
            mfa_enabled: self.mfa_enabled,
            created_at: self.created_at,
        }
    }
}

/// Registration form as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mfa_enabled: bool,
}

impl Registration {
    /// Field checks; all messages are collected and joined with `" | "`.
    pub fn validate(&self) -> DomainResult<()> {
        let mut problems: Vec<&'static str> = Vec::new();
        if self.first_name.trim().is_empty() {
            problems.push("First name cannot be empty.");
        }
        if self.last_name.trim().is_empty() {
            problems.push("Last name cannot be empty.");
        }
        if self.email.trim().is_empty() {
            problems.push("Email cannot be empty.");
        } else if !looks_like_email(self.email.trim()) {
            problems.push("Invalid email. Please enter a valid email address.");
        }
        if self.password.is_empty() {
            problems.push("Password cannot be empty.");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation(problems.join(" | ")))
        }
    }
}

/// Canonical form used for storage and every lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
}
