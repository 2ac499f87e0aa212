//! Authentication error taxonomy.
//!
//! Every failure a caller can act on has its own variant. Anything else
//! (store outages, hashing backend failures) is `Unexpected` and must not be
//! shown to clients verbatim.

use thiserror::Error;

use capita_core::DomainError;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("token has expired")]
    TokenExpired,

    #[error("token is invalid: {0}")]
    TokenInvalid(String),

    #[error("no bearer token supplied")]
    TokenMissing,

    #[error("This code has expired. Please login again.")]
    CodeExpired,

    #[error("Code is invalid. Can you check please?")]
    CodeMismatch,

    #[error("This code is not valid. Please try logging in again.")]
    CodeNotFound,

    #[error("This link is not valid. Please reset your password again.")]
    ResetKeyNotFound,

    #[error("This link is not valid.")]
    LinkNotFound,

    #[error("Passwords don't match. Please try again.")]
    PasswordMismatch,

    #[error("No role found by name: {0}")]
    RoleNotFound(String),

    #[error("Incorrect email or password.")]
    CredentialsInvalid,

    #[error("User account is currently disabled.")]
    AccountDisabled,

    #[error("User account is locked.")]
    AccountLocked,

    #[error("Email already in use. Please use a different email and try again.")]
    EmailAlreadyInUse,

    #[error("No User found by email: {0}")]
    IdentityNotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Access denied: missing authority '{0}'")]
    AccessDenied(String),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl AuthError {
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::TokenInvalid(reason.into())
    }

    pub fn unexpected(reason: impl Into<String>) -> Self {
        Self::Unexpected(reason.into())
    }

    /// Stable machine-readable code for responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenInvalid(_) => "token_invalid",
            AuthError::TokenMissing => "token_missing",
            AuthError::CodeExpired => "code_expired",
            AuthError::CodeMismatch => "code_mismatch",
            AuthError::CodeNotFound => "code_not_found",
            AuthError::ResetKeyNotFound => "reset_key_not_found",
            AuthError::LinkNotFound => "link_not_found",
            AuthError::PasswordMismatch => "password_mismatch",
            AuthError::RoleNotFound(_) => "role_not_found",
            AuthError::CredentialsInvalid => "credentials_invalid",
            AuthError::AccountDisabled => "account_disabled",
            AuthError::AccountLocked => "account_locked",
            AuthError::EmailAlreadyInUse => "email_in_use",
            AuthError::IdentityNotFound(_) => "identity_not_found",
            AuthError::Validation(_) => "validation_error",
            AuthError::AccessDenied(_) => "access_denied",
            AuthError::Unexpected(_) => "unexpected",
        }
    }

    /// Failures of the presented bearer credential; answered with 401.
    pub fn is_token_failure(&self) -> bool {
        matches!(
            self,
            AuthError::TokenExpired | AuthError::TokenInvalid(_) | AuthError::TokenMissing
        )
    }
}

impl From<DomainError> for AuthError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => AuthError::Validation(msg),
            DomainError::InvalidId(msg) => AuthError::Validation(msg),
        }
    }
}

/// Failure reported by a storage adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend itself failed (connection, lock poisoning, bad row).
    #[error("storage error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

impl From<StoreError> for AuthError {
    fn from(value: StoreError) -> Self {
        AuthError::Unexpected(value.to_string())
    }
}
