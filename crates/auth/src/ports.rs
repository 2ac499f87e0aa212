//! Capabilities the auth services need from the outside world.
//!
//! Store ports are bound statically (services are generic over `S`); the
//! small crypto/delivery capabilities are trait objects.

use async_trait::async_trait;

use capita_core::{RoleId, UserId};

use crate::error::{AuthResult, StoreError};
use crate::identity::{Identity, NewIdentity};
use crate::roles::Role;
use crate::verification::{VerificationCode, VerificationLink};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Inserts the identity, its role association and its account link as
    /// one write; either all three land or none do. A taken email is
    /// [`StoreError::Conflict`].
    async fn register_identity(
        &self,
        new: NewIdentity,
        role_id: RoleId,
        account_link: VerificationLink,
    ) -> StoreResult<Identity>;

    /// `email` must already be normalized.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>>;

    async fn find_by_id(&self, id: UserId) -> StoreResult<Option<Identity>>;

    async fn email_exists(&self, email: &str) -> StoreResult<bool>;

    /// Sets `enabled = true`. Returns `false` when it already was.
    async fn enable_identity(&self, id: UserId) -> StoreResult<bool>;

    async fn set_locked(&self, id: UserId, locked: bool) -> StoreResult<()>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;

    /// Associates the user with the role, replacing any previous association.
    async fn assign_role(&self, user_id: UserId, role_id: RoleId) -> StoreResult<()>;

    async fn role_for_user(&self, user_id: UserId) -> StoreResult<Option<Role>>;

    async fn role_for_email(&self, email: &str) -> StoreResult<Option<Role>>;
}

#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Atomically removes the user's existing code (if any) and stores `code`.
    async fn replace_mfa_code(&self, code: VerificationCode) -> StoreResult<()>;

    async fn find_mfa_code(&self, code: &str) -> StoreResult<Option<VerificationCode>>;

    async fn mfa_code_for_user(&self, user_id: UserId) -> StoreResult<Option<VerificationCode>>;

    /// Returns `false` when the code was already gone.
    async fn delete_mfa_code(&self, code: &str) -> StoreResult<bool>;

    async fn insert_account_link(&self, link: VerificationLink) -> StoreResult<()>;

    async fn find_account_link(&self, key: &str) -> StoreResult<Option<VerificationLink>>;

    /// Atomically removes the user's pending reset link (if any) and stores `link`.
    async fn replace_reset_link(&self, link: VerificationLink) -> StoreResult<()>;

    async fn find_reset_link(&self, key: &str) -> StoreResult<Option<VerificationLink>>;

    /// Writes the new hash for the link's owner and deletes the link as one
    /// operation. Returns `false` (and writes nothing) when the link is gone.
    async fn complete_password_reset(&self, key: &str, password_hash: &str) -> StoreResult<bool>;
}

/// Everything the account flows need from one backing store.
pub trait AuthStore: IdentityStore + RoleStore + VerificationStore + 'static {}

impl<T> AuthStore for T where T: IdentityStore + RoleStore + VerificationStore + 'static {}

/// Password hashing capability.
#[async_trait]
pub trait PasswordEncoder: Send + Sync {
    async fn encode(&self, raw: &str) -> AuthResult<String>;

    async fn matches(&self, raw: &str, hash: &str) -> AuthResult<bool>;

    /// Costs as much as [`PasswordEncoder::matches`] and never succeeds.
    /// Used when there is no stored hash to compare against.
    async fn decoy_match(&self, raw: &str) -> AuthResult<()>;
}

/// Out-of-band delivery of codes and links.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_mfa_code(&self, to: &Identity, code: &VerificationCode) -> AuthResult<()>;

    async fn send_verification_link(&self, to: &Identity, link: &VerificationLink) -> AuthResult<()>;
}
