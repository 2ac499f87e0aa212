use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use capita_core::{Clock, UserId};

use crate::error::{AuthError, AuthResult};
use crate::identity::{Identity, normalize_email};
use crate::ports::{AuthStore, Notifier, PasswordEncoder};
use crate::services::{AuthDependencies, VerificationSettings};
use crate::verification::{
    SecretGenerator, VerificationCode, VerificationLink, VerificationType, normalize_code,
    verification_url,
};

/// Result of visiting an account-verification link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccountVerification {
    Verified,
    AlreadyVerified,
}

impl AccountVerification {
    pub fn message(self) -> &'static str {
        match self {
            AccountVerification::Verified => "Account verified",
            AccountVerification::AlreadyVerified => "Account already verified",
        }
    }
}

/// Issues and consumes MFA codes, account links and password-reset links.
///
/// # Invariants
/// - At most one live MFA code and one pending reset link per user; issuing
///   replaces the previous one atomically in the store.
/// - A rejected attempt never mutates the artifact.
/// - Consuming deletes the artifact as part of the same store operation
///   (account links are kept so repeat visits are idempotent).
pub struct VerificationCodeManager<S> {
    store: Arc<S>,
    secrets: Arc<dyn SecretGenerator>,
    passwords: Arc<dyn PasswordEncoder>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: VerificationSettings,
}

impl<S> Clone for VerificationCodeManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            secrets: self.secrets.clone(),
            passwords: self.passwords.clone(),
            notifier: self.notifier.clone(),
            clock: self.clock.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: AuthStore> VerificationCodeManager<S> {
    pub fn new(store: Arc<S>, deps: &AuthDependencies) -> Self {
        Self {
            store,
            secrets: deps.secrets.clone(),
            passwords: deps.passwords.clone(),
            notifier: deps.notifier.clone(),
            clock: deps.clock.clone(),
            settings: deps.settings.clone(),
        }
    }

    async fn identity_by_id(&self, user_id: UserId) -> AuthResult<Identity> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::IdentityNotFound(user_id.to_string()))
    }

    async fn identity_by_email(&self, email: &str) -> AuthResult<Identity> {
        self.store
            .find_by_email(email)
            .await?
            .ok_or_else(|| AuthError::IdentityNotFound(email.to_string()))
    }

    /// Replaces any outstanding code for the user and delivers the new one.
    #[instrument(skip(self), err)]
    pub async fn issue_mfa_code(&self, user_id: UserId) -> AuthResult<VerificationCode> {
        let identity = self.identity_by_id(user_id).await?;
        let code = VerificationCode {
            user_id,
            code: self.secrets.mfa_code(),
            expires_at: self.clock.now() + self.settings.mfa_code_ttl,
        };
        self.store.replace_mfa_code(code.clone()).await?;
        self.notifier.send_mfa_code(&identity, &code).await?;
        debug!(expires_at = %code.expires_at, "mfa code issued");
        Ok(code)
    }

    /// Checks `code` belongs to `email` and consumes it.
    ///
    /// Order: unknown code, expired code, owner mismatch. Only a successful
    /// check deletes the code; losing a concurrent race reports `CodeNotFound`.
    #[instrument(skip(self, code), err)]
    pub async fn verify_mfa_code(&self, email: &str, code: &str) -> AuthResult<Identity> {
        let code = normalize_code(code);
        let stored = self
            .store
            .find_mfa_code(&code)
            .await?
            .ok_or(AuthError::CodeNotFound)?;

        if stored.is_expired(self.clock.now()) {
            return Err(AuthError::CodeExpired);
        }

        let owner = self.store.find_by_id(stored.user_id).await?;
        let claimed = self.store.find_by_email(&normalize_email(email)).await?;
        let identity = match (owner, claimed) {
            (Some(owner), Some(claimed)) if owner.id == claimed.id => owner,
            _ => {
                warn!("mfa code presented for a different identity");
                return Err(AuthError::CodeMismatch);
            }
        };

        if !self.store.delete_mfa_code(&code).await? {
            return Err(AuthError::CodeNotFound);
        }
        info!(user_id = %identity.id, "mfa code verified");
        Ok(identity)
    }

    /// Starts a password reset. Any previous pending reset for the user dies.
    #[instrument(skip(self), err)]
    pub async fn issue_password_reset_link(&self, email: &str) -> AuthResult<VerificationLink> {
        let identity = self.identity_by_email(&normalize_email(email)).await?;
        let key = self.secrets.link_key();
        let link = VerificationLink {
            user_id: identity.id,
            url: verification_url(&self.settings.public_base_url, VerificationType::Password, &key),
            key,
            kind: VerificationType::Password,
            expires_at: Some(self.clock.now() + self.settings.reset_link_ttl),
        };
        self.store.replace_reset_link(link.clone()).await?;
        self.deliver_link(&identity, &link).await?;
        Ok(link)
    }

    async fn live_reset_link(&self, key: &str) -> AuthResult<VerificationLink> {
        match self.store.find_reset_link(key).await? {
            Some(link) if !link.is_expired(self.clock.now()) => Ok(link),
            _ => Err(AuthError::ResetKeyNotFound),
        }
    }

    /// The identity a pending reset key belongs to.
    pub async fn verify_password_reset_key(&self, key: &str) -> AuthResult<Identity> {
        let link = self.live_reset_link(key).await?;
        self.identity_by_id(link.user_id).await
    }

    /// Sets the new password and deletes the reset link in one store call.
    #[instrument(skip(self, password, confirm_password), err)]
    pub async fn consume_password_reset(
        &self,
        key: &str,
        password: &str,
        confirm_password: &str,
    ) -> AuthResult<()> {
        if password != confirm_password {
            return Err(AuthError::PasswordMismatch);
        }
        if password.is_empty() {
            return Err(AuthError::Validation("Password cannot be empty.".to_string()));
        }

        let link = self.live_reset_link(key).await?;
        let hash = self.passwords.encode(password).await?;
        if !self.store.complete_password_reset(key, &hash).await? {
            return Err(AuthError::ResetKeyNotFound);
        }
        info!(user_id = %link.user_id, "password reset completed");
        Ok(())
    }

    /// A fresh account link for `user_id`. Account links do not expire.
    pub fn account_link(&self, user_id: UserId) -> VerificationLink {
        let key = self.secrets.link_key();
        VerificationLink {
            user_id,
            url: verification_url(&self.settings.public_base_url, VerificationType::Account, &key),
            key,
            kind: VerificationType::Account,
            expires_at: None,
        }
    }

    pub async fn deliver_link(&self, to: &Identity, link: &VerificationLink) -> AuthResult<()> {
        self.notifier.send_verification_link(to, link).await
    }

    /// Adds another account link for an existing identity and delivers it.
    /// Earlier links stay valid.
    #[instrument(skip(self), err)]
    pub async fn issue_account_verification_link(
        &self,
        user_id: UserId,
    ) -> AuthResult<VerificationLink> {
        let identity = self.identity_by_id(user_id).await?;
        let link = self.account_link(user_id);
        self.store.insert_account_link(link.clone()).await?;
        self.deliver_link(&identity, &link).await?;
        Ok(link)
    }

    #[instrument(skip(self), err)]
    pub async fn consume_account_verification_link(
        &self,
        key: &str,
    ) -> AuthResult<AccountVerification> {
        let link = self
            .store
            .find_account_link(key)
            .await?
            .ok_or(AuthError::LinkNotFound)?;

        if self.store.enable_identity(link.user_id).await? {
            info!(user_id = %link.user_id, "account verified");
            Ok(AccountVerification::Verified)
        } else {
            Ok(AccountVerification::AlreadyVerified)
        }
    }
}
