use std::sync::Arc;

use tracing::{info, instrument, warn};

use capita_core::{Clock, UserId};

use crate::error::{AuthError, AuthResult, StoreError};
use crate::identity::{Identity, NewIdentity, Registration, normalize_email};
use crate::ports::{AuthStore, PasswordEncoder};
use crate::principal::UserPrincipal;
use crate::roles::ROLE_USER;
use crate::services::{AuthDependencies, RoleAuthority, VerificationCodeManager};
use crate::token::{TokenPair, TokenService};
use crate::verification::VerificationLink;

/// Tokens plus who they were minted for.
#[derive(Debug, Clone)]
pub struct Session {
    pub principal: UserPrincipal,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(Session),
    /// MFA identity: a code went out, no tokens yet.
    CodeSent(Identity),
}

/// Registration, login and token lifecycle flows.
pub struct AccountService<S> {
    store: Arc<S>,
    roles: RoleAuthority<S>,
    verification: VerificationCodeManager<S>,
    tokens: Arc<TokenService>,
    passwords: Arc<dyn PasswordEncoder>,
    clock: Arc<dyn Clock>,
}

impl<S: AuthStore> AccountService<S> {
    pub fn new(
        store: Arc<S>,
        roles: RoleAuthority<S>,
        verification: VerificationCodeManager<S>,
        deps: &AuthDependencies,
    ) -> Self {
        Self {
            store,
            roles,
            verification,
            tokens: deps.tokens.clone(),
            passwords: deps.passwords.clone(),
            clock: deps.clock.clone(),
        }
    }

    /// Persists a disabled `ROLE_USER` identity together with its account
    /// link, then delivers the link. A failed delivery is only logged; the
    /// identity can ask for another link with [`AccountService::resend_account_link`].
    #[instrument(skip(self, form), fields(email = %form.email), err)]
    pub async fn register(&self, form: Registration) -> AuthResult<Identity> {
        form.validate()?;
        let email = normalize_email(&form.email);
        if self.store.email_exists(&email).await? {
            return Err(AuthError::EmailAlreadyInUse);
        }
        let role = self.roles.role_by_name(ROLE_USER).await?;

        let new = NewIdentity {
            id: UserId::new(),
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
            email: email.clone(),
            password_hash: self.passwords.encode(&form.password).await?,
            phone: form.phone.filter(|p| !p.trim().is_empty()),
            mfa_enabled: form.mfa_enabled,
            created_at: self.clock.now(),
        };
        let link = self.verification.account_link(new.id);
        let identity = match self.store.register_identity(new, role.id, link.clone()).await {
            Ok(identity) => identity,
            Err(StoreError::Conflict(detail)) => {
                // only a taken email is the caller's problem
                return Err(if self.store.email_exists(&email).await? {
                    AuthError::EmailAlreadyInUse
                } else {
                    AuthError::unexpected(detail)
                });
            }
            Err(err) => return Err(err.into()),
        };
        info!(user_id = %identity.id, "identity registered");

        if let Err(err) = self.verification.deliver_link(&identity, &link).await {
            warn!(user_id = %identity.id, error = %err, "account link delivery failed");
        }
        Ok(identity)
    }

    /// Sends a fresh account link to an identity that is not verified yet.
    /// `None` means the account is already verified and nothing was sent.
    #[instrument(skip(self), err)]
    pub async fn resend_account_link(&self, email: &str) -> AuthResult<Option<VerificationLink>> {
        let email = normalize_email(email);
        let identity = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::IdentityNotFound(email))?;
        if identity.enabled {
            return Ok(None);
        }
        self.verification
            .issue_account_verification_link(identity.id)
            .await
            .map(Some)
    }

    /// Credentials first, then locked, then disabled; only then a code or tokens.
    #[instrument(skip(self, password), err)]
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<LoginOutcome> {
        let email = normalize_email(email);
        let Some(identity) = self.store.find_by_email(&email).await? else {
            self.passwords.decoy_match(password).await?;
            return Err(AuthError::CredentialsInvalid);
        };

        if !self.passwords.matches(password, &identity.password_hash).await? {
            warn!(user_id = %identity.id, "bad password");
            return Err(AuthError::CredentialsInvalid);
        }
        if identity.locked {
            return Err(AuthError::AccountLocked);
        }
        if !identity.enabled {
            return Err(AuthError::AccountDisabled);
        }

        if identity.mfa_enabled {
            self.verification.issue_mfa_code(identity.id).await?;
            return Ok(LoginOutcome::CodeSent(identity));
        }

        let session = self.open_session(identity).await?;
        info!(user_id = %session.principal.identity.id, "login successful");
        Ok(LoginOutcome::Authenticated(session))
    }

    /// Second MFA step.
    #[instrument(skip(self, code), err)]
    pub async fn verify_code(&self, email: &str, code: &str) -> AuthResult<Session> {
        let identity = self.verification.verify_mfa_code(email, code).await?;
        self.open_session(identity).await
    }

    /// New access token for a valid refresh token; the refresh token is
    /// handed back unchanged. Access tokens are not accepted here.
    #[instrument(skip_all, err)]
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<Session> {
        let verified = self.tokens.verify(refresh_token)?;
        if verified.claims.authorities.is_some() {
            return Err(AuthError::invalid_token("not a refresh token"));
        }
        if !self.tokens.is_token_valid(&verified.subject, refresh_token) {
            return Err(AuthError::invalid_token("token subject mismatch"));
        }

        let principal = self.profile(&verified.subject).await?;
        let access_token = self.tokens.create_access_token(&principal)?;
        Ok(Session {
            principal,
            tokens: TokenPair {
                access_token,
                refresh_token: refresh_token.to_string(),
            },
        })
    }

    /// Identity and role of an authenticated subject.
    pub async fn profile(&self, email: &str) -> AuthResult<UserPrincipal> {
        let email = normalize_email(email);
        let identity = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::IdentityNotFound(email))?;
        self.roles.principal_for(identity).await
    }

    async fn open_session(&self, identity: Identity) -> AuthResult<Session> {
        let principal = self.roles.principal_for(identity).await?;
        let tokens = self.tokens.issue_pair(&principal)?;
        Ok(Session { principal, tokens })
    }
}
