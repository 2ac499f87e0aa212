//! Orchestration over the store ports.

mod accounts;
mod roles;
mod verification;

use std::sync::Arc;

use chrono::Duration;

use capita_core::Clock;

use crate::ports::{AuthStore, Notifier, PasswordEncoder};
use crate::token::TokenService;
use crate::verification::{MFA_CODE_TTL_HOURS, RESET_LINK_TTL_HOURS, SecretGenerator};

pub use accounts::{AccountService, LoginOutcome, Session};
pub use roles::RoleAuthority;
pub use verification::{AccountVerification, VerificationCodeManager};

/// Knobs for issued verification artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationSettings {
    /// Prefix for verification link URLs, e.g. `https://app.example.com`.
    pub public_base_url: String,
    pub mfa_code_ttl: Duration,
    pub reset_link_ttl: Duration,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8080".to_string(),
            mfa_code_ttl: Duration::hours(MFA_CODE_TTL_HOURS),
            reset_link_ttl: Duration::hours(RESET_LINK_TTL_HOURS),
        }
    }
}

/// Capabilities shared by every service.
#[derive(Clone)]
pub struct AuthDependencies {
    pub tokens: Arc<TokenService>,
    pub passwords: Arc<dyn PasswordEncoder>,
    pub secrets: Arc<dyn SecretGenerator>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub settings: VerificationSettings,
}

/// The wired service graph for one store.
pub struct AuthServices<S> {
    pub store: Arc<S>,
    pub tokens: Arc<TokenService>,
    pub roles: RoleAuthority<S>,
    pub verification: VerificationCodeManager<S>,
    pub accounts: AccountService<S>,
}

impl<S: AuthStore> AuthServices<S> {
    pub fn new(store: Arc<S>, deps: AuthDependencies) -> Self {
        let roles = RoleAuthority::new(store.clone());
        let verification = VerificationCodeManager::new(store.clone(), &deps);
        let accounts = AccountService::new(store.clone(), roles.clone(), verification.clone(), &deps);
        Self {
            store,
            tokens: deps.tokens,
            roles,
            verification,
            accounts,
        }
    }
}
