//! `capita-auth` — stateless authentication and verification.
//!
//! Token issuance/verification, the per-request authorization gate, and the
//! single-use verification artifacts. Decoupled from HTTP and storage; both
//! plug in through [`ports`].

pub mod authorize;
pub mod claims;
pub mod error;
pub mod gate;
pub mod identity;
pub mod permissions;
pub mod ports;
pub mod principal;
pub mod roles;
pub mod services;
pub mod token;
pub mod verification;

pub use authorize::{AuthzError, authorize};
pub use claims::{TokenClaims, TokenKind, TokenValidationError, validate_claims};
pub use error::{AuthError, AuthResult, StoreError};
pub use gate::{
    AccessPolicy, AuthorityRule, AuthorizationGate, BearerAuthenticator, RequestHead,
    RequestInterceptor, SecurityContext, extract_bearer,
};
pub use identity::{Identity, NewIdentity, Registration, normalize_email};
pub use permissions::Permission;
pub use ports::{
    AuthStore, IdentityStore, Notifier, PasswordEncoder, RoleStore, StoreResult,
    VerificationStore,
};
pub use principal::{Principal, UserPrincipal};
pub use roles::{Role, default_roles};
pub use services::{
    AccountService, AccountVerification, AuthDependencies, AuthServices, LoginOutcome,
    RoleAuthority, Session, VerificationCodeManager, VerificationSettings,
};
pub use token::{TokenPair, TokenService, TokenVerifier, VerifiedToken};
pub use verification::{
    RandomSecretGenerator, SecretGenerator, VerificationCode, VerificationLink, VerificationType,
};
