//! Signed token issuance and verification (HS512, stateless).
//!
//! There is no server-side token table: a token is valid iff its signature,
//! issuer, audience and time window check out at the moment of verification.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;

use capita_core::Clock;

use crate::claims::{AUDIENCE, ISSUER, TokenClaims, TokenKind, validate_claims};
use crate::error::{AuthError, AuthResult};
use crate::identity::normalize_email;
use crate::permissions::{Permission, to_claim_values};
use crate::principal::UserPrincipal;

const ALGORITHM: Algorithm = Algorithm::HS512;

/// Verification seam used by the authorization gate.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> AuthResult<VerifiedToken>;
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: String,
    pub claims: TokenClaims,
}

impl VerifiedToken {
    /// Authorities claim as capabilities; refresh tokens have none and fail.
    pub fn authorities(&self) -> AuthResult<Vec<Permission>> {
        let values = self
            .claims
            .authorities
            .as_ref()
            .ok_or_else(|| AuthError::invalid_token("authorities claim is missing"))?;
        Ok(values
            .iter()
            .map(|v| Permission::new(v.clone()))
            .collect())
    }
}

/// Access + refresh tokens minted from the same instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &ALGORITHM)
            .field("issuer", &ISSUER)
            .field("audience", &AUDIENCE)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &[u8], clock: Arc<dyn Clock>) -> AuthResult<Self> {
        if secret.is_empty() {
            return Err(AuthError::unexpected("token signing secret must not be empty"));
        }

        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        // Time window is checked against the injected clock in `verify`.
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            clock,
        })
    }

    pub fn create_access_token(&self, principal: &UserPrincipal) -> AuthResult<String> {
        self.mint(principal, TokenKind::Access, self.clock.now())
            .map(|(token, _)| token)
    }

    pub fn create_refresh_token(&self, principal: &UserPrincipal) -> AuthResult<String> {
        self.mint(principal, TokenKind::Refresh, self.clock.now())
            .map(|(token, _)| token)
    }

    pub fn issue_pair(&self, principal: &UserPrincipal) -> AuthResult<TokenPair> {
        let now = self.clock.now();
        let (access_token, _) = self.mint(principal, TokenKind::Access, now)?;
        let (refresh_token, _) = self.mint(principal, TokenKind::Refresh, now)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Decode and check signature, issuer, audience and time window.
    pub fn verify(&self, token: &str) -> AuthResult<VerifiedToken> {
        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map_err(map_jwt_error)?;
        let claims = data.claims;

        validate_claims(&claims, self.clock.now())?;
        if claims.sub.trim().is_empty() {
            return Err(AuthError::invalid_token("subject claim is empty"));
        }

        Ok(VerifiedToken {
            subject: claims.sub.clone(),
            claims,
        })
    }

    pub fn get_authorities(&self, token: &str) -> AuthResult<Vec<Permission>> {
        self.verify(token)?.authorities()
    }

    /// True iff `email` is non-empty, the token verifies, and its subject is
    /// that email.
    pub fn is_token_valid(&self, email: &str, token: &str) -> bool {
        let email = normalize_email(email);
        if email.is_empty() {
            return false;
        }
        match self.verify(token) {
            Ok(verified) => normalize_email(&verified.subject) == email,
            Err(e) => {
                tracing::debug!(error = %e, "token rejected");
                false
            }
        }
    }

    fn mint(
        &self,
        principal: &UserPrincipal,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> AuthResult<(String, TokenClaims)> {
        let iat = now.trunc_subsecs(0);
        let claims = TokenClaims {
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            sub: principal.email().to_string(),
            iat,
            exp: iat + kind.lifetime(),
            authorities: match kind {
                TokenKind::Access => Some(to_claim_values(&principal.authorities())),
                TokenKind::Refresh => None,
            },
        };

        let token = jsonwebtoken::encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|e| AuthError::unexpected(format!("token signing failed: {e}")))?;
        Ok((token, claims))
    }
}

impl TokenVerifier for TokenService {
    fn verify(&self, token: &str) -> AuthResult<VerifiedToken> {
        TokenService::verify(self, token)
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidSignature => AuthError::invalid_token("signature mismatch"),
        ErrorKind::InvalidIssuer => AuthError::invalid_token("unexpected issuer"),
        ErrorKind::InvalidAudience => AuthError::invalid_token("unexpected audience"),
        ErrorKind::InvalidAlgorithm => AuthError::invalid_token("unexpected algorithm"),
        ErrorKind::MissingRequiredClaim(claim) => {
            AuthError::invalid_token(format!("missing claim '{claim}'"))
        }
        _ => AuthError::invalid_token(err.to_string()),
    }
}
