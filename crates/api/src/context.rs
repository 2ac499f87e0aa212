use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use capita_auth::{AuthError, Principal, SecurityContext};

use crate::app::errors;

/// The authenticated caller of a request.
///
/// Extracted from the [`SecurityContext`] the auth middleware attached; a
/// handler asking for it on an unauthenticated request answers with the
/// recorded reason (expired vs invalid vs missing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentPrincipal(pub Principal);

impl CurrentPrincipal {
    pub fn subject(&self) -> &str {
        &self.0.subject
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentPrincipal {
    type Rejection = axum::response::Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts.extensions.get::<SecurityContext>();
        match ctx.and_then(|c| c.principal.clone()) {
            Some(principal) => Ok(Self(principal)),
            None => Err(errors::auth_error_to_response(
                ctx.map(SecurityContext::unauthenticated_reason)
                    .unwrap_or(AuthError::TokenMissing),
            )),
        }
    }
}
