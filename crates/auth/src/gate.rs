//! Per-request authorization gate.
//!
//! A request is run through an ordered list of [`RequestInterceptor`]s. Each
//! one sees the request head and the [`SecurityContext`] built so far; the
//! first error short-circuits the pipeline. The context is an owned value:
//! the caller attaches it to the request and it is dropped with it.

use std::sync::Arc;

use tracing::debug;

use crate::authorize::authorize;
use crate::error::{AuthError, AuthResult};
use crate::permissions::Permission;
use crate::principal::Principal;
use crate::token::TokenVerifier;

const BEARER_PREFIX: &str = "Bearer ";

/// Routes that never need a bearer token.
pub const PUBLIC_ROUTES: &[&str] = &["/users/login", "/users/register", "/users/verify/code"];

/// Routes any caller may reach once past authentication.
pub const PERMIT_ALL_ROUTES: &[&str] = &[
    "/health",
    "/users/login",
    "/users/register",
    "/users/verify",
    "/users/reset-password",
    "/users/refresh",
];

/// Transport-neutral view of an incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
}

impl RequestHead {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            authorization: None,
        }
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    pub fn is_preflight(&self) -> bool {
        self.method.eq_ignore_ascii_case("OPTIONS")
    }

    /// The token after `"Bearer "`, if the header has that shape.
    pub fn bearer_token(&self) -> Option<&str> {
        extract_bearer(self.authorization.as_deref()?)
    }
}

/// Parses an `Authorization` header value. Anything other than a non-empty
/// `Bearer` credential counts as no credential at all.
pub fn extract_bearer(header: &str) -> Option<&str> {
    let token = header.strip_prefix(BEARER_PREFIX)?.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Request-scoped security state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityContext {
    pub principal: Option<Principal>,
    /// Why authentication failed, when a token was presented and rejected.
    pub rejection: Option<AuthError>,
}

impl SecurityContext {
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    fn authenticate(&mut self, principal: Principal) {
        self.principal = Some(principal);
        self.rejection = None;
    }

    fn clear(&mut self, reason: AuthError) {
        self.principal = None;
        self.rejection = Some(reason);
    }

    /// The error to report when a route needs a principal and there is none.
    pub fn unauthenticated_reason(&self) -> AuthError {
        self.rejection.clone().unwrap_or(AuthError::TokenMissing)
    }
}

/// Segment-wise path prefix. `/users/delete/**` and `/users/delete` are the
/// same pattern; both match `/users/delete` and anything beneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<String>,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Self {
        let trimmed = pattern.trim_end_matches("/**");
        Self {
            segments: segments(trimmed).map(str::to_string).collect(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        let mut actual = segments(path);
        self.segments
            .iter()
            .all(|expected| actual.next() == Some(expected.as_str()))
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('?')
        .next()
        .unwrap_or_default()
        .split('/')
        .filter(|s| !s.is_empty())
}

fn any_match(patterns: &[PathPattern], path: &str) -> bool {
    patterns.iter().any(|p| p.matches(path))
}

fn patterns(raw: &[&str]) -> Vec<PathPattern> {
    raw.iter().map(|p| PathPattern::new(p)).collect()
}

/// One step of the gate.
pub trait RequestInterceptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn intercept(&self, head: &RequestHead, ctx: &mut SecurityContext) -> AuthResult<()>;
}

/// Turns a bearer token into a [`Principal`].
///
/// Never rejects on its own: a bad token leaves the context unauthenticated
/// with the reason recorded, and later steps decide.
pub struct BearerAuthenticator {
    verifier: Arc<dyn TokenVerifier>,
    public: Vec<PathPattern>,
}

impl BearerAuthenticator {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self::with_public_routes(verifier, PUBLIC_ROUTES)
    }

    pub fn with_public_routes(verifier: Arc<dyn TokenVerifier>, public: &[&str]) -> Self {
        Self {
            verifier,
            public: patterns(public),
        }
    }

    fn resolve(&self, token: &str) -> AuthResult<Principal> {
        let verified = self.verifier.verify(token)?;
        let authorities = verified.authorities()?;
        Ok(Principal::new(verified.subject, authorities))
    }
}

impl RequestInterceptor for BearerAuthenticator {
    fn name(&self) -> &'static str {
        "bearer_authenticator"
    }

    fn intercept(&self, head: &RequestHead, ctx: &mut SecurityContext) -> AuthResult<()> {
        if head.is_preflight() || any_match(&self.public, &head.path) {
            return Ok(());
        }

        let Some(token) = head.bearer_token() else {
            return Ok(());
        };

        match self.resolve(token) {
            Ok(principal) => ctx.authenticate(principal),
            Err(err) => {
                debug!(path = %head.path, reason = err.code(), "bearer token rejected");
                ctx.clear(err);
            }
        }
        Ok(())
    }
}

/// `method path/**` requires `authority`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityRule {
    pub method: String,
    pub path: PathPattern,
    pub authority: Permission,
}

impl AuthorityRule {
    pub fn new(method: &str, path: &str, authority: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: PathPattern::new(path),
            authority: Permission::from(authority),
        }
    }

    fn applies_to(&self, head: &RequestHead) -> bool {
        self.method.eq_ignore_ascii_case(&head.method) && self.path.matches(&head.path)
    }
}

pub fn default_authority_rules() -> Vec<AuthorityRule> {
    vec![
        AuthorityRule::new("DELETE", "/users/delete/**", "DELETE:USER"),
        AuthorityRule::new("DELETE", "/customers/delete/**", "DELETE:CUSTOMER"),
    ]
}

/// Route-level authorization.
pub struct AccessPolicy {
    permit_all: Vec<PathPattern>,
    rules: Vec<AuthorityRule>,
}

impl AccessPolicy {
    pub fn new(permit_all: &[&str], rules: Vec<AuthorityRule>) -> Self {
        Self {
            permit_all: patterns(permit_all),
            rules,
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(PERMIT_ALL_ROUTES, default_authority_rules())
    }
}

impl RequestInterceptor for AccessPolicy {
    fn name(&self) -> &'static str {
        "access_policy"
    }

    fn intercept(&self, head: &RequestHead, ctx: &mut SecurityContext) -> AuthResult<()> {
        if head.is_preflight() || any_match(&self.permit_all, &head.path) {
            return Ok(());
        }

        let principal = ctx
            .principal
            .as_ref()
            .ok_or_else(|| ctx.unauthenticated_reason())?;

        for rule in self.rules.iter().filter(|r| r.applies_to(head)) {
            authorize(principal, &rule.authority)?;
        }
        Ok(())
    }
}

/// Ordered interceptor pipeline.
pub struct AuthorizationGate {
    interceptors: Vec<Box<dyn RequestInterceptor>>,
}

impl AuthorizationGate {
    /// Bearer authentication followed by the default access policy.
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self::with_interceptors(vec![
            Box::new(BearerAuthenticator::new(verifier)),
            Box::new(AccessPolicy::default()),
        ])
    }

    pub fn with_interceptors(interceptors: Vec<Box<dyn RequestInterceptor>>) -> Self {
        Self { interceptors }
    }

    pub fn interceptor_names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Runs every interceptor in order and returns the resulting context, or
    /// the first rejection.
    pub fn evaluate(&self, head: &RequestHead) -> AuthResult<SecurityContext> {
        let mut ctx = SecurityContext::default();
        for interceptor in &self.interceptors {
            if let Err(err) = interceptor.intercept(head, &mut ctx) {
                debug!(
                    interceptor = interceptor.name(),
                    method = %head.method,
                    path = %head.path,
                    reason = err.code(),
                    "request rejected"
                );
                return Err(err);
            }
        }
        Ok(ctx)
    }
}

impl core::fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("interceptors", &self.interceptor_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::claims::{AUDIENCE, ISSUER, TokenClaims};
    use crate::token::VerifiedToken;

    /// Accepts `good-<subject>-<perm,perm>`, `refresh-<subject>`, and
    /// reports `expired` as expired. Everything else is invalid.
    #[derive(Default)]
    struct StubVerifier {
        calls: AtomicUsize,
    }

    impl TokenVerifier for StubVerifier {
        fn verify(&self, token: &str) -> AuthResult<VerifiedToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
            let claims = |sub: &str, authorities: Option<Vec<String>>| TokenClaims {
                iss: ISSUER.into(),
                aud: AUDIENCE.into(),
                sub: sub.into(),
                iat: at,
                exp: at,
                authorities,
            };
            if token == "expired" {
                return Err(AuthError::TokenExpired);
            }
            if let Some(sub) = token.strip_prefix("refresh-") {
                return Ok(VerifiedToken {
                    subject: sub.into(),
                    claims: claims(sub, None),
                });
            }
            let rest = token
                .strip_prefix("good-")
                .ok_or_else(|| AuthError::invalid_token("bad signature"))?;
            let (sub, perms) = rest.split_once('-').unwrap_or((rest, ""));
            let authorities = perms
                .split(',')
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
            Ok(VerifiedToken {
                subject: sub.into(),
                claims: claims(sub, Some(authorities)),
            })
        }
    }

    fn gate() -> (AuthorizationGate, Arc<StubVerifier>) {
        let verifier = Arc::new(StubVerifier::default());
        (AuthorizationGate::new(verifier.clone()), verifier)
    }

    #[test]
    fn valid_token_populates_the_context() {
        let (gate, _) = gate();
        let head = RequestHead::new("GET", "/users/profile")
            .with_authorization("Bearer good-a@x.com-READ:USER,READ:CUSTOMER");
        let ctx = gate.evaluate(&head).unwrap();
        let principal = ctx.principal.unwrap();
        assert_eq!(principal.subject, "a@x.com");
        assert!(principal.has_authority("READ:CUSTOMER"));
    }

    #[test]
    fn missing_header_on_protected_route_is_token_missing() {
        let (gate, _) = gate();
        let err = gate.evaluate(&RequestHead::new("GET", "/users/profile")).unwrap_err();
        assert_eq!(err, AuthError::TokenMissing);
    }

    #[test]
    fn non_bearer_header_counts_as_no_credentials() {
        let (gate, verifier) = gate();
        let head = RequestHead::new("GET", "/users/profile").with_authorization("Basic Zm9vOmJhcg==");
        assert_eq!(gate.evaluate(&head).unwrap_err(), AuthError::TokenMissing);
        let head = RequestHead::new("GET", "/users/profile").with_authorization("Bearer   ");
        assert_eq!(gate.evaluate(&head).unwrap_err(), AuthError::TokenMissing);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rejection_reason_survives_to_the_denial() {
        let (gate, _) = gate();
        let expired = RequestHead::new("GET", "/users/profile").with_authorization("Bearer expired");
        assert_eq!(gate.evaluate(&expired).unwrap_err(), AuthError::TokenExpired);

        let forged = RequestHead::new("GET", "/users/profile").with_authorization("Bearer forged");
        assert!(matches!(gate.evaluate(&forged), Err(AuthError::TokenInvalid(_))));
    }

    #[test]
    fn token_without_authorities_fails_closed() {
        let (gate, _) = gate();
        let head =
            RequestHead::new("GET", "/users/profile").with_authorization("Bearer refresh-a@x.com");
        assert!(matches!(gate.evaluate(&head), Err(AuthError::TokenInvalid(_))));
    }

    #[test]
    fn public_routes_and_preflight_skip_verification() {
        let (gate, verifier) = gate();
        for head in [
            RequestHead::new("POST", "/users/login").with_authorization("Bearer forged"),
            RequestHead::new("POST", "/users/register"),
            RequestHead::new("GET", "/users/verify/code/a@x.com/ABCD1234"),
            RequestHead::new("OPTIONS", "/users/profile").with_authorization("Bearer forged"),
        ] {
            let ctx = gate.evaluate(&head).unwrap();
            assert!(!ctx.is_authenticated());
        }
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn permit_all_routes_tolerate_a_bad_token() {
        let (gate, verifier) = gate();
        let head = RequestHead::new("GET", "/users/reset-password/a@x.com")
            .with_authorization("Bearer forged");
        let ctx = gate.evaluate(&head).unwrap();
        assert!(ctx.rejection.is_some());
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delete_rule_requires_the_authority() {
        let (gate, _) = gate();
        let reader = RequestHead::new("DELETE", "/users/delete/42")
            .with_authorization("Bearer good-a@x.com-READ:USER");
        assert_eq!(
            gate.evaluate(&reader).unwrap_err(),
            AuthError::AccessDenied("DELETE:USER".into())
        );

        let admin = RequestHead::new("DELETE", "/users/delete/42")
            .with_authorization("Bearer good-root@x.com-READ:USER,DELETE:USER");
        assert!(gate.evaluate(&admin).is_ok());

        // rules are method-scoped
        let get = RequestHead::new("GET", "/users/delete/42")
            .with_authorization("Bearer good-a@x.com-READ:USER");
        assert!(gate.evaluate(&get).is_ok());
    }

    #[test]
    fn path_patterns_match_on_segments() {
        let p = PathPattern::new("/users/verify/code");
        assert!(p.matches("/users/verify/code"));
        assert!(p.matches("/users/verify/code/a@x.com/X"));
        assert!(p.matches("/users/verify/code?x=1"));
        assert!(!p.matches("/users/verify/codes"));
        assert!(!p.matches("/users/verify"));
        assert!(PathPattern::new("/customers/delete/**").matches("/customers/delete/7"));
    }

    #[test]
    fn first_rejection_short_circuits() {
        struct Deny;
        impl RequestInterceptor for Deny {
            fn name(&self) -> &'static str {
                "deny"
            }
            fn intercept(&self, _: &RequestHead, _: &mut SecurityContext) -> AuthResult<()> {
                Err(AuthError::AccessDenied("nothing".into()))
            }
        }
        struct Panic;
        impl RequestInterceptor for Panic {
            fn name(&self) -> &'static str {
                "panic"
            }
            fn intercept(&self, _: &RequestHead, _: &mut SecurityContext) -> AuthResult<()> {
                panic!("must not run");
            }
        }

        let gate = AuthorizationGate::with_interceptors(vec![Box::new(Deny), Box::new(Panic)]);
        assert_eq!(gate.interceptor_names(), vec!["deny", "panic"]);
        assert!(gate.evaluate(&RequestHead::new("GET", "/")).is_err());
    }
}
