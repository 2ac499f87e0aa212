use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

use capita_auth::{AuthorizationGate, RequestHead};

use crate::app::errors;

#[derive(Clone)]
pub struct AuthState {
    pub gate: Arc<AuthorizationGate>,
}

/// Runs the authorization gate and attaches the resulting `SecurityContext`
/// to the request; a rejection becomes the response.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let head = request_head(req.method().as_str(), req.uri().path(), req.headers());

    match state.gate.evaluate(&head) {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(err) => errors::auth_error_to_response(err),
    }
}

/// A header that is not valid visible ASCII is treated as absent.
fn request_head(method: &str, path: &str, headers: &HeaderMap) -> RequestHead {
    let head = RequestHead::new(method, path);
    match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(value) => head.with_authorization(value),
        None => head,
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(capita_auth::extract_bearer)
}
