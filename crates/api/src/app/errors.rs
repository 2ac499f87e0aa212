use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::error;

use capita_auth::AuthError;

use crate::app::dto::HttpResponse;

const GENERIC_REASON: &str = "An error occurred. Please try again.";

pub fn status_for(err: &AuthError) -> StatusCode {
    match err {
        err if err.is_token_failure() => StatusCode::UNAUTHORIZED,
        AuthError::AccessDenied(_) => StatusCode::FORBIDDEN,
        AuthError::AccountLocked => StatusCode::LOCKED,
        AuthError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Unexpected faults are logged and answered with a generic reason only.
pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    let status = status_for(&err);
    if let AuthError::Unexpected(detail) = &err {
        error!(error = %detail, "request failed unexpectedly");
        return HttpResponse::failure(status, GENERIC_REASON, None).into_response();
    }
    HttpResponse::failure(status, err.to_string(), Some(err.code().to_string())).into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    HttpResponse::failure(status, message, Some(code.to_string())).into_response()
}

/// Unwraps a JSON body or answers 400 in the common envelope.
pub fn json_body<T>(payload: Result<axum::Json<T>, JsonRejection>) -> Result<T, axum::response::Response> {
    payload
        .map(|axum::Json(body)| body)
        .map_err(|rejection| json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text()))
}

pub async fn not_found() -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "not_found", "There is no mapping for this URL on the server.")
}
