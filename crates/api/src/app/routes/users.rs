use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};

use capita_auth::{
    AccountVerification, AuthError, AuthServices, AuthStore, LoginOutcome, Registration,
};

use crate::app::dto::{self, HttpResponse, UserDto};
use crate::app::errors;
use crate::context::CurrentPrincipal;
use crate::middleware::bearer_token;

pub fn router<S: AuthStore>() -> Router {
    Router::new()
        .route("/login", post(login::<S>))
        .route("/register", post(register::<S>))
        .route("/verify/code/:email/:code", get(verify_code::<S>))
        .route("/profile", get(profile::<S>))
        // GET takes an email, PUT the reset key
        .route(
            "/reset-password/:target",
            get(reset_password::<S>).put(set_new_password::<S>),
        )
        .route("/verify/password/:key", get(verify_password_key::<S>))
        .route("/verify/account/:key", get(verify_account::<S>))
        .route("/verify/resend/:email", get(resend_account_link::<S>))
        .route("/refresh/token", get(refresh_token::<S>))
}

pub async fn login<S: AuthStore>(
    Extension(services): Extension<Arc<AuthServices<S>>>,
    payload: Result<Json<dto::LoginRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(payload) {
        Ok(b) => b,
        Err(res) => return res,
    };

    match services.accounts.login(&body.email, &body.password).await {
        Ok(LoginOutcome::Authenticated(session)) => {
            HttpResponse::success(StatusCode::OK, "Login successful.")
                .with_data(dto::session_data(&session.principal, &session.tokens))
                .into_response()
        }
        Ok(LoginOutcome::CodeSent(identity)) => {
            HttpResponse::success(StatusCode::OK, "Verification code sent.")
                .with_data(dto::user_data(UserDto::from_identity(&identity, None)))
                .into_response()
        }
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn register<S: AuthStore>(
    Extension(services): Extension<Arc<AuthServices<S>>>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> axum::response::Response {
    let form = match errors::json_body(payload) {
        Ok(f) => f,
        Err(res) => return res,
    };

    match services.accounts.register(form).await {
        Ok(identity) => HttpResponse::success(StatusCode::CREATED, "User created")
            .with_data(dto::user_data(UserDto::from_identity(&identity, None)))
            .into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn verify_code<S: AuthStore>(
    Extension(services): Extension<Arc<AuthServices<S>>>,
    Path((email, code)): Path<(String, String)>,
) -> axum::response::Response {
    match services.accounts.verify_code(&email, &code).await {
        Ok(session) => HttpResponse::success(StatusCode::OK, "Login successful.")
            .with_data(dto::session_data(&session.principal, &session.tokens))
            .into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn profile<S: AuthStore>(
    Extension(services): Extension<Arc<AuthServices<S>>>,
    principal: CurrentPrincipal,
) -> axum::response::Response {
    match services.accounts.profile(principal.subject()).await {
        Ok(user) => HttpResponse::success(StatusCode::OK, "Profile retrieved")
            .with_data(dto::user_data(UserDto::from_principal(&user)))
            .into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn reset_password<S: AuthStore>(
    Extension(services): Extension<Arc<AuthServices<S>>>,
    Path(email): Path<String>,
) -> axum::response::Response {
    match services.verification.issue_password_reset_link(&email).await {
        Ok(_) => HttpResponse::success(
            StatusCode::OK,
            "Email sent. Please check your email to reset your password.",
        )
        .into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn verify_password_key<S: AuthStore>(
    Extension(services): Extension<Arc<AuthServices<S>>>,
    Path(key): Path<String>,
) -> axum::response::Response {
    match services.verification.verify_password_reset_key(&key).await {
        Ok(identity) => HttpResponse::success(StatusCode::OK, "Please enter a new password")
            .with_data(dto::user_data(UserDto::from_identity(&identity, None)))
            .into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn set_new_password<S: AuthStore>(
    Extension(services): Extension<Arc<AuthServices<S>>>,
    Path(key): Path<String>,
    payload: Result<Json<dto::ResetPasswordRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(payload) {
        Ok(b) => b,
        Err(res) => return res,
    };

    match services
        .verification
        .consume_password_reset(&key, &body.password, &body.confirm_password)
        .await
    {
        Ok(()) => HttpResponse::success(StatusCode::OK, "Password reset successfully").into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn verify_account<S: AuthStore>(
    Extension(services): Extension<Arc<AuthServices<S>>>,
    Path(key): Path<String>,
) -> axum::response::Response {
    match services.verification.consume_account_verification_link(&key).await {
        Ok(outcome) => HttpResponse::success(StatusCode::OK, outcome.message()).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn resend_account_link<S: AuthStore>(
    Extension(services): Extension<Arc<AuthServices<S>>>,
    Path(email): Path<String>,
) -> axum::response::Response {
    match services.accounts.resend_account_link(&email).await {
        Ok(Some(_)) => HttpResponse::success(
            StatusCode::OK,
            "Email sent. Please check your email to verify your account.",
        )
        .into_response(),
        Ok(None) => {
            HttpResponse::success(StatusCode::OK, AccountVerification::AlreadyVerified.message())
                .into_response()
        }
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// Expects the refresh token as the bearer credential.
pub async fn refresh_token<S: AuthStore>(
    Extension(services): Extension<Arc<AuthServices<S>>>,
    headers: HeaderMap,
) -> axum::response::Response {
    let Some(token) = bearer_token(&headers) else {
        return errors::auth_error_to_response(AuthError::TokenMissing);
    };

    match services.accounts.refresh(token).await {
        Ok(session) => HttpResponse::success(StatusCode::OK, "Token refreshed")
            .with_data(dto::session_data(&session.principal, &session.tokens))
            .into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}
