use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use capita_auth::{Identity, Role, TokenPair, UserPrincipal};
use capita_core::UserId;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub confirm_password: String,
}

// -------------------------
// Response DTOs
// -------------------------

/// Every response body, success or failure, has this shape.
#[derive(Debug, Serialize)]
pub struct HttpResponse {
    pub time_stamp: String,
    pub status_code: u16,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub developer_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl HttpResponse {
    fn new(status: StatusCode) -> Self {
        Self {
            time_stamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            status_code: status.as_u16(),
            status: status_name(status),
            message: None,
            reason: None,
            developer_message: None,
            data: None,
        }
    }

    pub fn success(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(status)
        }
    }

    pub fn failure(status: StatusCode, reason: impl Into<String>, developer_message: Option<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            developer_message,
            ..Self::new(status)
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl IntoResponse for HttpResponse {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, axum::Json(self)).into_response()
    }
}

/// `Bad Request` -> `BAD_REQUEST`
fn status_name(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("UNKNOWN")
        .to_ascii_uppercase()
        .replace([' ', '-'], "_")
}

/// Identity as clients see it (never carries the password hash).
#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub enabled: bool,
    pub not_locked: bool,
    pub using_mfa: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

impl UserDto {
    pub fn from_identity(identity: &Identity, role: Option<&Role>) -> Self {
        Self {
            id: identity.id,
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            email: identity.email.clone(),
            phone: identity.phone.clone(),
            enabled: identity.enabled,
            not_locked: !identity.locked,
            using_mfa: identity.mfa_enabled,
            created_at: identity.created_at,
            role_name: role.map(|r| r.name.clone()),
            permissions: role.map(|r| r.permission.clone()),
        }
    }

    pub fn from_principal(principal: &UserPrincipal) -> Self {
        Self::from_identity(&principal.identity, Some(&principal.role))
    }
}

pub fn user_data(user: UserDto) -> serde_json::Value {
    serde_json::json!({ "user": user })
}

pub fn session_data(principal: &UserPrincipal, tokens: &TokenPair) -> serde_json::Value {
    serde_json::json!({
        "user": UserDto::from_principal(principal),
        "access_token": tokens.access_token,
        "refresh_token": tokens.refresh_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_names_are_screaming_snake_case() {
        assert_eq!(status_name(StatusCode::BAD_REQUEST), "BAD_REQUEST");
        assert_eq!(status_name(StatusCode::OK), "OK");
        assert_eq!(status_name(StatusCode::LOCKED), "LOCKED");
    }

    #[test]
    fn empty_fields_are_omitted() {
        let body = serde_json::to_value(HttpResponse::success(StatusCode::OK, "fine")).unwrap();
        assert_eq!(body["status_code"], 200);
        assert_eq!(body["message"], "fine");
        assert!(body.get("reason").is_none());
        assert!(body.get("data").is_none());
    }
}
