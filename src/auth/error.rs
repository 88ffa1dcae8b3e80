//! Auth error taxonomy
//! Mission: Map every access-control failure to a stable HTTP response

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

/// Terminal, user-visible access-control failures.
///
/// `UserNotFound` is internal-only: logout maps it to `InvalidToken` before
/// it reaches a caller, and its own response surface is identical to
/// `InvalidToken` so account existence cannot leak even if a future path
/// forgets the mapping. Infrastructure failures go through `Internal` and
/// are never reported as a credential problem.
#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    AccountDeactivated,
    NoToken,
    MalformedHeader,
    InvalidToken,
    TokenRevoked,
    Forbidden,
    UserNotFound,
    TooManyRequests,
    Internal,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::AccountDeactivated
            | AuthError::NoToken
            | AuthError::MalformedHeader
            | AuthError::InvalidToken
            | AuthError::TokenRevoked
            | AuthError::UserNotFound => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "Invalid credentials",
            AuthError::AccountDeactivated => "User is deactivated",
            AuthError::NoToken => "No token provided",
            AuthError::MalformedHeader => "Invalid token format",
            AuthError::InvalidToken | AuthError::UserNotFound => "Invalid token",
            AuthError::TokenRevoked => "Token is blacklisted",
            AuthError::Forbidden => "Insufficient permissions",
            AuthError::TooManyRequests => "Too many requests, please try again later.",
            AuthError::Internal => "Internal server error",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "statusCode": status.as_u16(),
            "message": self.message(),
            "error": status.canonical_reason().unwrap_or("Error"),
        });
        (status, Json(body)).into_response()
    }
}
