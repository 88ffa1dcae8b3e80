//! Authentication API Endpoints
//! Mission: Provide login, logout, and identity echo endpoints

use crate::auth::{
    error::AuthError,
    middleware::{extract_bearer, extract_claims},
    session::SessionService,
    user_store::SqliteUserStore,
};
use crate::auth::models::{LoginRequest, LoginResponse, LogoutResponse, Role};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state for the auth and user routes
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub users: Arc<SqliteUserStore>,
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    info!(email = %payload.email, "Login attempt");

    let token = state
        .sessions
        .login(&payload.email, &payload.password)
        .map_err(|e| {
            if e != AuthError::Internal {
                warn!(email = %payload.email, error = %e, "Login rejected");
            }
            e
        })?;

    Ok(Json(LoginResponse { token }))
}

/// Logout endpoint - POST /api/auth/logout
///
/// The access guard already admitted this request; the session service
/// re-verifies the token itself so logout semantics do not depend on guard
/// ordering.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<LogoutResponse>, AuthError> {
    let token = extract_bearer(&headers).map_err(|_| AuthError::InvalidToken)?;

    state.sessions.logout(&token).await?;

    Ok(Json(LogoutResponse {
        message: "Successfully logged out".to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: String,
    pub role: Role,
    pub expires_at: usize,
}

/// Current identity - GET /api/auth/me
///
/// Built entirely from the claims the guard bound; no directory lookup.
pub async fn me(req: Request) -> Result<Json<MeResponse>, AuthError> {
    let claims = extract_claims(&req).ok_or(AuthError::InvalidToken)?;

    Ok(Json(MeResponse {
        id: claims.sub.clone(),
        role: claims.role,
        expires_at: claims.exp,
    }))
}
