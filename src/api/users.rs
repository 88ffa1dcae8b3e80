//! User Management Endpoints
//! Mission: CRUD surface over the user directory (guarded upstream)
//!
//! Role enforcement and rate limiting happen in the access guard and
//! limiter middleware, driven by the route table; handlers only touch the
//! store.

use crate::auth::api::AppState;
use crate::auth::models::{Role, UserResponse};
use crate::auth::user_store::UserDirectory;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

/// Create user request
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Update user request
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: String,
}

/// List all users - GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, UsersApiError> {
    let users = state.users.list_users().map_err(internal)?;

    Ok(Json(users.iter().map(UserResponse::from_user).collect()))
}

/// Get one user - GET /api/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, UsersApiError> {
    let id = parse_id(&id)?;

    let user = state
        .users
        .find_by_id(&id)
        .map_err(internal)?
        .ok_or(UsersApiError::NotFound)?;

    Ok(Json(UserResponse::from_user(&user)))
}

/// Create user - POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), UsersApiError> {
    if payload.password.len() < 8 {
        return Err(UsersApiError::WeakPassword);
    }

    let user = state
        .users
        .create_user(&payload.name, &payload.email, &payload.password, payload.role)
        .map_err(|e| {
            warn!(error = %e, "Failed to create user");
            UsersApiError::EmailTaken
        })?;

    Ok((StatusCode::CREATED, Json(UserResponse::from_user(&user))))
}

/// Rename user - PUT /api/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, UsersApiError> {
    let id = parse_id(&id)?;

    state
        .users
        .update_name(&id, &payload.name)
        .map_err(|_| UsersApiError::NotFound)?;

    fetch(&state, &id).await
}

/// Delete user - DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, UsersApiError> {
    let id = parse_id(&id)?;

    state
        .users
        .delete_user(&id)
        .map_err(|_| UsersApiError::NotFound)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Deactivate account - POST /api/users/:id/deactivate
pub async fn deactivate_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, UsersApiError> {
    set_active(&state, &id, false).await
}

/// Activate account - POST /api/users/:id/activate
pub async fn activate_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, UsersApiError> {
    set_active(&state, &id, true).await
}

async fn set_active(
    state: &AppState,
    id: &str,
    active: bool,
) -> Result<Json<UserResponse>, UsersApiError> {
    let id = parse_id(id)?;

    state
        .users
        .set_active(&id, active)
        .map_err(|_| UsersApiError::NotFound)?;

    fetch(state, &id).await
}

async fn fetch(state: &AppState, id: &Uuid) -> Result<Json<UserResponse>, UsersApiError> {
    let user = state
        .users
        .find_by_id(id)
        .map_err(internal)?
        .ok_or(UsersApiError::NotFound)?;

    Ok(Json(UserResponse::from_user(&user)))
}

fn parse_id(id: &str) -> Result<Uuid, UsersApiError> {
    Uuid::parse_str(id).map_err(|_| UsersApiError::InvalidUserId)
}

fn internal(e: anyhow::Error) -> UsersApiError {
    warn!(error = %e, "User store failure");
    UsersApiError::Internal
}

/// User API errors
#[derive(Debug)]
pub enum UsersApiError {
    NotFound,
    EmailTaken,
    WeakPassword,
    InvalidUserId,
    Internal,
}

impl IntoResponse for UsersApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            UsersApiError::NotFound => (StatusCode::NOT_FOUND, "User not found"),
            UsersApiError::EmailTaken => (StatusCode::CONFLICT, "Email already in use"),
            UsersApiError::WeakPassword => (
                StatusCode::BAD_REQUEST,
                "Password must be at least 8 characters",
            ),
            UsersApiError::InvalidUserId => {
                (StatusCode::BAD_REQUEST, "Invalid user ID format")
            }
            UsersApiError::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({
            "statusCode": status.as_u16(),
            "message": message,
            "error": status.canonical_reason().unwrap_or("Error"),
        });

        (status, Json(body)).into_response()
    }
}
