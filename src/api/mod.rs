//! Router assembly.
//!
//! Routes, their access declarations, and their rate policies are all
//! registered here so the guard and limiter share one source of truth.

pub mod users;

use crate::auth::{
    api::{self as auth_api, AppState},
    middleware::{access_guard, GuardState, RouteAccess, RouteTable},
    models::Role,
};
use crate::middleware::rate_limit::{rate_limit_middleware, RateLimitState};
use axum::{
    http::Method,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;

const ADMIN_ONLY: &[Role] = &[Role::Admin];
const ADMIN_MANAGER: &[Role] = &[Role::Admin, Role::Manager];

/// Access declarations for every route the router serves.
///
/// A route must be registered here to be public or role-restricted;
/// unregistered routes default to authenticated-any-role in the guard.
pub fn route_table() -> RouteTable {
    let mut table = RouteTable::new();

    table.register(Method::GET, "/health", RouteAccess::public());
    table.register(Method::POST, "/api/auth/login", RouteAccess::public());
    table.register(Method::POST, "/api/auth/logout", RouteAccess::authenticated());
    table.register(Method::GET, "/api/auth/me", RouteAccess::authenticated());

    table.register(
        Method::GET,
        "/api/users",
        RouteAccess::roles(ADMIN_MANAGER),
    );
    table.register(
        Method::POST,
        "/api/users",
        RouteAccess::roles(ADMIN_MANAGER).with_policy("users.create"),
    );
    table.register(
        Method::GET,
        "/api/users/:id",
        RouteAccess::authenticated().with_policy("users.find_one"),
    );
    table.register(
        Method::PUT,
        "/api/users/:id",
        RouteAccess::roles(ADMIN_MANAGER).with_policy("users.update"),
    );
    table.register(
        Method::DELETE,
        "/api/users/:id",
        RouteAccess::roles(ADMIN_ONLY).with_policy("users.delete"),
    );
    table.register(
        Method::POST,
        "/api/users/:id/deactivate",
        RouteAccess::roles(ADMIN_MANAGER).with_policy("users.deactivate"),
    );
    table.register(
        Method::POST,
        "/api/users/:id/activate",
        RouteAccess::roles(ADMIN_MANAGER).with_policy("users.activate"),
    );

    table
}

/// Assemble the application router.
///
/// Layer order is outermost-last: CORS, then the access guard, then the
/// rate limiter, so every request is identified before it is counted.
/// The guard and limiter are route layers: a request that matches no route
/// falls through to the plain 404 fallback instead of being gated.
pub fn build_router(app: AppState, guard: GuardState, limits: RateLimitState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/login", post(auth_api::login))
        .route("/api/auth/logout", post(auth_api::logout))
        .route("/api/auth/me", get(auth_api::me))
        .route(
            "/api/users",
            get(users::list_users).post(users::create_user),
        )
        .route(
            "/api/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/api/users/:id/deactivate", post(users::deactivate_user))
        .route("/api/users/:id/activate", post(users::activate_user))
        .with_state(app)
        .route_layer(middleware::from_fn_with_state(
            limits,
            rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(guard, access_guard))
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
