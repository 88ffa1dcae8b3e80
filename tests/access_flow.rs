//! End-to-end access-control scenarios against the assembled router:
//! login/logout, revocation, role enforcement, and rate limiting.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use caregate_backend::{
    api,
    auth::{
        api::AppState,
        blacklist::{InMemoryBlacklist, TokenBlacklist},
        middleware::GuardState,
        models::Role,
        SessionService, SqliteUserStore, TokenCodec,
    },
    config::EnvMode,
    middleware::rate_limit::{RateLimitState, RateLimitTable, RateLimiter},
};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tower::ServiceExt;

const SECRET: &str = "integration-test-secret";

struct TestApp {
    router: Router,
    store: Arc<SqliteUserStore>,
    _db: NamedTempFile,
}

fn build_app(env: EnvMode, blacklisting: bool) -> TestApp {
    let db = NamedTempFile::new().unwrap();
    let store = Arc::new(SqliteUserStore::new(db.path().to_str().unwrap()).unwrap());

    let codec = Arc::new(TokenCodec::new(SECRET.to_string(), 3600));
    let blacklist: Option<Arc<dyn TokenBlacklist>> = if blacklisting {
        Some(Arc::new(InMemoryBlacklist::new()))
    } else {
        None
    };

    let sessions = Arc::new(SessionService::new(
        store.clone(),
        store.clone(),
        codec.clone(),
        blacklist.clone(),
    ));

    let routes = Arc::new(api::route_table());
    let guard = GuardState {
        codec,
        blacklist,
        routes: routes.clone(),
        blacklist_fail_open: false,
    };
    let limits = RateLimitState {
        limiter: Arc::new(RateLimiter::new()),
        table: Arc::new(RateLimitTable::defaults()),
        routes,
        env,
        super_user_multiplier: 3,
    };

    let router = api::build_router(
        AppState {
            sessions,
            users: store.clone(),
        },
        guard,
        limits,
    );

    TestApp {
        router,
        store,
        _db: db,
    }
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(path: &str, token: Option<&str>) -> Request<Body> {
    request(Method::GET, path, token, None)
}

fn post_json(path: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    request(Method::POST, path, token, Some(body))
}

fn request(
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn login(router: &Router, email: &str, password: &str) -> String {
    let (status, body) = send(
        router,
        post_json(
            "/api/auth/login",
            None,
            serde_json::json!({ "email": email, "password": password }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn public_route_admits_without_header_protected_rejects() {
    let app = build_app(EnvMode::Development, true);

    let (status, body) = send(&app.router, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    // Same headerless request against a protected route
    let (status, body) = send(&app.router, get("/api/users", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "No token provided");
}

#[tokio::test]
async fn unknown_route_is_plain_not_found() {
    let app = build_app(EnvMode::Development, true);

    // Unmatched paths bypass the guard and hit the 404 fallback
    let (status, _) = send(&app.router, get("/no-such-route", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A valid token does not change the outcome
    let token = login(&app.router, "admin@caregate.local", "admin123").await;
    let (status, _) = send(&app.router, get("/favicon.ico", Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_authorization_header_rejected() {
    let app = build_app(EnvMode::Development, true);

    let req = Request::builder()
        .method(Method::GET)
        .uri("/api/users")
        .header(header::AUTHORIZATION, "Basic abc123")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, req).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token format");
}

#[tokio::test]
async fn login_then_access_then_logout_revokes_token() {
    let app = build_app(EnvMode::Development, true);
    let token = login(&app.router, "admin@caregate.local", "admin123").await;

    // Token works against a protected route
    let (status, _) = send(&app.router, get("/api/users", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app.router, get("/api/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "admin");

    // Logout acknowledges
    let (status, body) = send(
        &app.router,
        post_json("/api/auth/logout", Some(&token), serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Successfully logged out");

    // Replaying the revoked token is rejected before signature checks
    let (status, body) = send(&app.router, get("/api/users", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token is blacklisted");
}

#[tokio::test]
async fn logout_without_blacklisting_leaves_token_usable() {
    let app = build_app(EnvMode::Development, false);
    let token = login(&app.router, "admin@caregate.local", "admin123").await;

    let (status, _) = send(
        &app.router,
        post_json("/api/auth/logout", Some(&token), serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Revocation disabled: the token stays valid until natural expiry
    let (status, _) = send(&app.router, get("/api/users", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn deactivated_account_rejected_after_password_match() {
    let app = build_app(EnvMode::Development, true);

    let user = app
        .store
        .create_user("Pat", "pat@example.com", "password123", Role::Patient)
        .unwrap();
    app.store.set_active(&user.id, false).unwrap();

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/auth/login",
            None,
            serde_json::json!({ "email": "pat@example.com", "password": "password123" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "User is deactivated");

    // Wrong password on the same deactivated account must not reveal state
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/auth/login",
            None,
            serde_json::json!({ "email": "pat@example.com", "password": "wrong-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");
}

#[tokio::test]
async fn role_allow_list_forbids_patient() {
    let app = build_app(EnvMode::Development, true);

    app.store
        .create_user("Pat", "pat@example.com", "password123", Role::Patient)
        .unwrap();
    let token = login(&app.router, "pat@example.com", "password123").await;

    let (status, body) = send(&app.router, get("/api/users", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Insufficient permissions");
}

#[tokio::test]
async fn patient_hits_rate_limit_on_lookup() {
    let app = build_app(EnvMode::Development, true);

    let user = app
        .store
        .create_user("Pat", "pat@example.com", "password123", Role::Patient)
        .unwrap();
    let token = login(&app.router, "pat@example.com", "password123").await;

    // users.find_one allows patients 2 requests per window
    let path = format!("/api/users/{}", user.id);
    for _ in 0..2 {
        let (status, _) = send(&app.router, get(&path, Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app.router, get(&path, Some(&token))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Too Many Requests");
}

#[tokio::test]
async fn elevated_role_exempt_from_limits_in_development() {
    let app = build_app(EnvMode::Development, true);
    let token = login(&app.router, "admin@caregate.local", "admin123").await;

    let admin = app.store.find_by_email("admin@caregate.local").unwrap().unwrap();
    let path = format!("/api/users/{}", admin.id);

    // Admin base limit on users.find_one is 10; development exempts them
    for _ in 0..12 {
        let (status, _) = send(&app.router, get(&path, Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn expired_token_rejected_as_invalid() {
    let app = build_app(EnvMode::Development, true);

    // A codec with a TTL in the past mints already-expired tokens
    let expired_codec = TokenCodec::new(SECRET.to_string(), -10);
    let admin = app.store.find_by_email("admin@caregate.local").unwrap().unwrap();
    let token = expired_codec.issue(&admin).unwrap();

    let (status, body) = send(&app.router, get("/api/users", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token");

    // Logout with the expired token is InvalidToken, not a revocation
    let (status, body) = send(
        &app.router,
        post_json("/api/auth/logout", Some(&token), serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token");
}

#[tokio::test]
async fn user_management_round_trip() {
    let app = build_app(EnvMode::Development, true);
    let token = login(&app.router, "admin@caregate.local", "admin123").await;

    // Create
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/users",
            Some(&token),
            serde_json::json!({
                "name": "Op",
                "email": "op@example.com",
                "password": "password123",
                "role": "operator",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["role"], "operator");

    // Deactivate, then the account cannot log in
    let (status, body) = send(
        &app.router,
        post_json(
            &format!("/api/users/{id}/deactivate"),
            Some(&token),
            serde_json::json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);

    let (status, _) = send(
        &app.router,
        post_json(
            "/api/auth/login",
            None,
            serde_json::json!({ "email": "op@example.com", "password": "password123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Reactivate and delete
    let (status, body) = send(
        &app.router,
        post_json(
            &format!("/api/users/{id}/activate"),
            Some(&token),
            serde_json::json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], true);

    let (status, _) = send(
        &app.router,
        request(Method::DELETE, &format!("/api/users/{id}"), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn weak_password_rejected_on_create() {
    let app = build_app(EnvMode::Development, true);
    let token = login(&app.router, "admin@caregate.local", "admin123").await;

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/users",
            Some(&token),
            serde_json::json!({
                "name": "Shorty",
                "email": "short@example.com",
                "password": "short",
                "role": "patient",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Password must be at least 8 characters");
}
