//! Access Guard Middleware
//! Mission: Gate every request on revocation state, token validity, and roles

use crate::auth::{
    blacklist::TokenBlacklist,
    error::AuthError,
    jwt::TokenCodec,
    models::{Claims, Role},
};
use axum::{
    extract::{MatchedPath, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Per-route access declaration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct RouteAccess {
    /// Public routes skip token extraction, revocation, and role checks.
    pub public: bool,
    /// Role allow-list; `None` admits any authenticated role.
    pub allowed_roles: Option<&'static [Role]>,
    /// Rate-limit policy id consulted by the limiter middleware.
    pub rate_policy: Option<&'static str>,
}

impl RouteAccess {
    pub fn public() -> Self {
        Self {
            public: true,
            allowed_roles: None,
            rate_policy: None,
        }
    }

    pub fn authenticated() -> Self {
        Self {
            public: false,
            allowed_roles: None,
            rate_policy: None,
        }
    }

    pub fn roles(roles: &'static [Role]) -> Self {
        Self {
            public: false,
            allowed_roles: Some(roles),
            rate_policy: None,
        }
    }

    pub fn with_policy(mut self, id: &'static str) -> Self {
        self.rate_policy = Some(id);
        self
    }

    fn admits(&self, role: Role) -> bool {
        match self.allowed_roles {
            Some(roles) => roles.contains(&role),
            None => true,
        }
    }
}

/// Startup-built registry of per-route access declarations, keyed by
/// method + matched path pattern. Routes absent from the table default to
/// authenticated-any-role.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<(Method, String), RouteAccess>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, method: Method, path: &str, access: RouteAccess) {
        self.routes.insert((method, path.to_string()), access);
    }

    pub fn resolve(&self, method: &Method, path: &str) -> Option<&RouteAccess> {
        self.routes.get(&(method.clone(), path.to_string()))
    }
}

/// State shared by the guard middleware.
#[derive(Clone)]
pub struct GuardState {
    pub codec: Arc<TokenCodec>,
    pub blacklist: Option<Arc<dyn TokenBlacklist>>,
    pub routes: Arc<RouteTable>,
    /// Behavior when a revocation lookup errors: admit (open) or reject
    /// (closed, the default).
    pub blacklist_fail_open: bool,
}

/// Guard middleware run ahead of the rate limiter and handlers.
///
/// Ordering matters: revocation is checked before signature verification so
/// a revoked token short-circuits without spending effort on the codec.
pub async fn access_guard(
    State(state): State<GuardState>,
    matched: MatchedPath,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let access = state.routes.resolve(req.method(), matched.as_str());

    if access.is_some_and(|a| a.public) {
        // No identity is attached; the limiter keys the caller by address.
        return Ok(next.run(req).await);
    }

    let token = extract_bearer(req.headers())?;

    if let Some(blacklist) = &state.blacklist {
        match blacklist.is_revoked(&token).await {
            Ok(true) => return Err(AuthError::TokenRevoked),
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "Revocation lookup failed");
                if !state.blacklist_fail_open {
                    return Err(AuthError::Internal);
                }
            }
        }
    }

    let claims = state.codec.verify(&token)?;

    if let Some(access) = access {
        if !access.admits(claims.role) {
            return Err(AuthError::Forbidden);
        }
    }

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Extract claims bound by the guard (use in handlers after the guard ran).
pub fn extract_claims(req: &Request) -> Option<&Claims> {
    req.extensions().get::<Claims>()
}

/// Pull the token out of a `Bearer <token>` Authorization header.
pub fn extract_bearer(headers: &HeaderMap) -> Result<String, AuthError> {
    let header = headers.get(AUTHORIZATION).ok_or(AuthError::NoToken)?;
    let value = header.to_str().map_err(|_| AuthError::MalformedHeader)?;

    match value.split_once(' ') {
        Some(("Bearer", token)) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(AuthError::MalformedHeader),
    }
}
