//! Rate limiting middleware.
//!
//! Fixed-window counters per (caller, route), with role- and
//! environment-sensitive limits. Authenticated callers are keyed by their
//! subject id, anonymous callers by client IP. A route without a configured
//! policy is not limited at all (fail open).

use crate::auth::middleware::RouteTable;
use crate::auth::models::{Claims, Role};
use crate::config::EnvMode;
use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Limit/window pair for one (route, role) cell.
#[derive(Debug, Clone, Copy)]
pub struct RatePolicy {
    pub limit: u32,
    pub window: Duration,
}

impl RatePolicy {
    pub const fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// Static policy table mapping (route id, role) to a policy, with an
/// optional per-route anonymous policy for public routes.
#[derive(Debug, Default)]
pub struct RateLimitTable {
    per_role: HashMap<(&'static str, Role), RatePolicy>,
    anonymous: HashMap<&'static str, RatePolicy>,
}

impl RateLimitTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, route: &'static str, role: Role, policy: RatePolicy) {
        self.per_role.insert((route, role), policy);
    }

    pub fn set_anonymous(&mut self, route: &'static str, policy: RatePolicy) {
        self.anonymous.insert(route, policy);
    }

    pub fn for_role(&self, route: &'static str, role: Role) -> Option<RatePolicy> {
        self.per_role.get(&(route, role)).copied()
    }

    pub fn for_anonymous(&self, route: &str) -> Option<RatePolicy> {
        self.anonymous.get(route).copied()
    }

    /// Per-role budgets for the user-management routes.
    pub fn defaults() -> Self {
        use Role::{Admin, Manager, Operator, Patient};
        let mut table = Self::new();

        let secs = Duration::from_secs;
        for route in ["users.create", "users.find_one"] {
            table.set(route, Admin, RatePolicy::new(10, secs(30)));
            table.set(route, Manager, RatePolicy::new(10, secs(60)));
            table.set(route, Operator, RatePolicy::new(3, secs(180)));
            table.set(route, Patient, RatePolicy::new(2, secs(300)));
        }
        for route in [
            "users.update",
            "users.delete",
            "users.deactivate",
            "users.activate",
        ] {
            table.set(route, Admin, RatePolicy::new(5, secs(60)));
            table.set(route, Manager, RatePolicy::new(5, secs(120)));
            table.set(route, Operator, RatePolicy::new(2, secs(240)));
            table.set(route, Patient, RatePolicy::new(1, secs(300)));
        }

        table
    }
}

/// Derive the limit actually applied to a caller.
///
/// Elevated roles (admin, manager) are exempt entirely outside production
/// and get the multiplied budget in production; everyone else, including
/// anonymous callers, gets the base limit. `None` means unlimited.
pub fn effective_limit(
    role: Option<Role>,
    env: EnvMode,
    base: u32,
    multiplier: u32,
) -> Option<u32> {
    match role {
        Some(role) if role.is_elevated() => match env {
            EnvMode::Development => None,
            EnvMode::Production => Some(base.saturating_mul(multiplier)),
        },
        _ => Some(base),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RateKey {
    caller: String,
    route: &'static str,
}

struct RateWindow {
    count: u32,
    window_start: Instant,
}

enum RateDecision {
    Allowed,
    Exceeded { retry_after: Duration },
}

/// Counter state shared across all requests.
///
/// The dashmap shards give per-key locking; concurrent requests for the
/// same key at a window boundary may overshoot by at most the number of
/// requests in flight, which is accepted.
pub struct RateLimiter {
    windows: DashMap<RateKey, RateWindow>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    fn check_at(&self, key: RateKey, limit: u32, window: Duration, now: Instant) -> RateDecision {
        let mut entry = self.windows.entry(key).or_insert(RateWindow {
            count: 0,
            window_start: now,
        });

        // Reset once the window has fully elapsed
        if now.duration_since(entry.window_start) > window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;

        if entry.count > limit {
            let reset_at = entry.window_start + window;
            RateDecision::Exceeded {
                retry_after: reset_at.duration_since(now),
            }
        } else {
            RateDecision::Allowed
        }
    }

    fn check(&self, key: RateKey, limit: u32, window: Duration) -> RateDecision {
        self.check_at(key, limit, window, Instant::now())
    }

    /// Drop windows idle longer than `max_age` (call from a background
    /// task). Staleness is harmless either way since stale windows reset on
    /// next use.
    pub fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        self.windows
            .retain(|_, w| now.duration_since(w.window_start) < max_age);
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared by the limiter middleware.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub table: Arc<RateLimitTable>,
    pub routes: Arc<RouteTable>,
    pub env: EnvMode,
    pub super_user_multiplier: u32,
}

/// Rate limiting middleware, run after the access guard so authenticated
/// callers are keyed by identity.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    matched: MatchedPath,
    req: Request,
    next: Next,
) -> Response {
    let access = state.routes.resolve(req.method(), matched.as_str());

    // Routes without a policy reference are not limited
    let Some(policy_id) = access.and_then(|a| a.rate_policy) else {
        return next.run(req).await;
    };

    let claims = req.extensions().get::<Claims>();
    let (caller, role, policy) = match claims {
        Some(c) => (
            c.sub.clone(),
            Some(c.role),
            state.table.for_role(policy_id, c.role),
        ),
        None => (client_ip(&req), None, state.table.for_anonymous(policy_id)),
    };

    // Policy lookup miss: fail open, not closed
    let Some(policy) = policy else {
        return next.run(req).await;
    };

    let Some(limit) = effective_limit(role, state.env, policy.limit, state.super_user_multiplier)
    else {
        return next.run(req).await;
    };

    let key = RateKey {
        caller,
        route: policy_id,
    };

    match state.limiter.check(key, limit, policy.window) {
        RateDecision::Allowed => next.run(req).await,
        RateDecision::Exceeded { retry_after } => {
            warn!(
                route = policy_id,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );

            let body = serde_json::json!({
                "statusCode": 429,
                "message": "Too many requests, please try again later.",
                "error": "Too Many Requests",
            });

            (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after.as_secs().max(1).to_string())],
                axum::Json(body),
            )
                .into_response()
        }
    }
}

fn client_ip(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
