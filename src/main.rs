//! CareGate - Access-controlled user management API
//! Mission: Authenticate, authorize, and throttle every request

use anyhow::{Context, Result};
use axum::middleware;
use caregate_backend::{
    api,
    auth::{
        api::AppState,
        blacklist::{InMemoryBlacklist, TokenBlacklist},
        middleware::GuardState,
        SessionService, SqliteUserStore, TokenCodec,
    },
    config::{BlacklistBackend, Config},
    middleware::{
        rate_limit::{RateLimitState, RateLimitTable, RateLimiter},
        request_logging,
    },
};
use dotenv::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, time::interval};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const WINDOW_MAX_AGE: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    init_tracing();

    let config = Config::from_env();

    info!("🚀 CareGate starting");
    info!(
        env = ?config.env_mode,
        blacklisting = config.blacklisting_enabled,
        "Access-control configuration loaded"
    );

    let user_store =
        Arc::new(SqliteUserStore::new(&config.auth_db_path).context("Failed to open user store")?);
    info!("🔐 User directory initialized at: {}", config.auth_db_path);

    let codec = Arc::new(TokenCodec::new(
        config.jwt_secret.clone(),
        config.token_ttl_secs,
    ));

    let (blacklist, sweep_target) = build_blacklist(&config)?;

    let sessions = Arc::new(SessionService::new(
        user_store.clone(),
        user_store.clone(),
        codec.clone(),
        blacklist.clone(),
    ));

    let routes = Arc::new(api::route_table());

    let guard = GuardState {
        codec,
        blacklist,
        routes: routes.clone(),
        blacklist_fail_open: config.blacklist_fail_open,
    };

    let limiter = Arc::new(RateLimiter::new());
    let limits = RateLimitState {
        limiter: limiter.clone(),
        table: Arc::new(RateLimitTable::defaults()),
        routes,
        env: config.env_mode,
        super_user_multiplier: config.super_user_multiplier,
    };

    // Background maintenance: eager blacklist eviction + stale window GC
    tokio::spawn(async move {
        let mut tick = interval(SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            if let Some(blacklist) = &sweep_target {
                blacklist.sweep();
            }
            limiter.cleanup(WINDOW_MAX_AGE);
        }
    });

    let app = api::build_router(
        AppState {
            sessions,
            users: user_store,
        },
        guard,
        limits,
    )
    .layer(middleware::from_fn(request_logging));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("🌐 Listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

/// Select the revocation backing store from configuration.
///
/// Returns the trait object handed to the guard/session plus, for the
/// in-memory backend, a concrete handle the sweep task can drive (redis
/// expires keys natively and needs no sweep).
fn build_blacklist(
    config: &Config,
) -> Result<(Option<Arc<dyn TokenBlacklist>>, Option<Arc<InMemoryBlacklist>>)> {
    if !config.blacklisting_enabled {
        info!("Token blacklisting disabled; logout will not revoke tokens");
        return Ok((None, None));
    }

    match config.blacklist_backend {
        BlacklistBackend::Memory => {
            let blacklist = Arc::new(InMemoryBlacklist::new());
            Ok((Some(blacklist.clone()), Some(blacklist)))
        }
        BlacklistBackend::Redis => {
            #[cfg(feature = "redis-blacklist")]
            {
                let blacklist = Arc::new(
                    caregate_backend::auth::blacklist::RedisBlacklist::new(&config.redis_url)
                        .context("Failed to open redis blacklist")?,
                );
                info!("Token blacklist backed by redis at {}", config.redis_url);
                Ok((Some(blacklist), None))
            }
            #[cfg(not(feature = "redis-blacklist"))]
            {
                tracing::warn!(
                    "BLACKLIST_BACKEND=redis but built without the redis-blacklist \
                     feature; falling back to in-memory"
                );
                let blacklist = Arc::new(InMemoryBlacklist::new());
                Ok((Some(blacklist.clone()), Some(blacklist)))
            }
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
