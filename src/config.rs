//! Runtime configuration
//! Mission: Parse the env-style configuration surface once at startup

use std::env;

/// Deployment environment; drives the rate limiter's elevated-role
/// treatment (exempt in development, multiplied in production).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvMode {
    Development,
    Production,
}

impl EnvMode {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => EnvMode::Production,
            _ => EnvMode::Development,
        }
    }
}

/// Which backing store the token blacklist uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlacklistBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub auth_db_path: String,
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
    pub blacklisting_enabled: bool,
    pub blacklist_backend: BlacklistBackend,
    pub redis_url: String,
    pub blacklist_fail_open: bool,
    pub super_user_multiplier: u32,
    pub env_mode: EnvMode,
}

impl Config {
    /// Read the full configuration from the environment, with development
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(3000);

        let auth_db_path =
            env::var("AUTH_DB_PATH").unwrap_or_else(|_| "caregate_auth.db".to_string());

        let jwt_secret = env::var("JWT_SECRET")
            .unwrap_or_else(|_| "dev-secret-change-in-production-minimum-32-characters".to_string());

        let token_ttl_secs = env::var("TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(3600);

        let blacklisting_enabled = env::var("ENABLE_TOKEN_BLACKLISTING")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
            .unwrap_or(true);

        let blacklist_backend = match env::var("BLACKLIST_BACKEND").as_deref() {
            Ok("redis") => BlacklistBackend::Redis,
            _ => BlacklistBackend::Memory,
        };

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let blacklist_fail_open = env::var("BLACKLIST_FAIL_OPEN")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
            .unwrap_or(false);

        let super_user_multiplier = env::var("RATE_LIMIT_SUPER_USER_MULTIPLIER")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(3);

        let env_mode = EnvMode::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        Self {
            port,
            auth_db_path,
            jwt_secret,
            token_ttl_secs,
            blacklisting_enabled,
            blacklist_backend,
            redis_url,
            blacklist_fail_open,
            super_user_multiplier,
            env_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_mode_parsing() {
        assert_eq!(EnvMode::from_str("production"), EnvMode::Production);
        assert_eq!(EnvMode::from_str("PROD"), EnvMode::Production);
        assert_eq!(EnvMode::from_str("development"), EnvMode::Development);
        assert_eq!(EnvMode::from_str("anything-else"), EnvMode::Development);
    }
}
