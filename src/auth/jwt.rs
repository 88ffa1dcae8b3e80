//! JWT Token Codec
//! Mission: Issue and verify signed bearer tokens securely

use crate::auth::{
    error::AuthError,
    models::{AuthUser, Claims},
};
use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

/// Codec for signing identity claims into bearer tokens and back.
///
/// Signing is HS256 over a server-side secret. Expiry is checked here
/// against an injectable clock rather than inside the JWT library so the
/// cutoff is exact (no leeway) and testable.
pub struct TokenCodec {
    secret: String,
    ttl_secs: i64,
}

impl TokenCodec {
    pub fn new(secret: String, ttl_secs: i64) -> Self {
        Self { secret, ttl_secs }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Sign a fresh token for a user, expiring `ttl_secs` from now.
    pub fn issue(&self, user: &AuthUser) -> Result<String> {
        self.issue_at(user, Utc::now().timestamp())
    }

    fn issue_at(&self, user: &AuthUser, now: i64) -> Result<String> {
        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role,
            iat: now as usize,
            exp: (now + self.ttl_secs) as usize,
        };

        debug!(
            user_id = %user.id,
            role = user.role.as_str(),
            ttl_secs = self.ttl_secs,
            "Issuing token"
        );

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .context("Failed to sign token")
    }

    /// Verify a token and extract its claims.
    ///
    /// Bad signature, malformed structure, and natural expiry all collapse
    /// to `InvalidToken`; callers must not be able to distinguish them.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify against an explicit clock (`now` in unix seconds).
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, AuthError> {
        // Expiry is enforced below against `now`, not by the library.
        let mut validation = Validation::default();
        validation.validate_exp = false;
        validation.required_spec_claims = Default::default();

        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|_| AuthError::InvalidToken)?;

        if now > decoded.claims.exp as i64 {
            return Err(AuthError::InvalidToken);
        }

        Ok(decoded.claims)
    }
}
