//! Session Service
//! Mission: Orchestrate login and logout across the auth collaborators

use crate::auth::{
    blacklist::TokenBlacklist,
    error::AuthError,
    jwt::TokenCodec,
    user_store::{CredentialVerifier, UserDirectory},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Login/logout orchestration.
///
/// The blacklist is an optional capability: when revocation is disabled by
/// configuration it is simply absent and logout skips the revoke step.
pub struct SessionService {
    verifier: Arc<dyn CredentialVerifier>,
    directory: Arc<dyn UserDirectory>,
    codec: Arc<TokenCodec>,
    blacklist: Option<Arc<dyn TokenBlacklist>>,
}

impl SessionService {
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        directory: Arc<dyn UserDirectory>,
        codec: Arc<TokenCodec>,
        blacklist: Option<Arc<dyn TokenBlacklist>>,
    ) -> Self {
        Self {
            verifier,
            directory,
            codec,
            blacklist,
        }
    }

    /// Verify a credential pair and mint a fresh token.
    ///
    /// Deactivation is inspected only after the password matched, so the
    /// error path cannot be used to probe account existence.
    pub fn login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let user = self
            .verifier
            .verify_credentials(email, password)
            .map_err(|e| {
                warn!(error = %e, "Credential verifier failed");
                AuthError::Internal
            })?
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AuthError::AccountDeactivated);
        }

        self.directory.record_login(&user.id).map_err(|e| {
            warn!(error = %e, user_id = %user.id, "Failed to record login");
            AuthError::Internal
        })?;

        let token = self.codec.issue(&user).map_err(|e| {
            warn!(error = %e, "Token issuance failed");
            AuthError::Internal
        })?;

        info!(user_id = %user.id, role = user.role.as_str(), "Login successful");

        Ok(token)
    }

    /// Close a session: verify the token, stamp the logout, and revoke the
    /// token for its remaining lifetime when blacklisting is enabled.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.logout_at(token, Utc::now().timestamp()).await
    }

    async fn logout_at(&self, token: &str, now: i64) -> Result<(), AuthError> {
        // Any verification failure collapses to InvalidToken; an expired
        // token is already invalid and is never blacklisted.
        let claims = self.codec.verify_at(token, now)?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        let user = self
            .directory
            .find_by_id(&user_id)
            .map_err(|e| {
                warn!(error = %e, "User lookup failed during logout");
                AuthError::Internal
            })?
            .ok_or_else(|| {
                // Existence must not leak through the logout error path.
                warn!(user_id = %user_id, "Logout for unknown user");
                AuthError::InvalidToken
            })?;

        self.directory.record_logout(&user.id).map_err(|e| {
            warn!(error = %e, user_id = %user.id, "Failed to record logout");
            AuthError::Internal
        })?;

        if let Some(blacklist) = &self.blacklist {
            let remaining = claims.exp as i64 - now;
            if remaining > 0 {
                // Best effort: a revocation-store outage degrades security
                // until natural expiry but must not fail the logout itself.
                if let Err(e) = blacklist.revoke(token, remaining as u64).await {
                    warn!(error = %e, user_id = %user.id, "Token revocation failed");
                }
            }
        }

        info!(user_id = %user.id, "Logout successful");

        Ok(())
    }
}
