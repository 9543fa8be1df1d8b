//! Credential checks and login token issuance

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    config::{AuthConfig, LoginIdentifier, MAX_TOKEN_TTL},
    error::{AuthError, AuthResult},
    jwt::{Claims, TokenCodec},
    models::{NewLoginSession, SessionStatus, SessionToken, User},
    password::PasswordHasher,
    rate_limiter::{RateLimiter, RateLimiterConfig},
    repositories::CredentialStore,
    session::SessionLifecycle,
};

/// Response body of a successful login
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuccessfulLogin {
    pub token: String,
}

#[derive(Clone)]
pub struct LoginManager {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    codec: TokenCodec,
    lifecycle: SessionLifecycle,
    limiter: RateLimiter,
    identifier: LoginIdentifier,
    session_ttl: chrono::Duration,
    /// Argon2 digest checked when the user is unknown or has no password
    dummy_digest: Arc<str>,
}

impl LoginManager {
    pub fn new(
        config: &AuthConfig,
        store: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
        codec: TokenCodec,
        lifecycle: SessionLifecycle,
    ) -> AuthResult<Self> {
        if config.session_ttl > MAX_TOKEN_TTL {
            return Err(AuthError::Internal("Session TTL out of range".to_string()));
        }
        let session_ttl = chrono::Duration::from_std(config.session_ttl)
            .map_err(|e| AuthError::Internal(format!("Session TTL out of range: {e}")))?;
        let dummy_digest = hasher.hash(&Uuid::new_v4().to_string())?.into();

        Ok(Self {
            store,
            hasher,
            codec,
            lifecycle,
            limiter: RateLimiter::new(RateLimiterConfig::from(config)),
            identifier: config.login_identifier,
            session_ttl,
            dummy_digest,
        })
    }

    /// Check credentials and return the live login token of the user
    ///
    /// An unknown identifier, a user without password and a wrong password
    /// are indistinguishable to the caller.
    #[instrument(skip(self, clear_password))]
    pub async fn authenticate(
        &self,
        identifier: &str,
        clear_password: &str,
    ) -> AuthResult<SuccessfulLogin> {
        if !self.limiter.is_allowed(identifier).await {
            return Err(AuthError::TooManyAttempts);
        }

        let user = match self.identifier {
            LoginIdentifier::Email => self.store.find_user_by_email(identifier).await?,
            LoginIdentifier::Username => self.store.find_user_by_username(identifier).await?,
        };

        // A freshly registered user has no password until its reset token is redeemed
        let credentials = user.and_then(|user| {
            let digest = user.password_digest.clone()?;
            Some((user, digest))
        });
        let Some((user, digest)) = credentials else {
            self.verify_dummy(clear_password)?;
            debug!("Login for unknown identifier or user without password");
            return self.reject(identifier).await;
        };
        if !self.hasher.verify(clear_password, &digest)? {
            debug!(user_id = %user.id, "Login with wrong password");
            return self.reject(identifier).await;
        }

        self.limiter.reset(identifier).await;

        if PasswordHasher::is_legacy(&digest) {
            let upgraded = self.hasher.hash(clear_password)?;
            self.store.set_password_digest(user.id, &upgraded).await?;
            info!(user_id = %user.id, "Upgraded legacy password digest");
        }

        if let Some(session) = self.lifecycle.find_active_session(user.id).await? {
            if session.is_live_at(Utc::now()) {
                debug!(session_id = %session.id, "Reusing active session");
                return Ok(SuccessfulLogin {
                    token: session.token.jwt,
                });
            }
            self.lifecycle
                .invalidate(&session.token.jwt, SessionStatus::Expired)
                .await?;
        }

        self.mint(&user).await
    }

    /// Full Argon2 check against a random password; never matches
    fn verify_dummy(&self, clear_password: &str) -> AuthResult<bool> {
        self.hasher.verify(clear_password, &self.dummy_digest)
    }

    async fn reject(&self, identifier: &str) -> AuthResult<SuccessfulLogin> {
        self.limiter.record_failure(identifier).await;
        Err(AuthError::InvalidCredentials)
    }

    async fn mint(&self, user: &User) -> AuthResult<SuccessfulLogin> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.session_ttl)
            .ok_or_else(|| AuthError::Internal("Session expiry out of range".to_string()))?;
        let claims = Claims {
            user_id: user.id.to_string(),
            is_admin: user.is_admin,
            sub: user.username.clone().unwrap_or_default(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.codec.issuer().to_string(),
            jti: Uuid::new_v4().to_string(),
        };
        let jwt = self.codec.encode(&claims)?;

        let session = self
            .store
            .insert_session(NewLoginSession {
                user_id: user.id,
                token: SessionToken {
                    jwt,
                    expires_at,
                    status: SessionStatus::Active,
                },
            })
            .await?;
        info!(user_id = %user.id, session_id = %session.id, "Login session created");

        Ok(SuccessfulLogin {
            token: session.token.jwt,
        })
    }

    /// End the session of `jwt`; terminal or unknown sessions are left as they are
    pub async fn logout(&self, jwt: &str) -> AuthResult<()> {
        self.lifecycle
            .invalidate(jwt, SessionStatus::LoggedOut)
            .await?;
        Ok(())
    }
}
