//! Account and login session service of the memo board
//!
//! Users register with an email, activate their account through a mailed
//! reset token, and log in for a long-lived JWT. Every issued token is backed
//! by a persisted [`models::LoginSession`] whose status, not the token
//! itself, decides whether it is still accepted.

pub mod access;
pub mod account;
pub mod config;
pub mod error;
pub mod jwt;
pub mod login;
pub mod mailer;
pub mod models;
pub mod password;
pub mod rate_limiter;
pub mod repositories;
pub mod routes;
pub mod session;
pub mod validation;

use std::sync::Arc;

use crate::{
    access::{AccessGate, AccessPredicate},
    account::AccountService,
    config::AuthConfig,
    error::AuthResult,
    jwt::TokenCodec,
    login::LoginManager,
    mailer::Mailer,
    password::PasswordHasher,
    repositories::CredentialStore,
    session::SessionLifecycle,
};

pub use routes::create_router;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AuthConfig>,
    pub store: Arc<dyn CredentialStore>,
    pub codec: TokenCodec,
    pub lifecycle: SessionLifecycle,
    pub logins: LoginManager,
    pub accounts: AccountService,
}

impl AppState {
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
    ) -> AuthResult<Self> {
        let hasher = PasswordHasher::new(config.password_pepper.clone());
        let codec = TokenCodec::new(&config.jwt_secret, config.jwt_issuer.clone());
        let lifecycle = SessionLifecycle::new(Arc::clone(&store));

        let logins = LoginManager::new(
            &config,
            Arc::clone(&store),
            hasher.clone(),
            codec.clone(),
            lifecycle.clone(),
        )?;
        let accounts = AccountService::new(
            Arc::clone(&store),
            hasher,
            mailer,
            config.reset_token_ttl,
            config.client_domain.clone(),
        )?;

        Ok(Self {
            config: Arc::new(config),
            store,
            codec,
            lifecycle,
            logins,
            accounts,
        })
    }

    /// Gate enforcing `predicate` with this state's codec and sessions
    pub fn gate(&self, predicate: AccessPredicate) -> AccessGate {
        AccessGate::new(self.codec.clone(), self.lifecycle.clone(), predicate)
    }
}
