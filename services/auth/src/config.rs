//! Service configuration
//!
//! All settings are read once at startup into an immutable [`AuthConfig`]
//! which is then shared behind an `Arc`. Missing secrets abort startup unless
//! `AUTH_INSECURE_DEV_DEFAULTS=true` is set explicitly.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::warn;

/// Dev-only HMAC secret used when `AUTH_INSECURE_DEV_DEFAULTS=true`.
const DEV_JWT_SECRET: &str = "dev-only-jwt-secret-0f6e7d3a9b2c4e5f8a1d0c9b7e6f5a4d";
/// Dev-only pepper used when `AUTH_INSECURE_DEV_DEFAULTS=true`.
const DEV_PASSWORD_PEPPER: &str = "dev-only-pepper-6acaa86d5e15e3df48b4eeb11dcd5c07";

/// Longest accepted token lifetime, 100 years
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Field used to look a user up at login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginIdentifier {
    Email,
    Username,
}

impl FromStr for LoginIdentifier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(LoginIdentifier::Email),
            "username" => Ok(LoginIdentifier::Username),
            other => bail!("unknown login identifier `{}`", other),
        }
    }
}

/// Backend holding users and login sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => bail!("unknown store backend `{}`", other),
        }
    }
}

/// Authentication service configuration
#[derive(Clone)]
pub struct AuthConfig {
    /// Symmetric key for HMAC token signatures
    pub jwt_secret: String,
    /// Process-wide pepper mixed into every password before hashing
    pub password_pepper: String,
    /// `iss` claim written into and required from every token
    pub jwt_issuer: String,
    /// Lifetime of a login token (default: 60 days)
    pub session_ttl: Duration,
    /// Lifetime of a password reset / account activation token (default: 10 minutes)
    pub reset_token_ttl: Duration,
    /// Field matched against the login identifier
    pub login_identifier: LoginIdentifier,
    /// Failed logins tolerated per identifier within `login_failure_window`
    pub max_failed_logins: u32,
    pub login_failure_window: Duration,
    pub login_lockout: Duration,
    /// Front-end origin used to build links in outgoing emails
    pub client_domain: String,
    pub bind_addr: String,
    pub store_backend: StoreBackend,
}

impl AuthConfig {
    /// Build a configuration with the given secrets and default settings
    pub fn new(jwt_secret: impl Into<String>, password_pepper: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            password_pepper: password_pepper.into(),
            jwt_issuer: "memoboard-api".to_string(),
            session_ttl: Duration::from_secs(60 * 24 * 60 * 60),
            reset_token_ttl: Duration::from_secs(10 * 60),
            login_identifier: LoginIdentifier::Email,
            max_failed_logins: 5,
            login_failure_window: Duration::from_secs(300),
            login_lockout: Duration::from_secs(900),
            client_domain: "http://localhost:8080".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            store_backend: StoreBackend::Postgres,
        }
    }

    /// Create a new AuthConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_SECRET`: HMAC signing secret (required)
    /// - `PASSWORD_PEPPER`: password pepper (required)
    /// - `AUTH_INSECURE_DEV_DEFAULTS`: use built-in dev secrets when the two above are unset
    /// - `JWT_ISSUER`: token issuer (default: "memoboard-api")
    /// - `SESSION_TTL_SECS`: login token lifetime (default: 5184000)
    /// - `PASSWORD_RESET_TTL_SECS`: reset token lifetime (default: 600)
    /// - `LOGIN_IDENTIFIER`: `email` or `username` (default: email)
    /// - `LOGIN_MAX_FAILED_ATTEMPTS`, `LOGIN_FAILURE_WINDOW_SECS`, `LOGIN_LOCKOUT_SECS`
    /// - `CLIENT_DOMAIN`, `BIND_ADDR`, `STORE_BACKEND`
    pub fn from_env() -> Result<Self> {
        let insecure_defaults: bool = parse_var("AUTH_INSECURE_DEV_DEFAULTS", false)?;

        let jwt_secret = secret_var("JWT_SECRET", DEV_JWT_SECRET, insecure_defaults)?;
        let password_pepper =
            secret_var("PASSWORD_PEPPER", DEV_PASSWORD_PEPPER, insecure_defaults)?;

        let mut config = AuthConfig::new(jwt_secret, password_pepper);

        if let Some(issuer) = non_empty_var("JWT_ISSUER") {
            config.jwt_issuer = issuer;
        }
        config.session_ttl = Duration::from_secs(parse_var(
            "SESSION_TTL_SECS",
            config.session_ttl.as_secs(),
        )?);
        config.reset_token_ttl = Duration::from_secs(parse_var(
            "PASSWORD_RESET_TTL_SECS",
            config.reset_token_ttl.as_secs(),
        )?);
        config.login_identifier = parse_var("LOGIN_IDENTIFIER", config.login_identifier)?;
        config.max_failed_logins =
            parse_var("LOGIN_MAX_FAILED_ATTEMPTS", config.max_failed_logins)?;
        config.login_failure_window = Duration::from_secs(parse_var(
            "LOGIN_FAILURE_WINDOW_SECS",
            config.login_failure_window.as_secs(),
        )?);
        config.login_lockout = Duration::from_secs(parse_var(
            "LOGIN_LOCKOUT_SECS",
            config.login_lockout.as_secs(),
        )?);
        if let Some(domain) = non_empty_var("CLIENT_DOMAIN") {
            config.client_domain = domain.trim_end_matches('/').to_string();
        }
        if let Some(addr) = non_empty_var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        config.store_backend = parse_var("STORE_BACKEND", config.store_backend)?;

        if config.session_ttl.is_zero() {
            bail!("SESSION_TTL_SECS must be greater than zero");
        }
        if config.session_ttl > MAX_TOKEN_TTL {
            bail!("SESSION_TTL_SECS must not exceed {}", MAX_TOKEN_TTL.as_secs());
        }
        if config.reset_token_ttl > MAX_TOKEN_TTL {
            bail!("PASSWORD_RESET_TTL_SECS must not exceed {}", MAX_TOKEN_TTL.as_secs());
        }

        Ok(config)
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("password_pepper", &"<redacted>")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("session_ttl", &self.session_ttl)
            .field("reset_token_ttl", &self.reset_token_ttl)
            .field("login_identifier", &self.login_identifier)
            .field("max_failed_logins", &self.max_failed_logins)
            .field("login_failure_window", &self.login_failure_window)
            .field("login_lockout", &self.login_lockout)
            .field("client_domain", &self.client_domain)
            .field("bind_addr", &self.bind_addr)
            .field("store_backend", &self.store_backend)
            .finish()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn secret_var(name: &str, dev_default: &str, insecure_defaults: bool) -> Result<String> {
    match non_empty_var(name) {
        Some(value) => Ok(value),
        None if insecure_defaults => {
            warn!(
                "{} not set, falling back to the built-in development value. Never do this in production",
                name
            );
            Ok(dev_default.to_string())
        }
        None => bail!("{} environment variable not set", name),
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid value for {}", name)),
        None => Ok(default),
    }
}
