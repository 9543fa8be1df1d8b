//! User model and related functionality

use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of generated password reset tokens
const RESET_TOKEN_LENGTH: usize = 32;

/// Why a password reset token was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResetPurpose {
    /// Account activation: the user sets a first password and a username
    NewAccount,
    /// Forgotten password
    PasswordReset,
}

impl ResetPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetPurpose::NewAccount => "newAccount",
            ResetPurpose::PasswordReset => "passwordReset",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "newAccount" => Some(ResetPurpose::NewAccount),
            "passwordReset" => Some(ResetPurpose::PasswordReset),
            _ => None,
        }
    }
}

/// Single in-flight password reset / activation request of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetToken {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub purpose: ResetPurpose,
}

impl PasswordResetToken {
    /// Generate a fresh random token valid for `ttl`
    pub fn generate(purpose: ResetPurpose, ttl: chrono::Duration) -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RESET_TOKEN_LENGTH)
            .map(char::from)
            .collect();
        let now = Utc::now();

        Self {
            token,
            created_at: now,
            expires_at: now + ttl,
            purpose,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// User entity
///
/// The password digest and the pending reset token are never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_digest: Option<String>,
    pub is_admin: bool,
    #[serde(skip_serializing, default)]
    pub pending_reset: Option<PasswordResetToken>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New user creation payload
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub pending_reset: Option<PasswordResetToken>,
}

/// User update payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    pub username: Option<String>,
    pub is_admin: Option<bool>,
}
