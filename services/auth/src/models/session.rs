//! Login session model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a login token
///
/// `Active` is the only non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Active,
    LoggedOut,
    Expired,
    Invalidated,
}

impl SessionStatus {
    /// Persisted status code
    pub fn code(&self) -> i16 {
        match self {
            SessionStatus::Active => 0,
            SessionStatus::LoggedOut => 1,
            SessionStatus::Expired => 2,
            SessionStatus::Invalidated => 10,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(SessionStatus::Active),
            1 => Some(SessionStatus::LoggedOut),
            2 => Some(SessionStatus::Expired),
            10 => Some(SessionStatus::Invalidated),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

/// Token issued at login, embedded in its session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub jwt: String,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
}

/// Login session entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub token: SessionToken,
}

impl LoginSession {
    /// Active and not yet past its expiry
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.token.status == SessionStatus::Active && self.token.expires_at > now
    }
}

/// New session creation payload
#[derive(Debug, Clone)]
pub struct NewLoginSession {
    pub user_id: Uuid,
    pub token: SessionToken,
}
