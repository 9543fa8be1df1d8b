//! In-process store used by tests and by `STORE_BACKEND=memory`

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::error::{DatabaseError, DatabaseResult};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::CredentialStore;
use crate::models::{
    LoginSession, NewLoginSession, NewUser, PasswordResetToken, SessionStatus, UpdateUser, User,
};

#[derive(Debug, Default)]
struct Collections {
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, LoginSession>,
}

/// Store keeping both collections behind a single lock
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_user(&self, new_user: NewUser) -> DatabaseResult<User> {
        let mut inner = self.inner.write().await;

        if inner.users.values().any(|u| u.email == new_user.email) {
            return Err(DatabaseError::Conflict(format!(
                "email {} already registered",
                new_user.email
            )));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            username: None,
            password_digest: None,
            is_admin: false,
            pending_reset: new_user.pending_reset,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        debug!(user_id = %user.id, "Inserted user");

        Ok(user)
    }

    async fn count_users_by_email(&self, email: &str) -> DatabaseResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().filter(|u| u.email == email).count() as u64)
    }

    async fn find_user_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> DatabaseResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .filter(|u| u.username.as_deref() == Some(username))
            .min_by_key(|u| u.created_at)
            .cloned())
    }

    async fn find_user_by_reset_token(&self, token: &str) -> DatabaseResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.pending_reset.as_ref().is_some_and(|r| r.token == token))
            .cloned())
    }

    async fn set_pending_reset(
        &self,
        email: &str,
        reset: &PasswordResetToken,
    ) -> DatabaseResult<Option<User>> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.values_mut().find(|u| u.email == email) else {
            return Ok(None);
        };

        user.pending_reset = Some(reset.clone());
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn redeem_reset_token(
        &self,
        token: &str,
        password_digest: &str,
        username: Option<&str>,
    ) -> DatabaseResult<Option<User>> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner
            .users
            .values_mut()
            .find(|u| u.pending_reset.as_ref().is_some_and(|r| r.token == token))
        else {
            return Ok(None);
        };

        user.password_digest = Some(password_digest.to_string());
        if let Some(username) = username {
            user.username = Some(username.to_string());
        }
        user.pending_reset = None;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn set_password_digest(&self, id: Uuid, password_digest: &str) -> DatabaseResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(user) = inner.users.get_mut(&id) {
            user.password_digest = Some(password_digest.to_string());
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_user(&self, id: Uuid, update: &UpdateUser) -> DatabaseResult<Option<User>> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(username) = &update.username {
            user.username = Some(username.clone());
        }
        if let Some(is_admin) = update.is_admin {
            user.is_admin = is_admin;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> DatabaseResult<u64> {
        let mut inner = self.inner.write().await;
        Ok(inner.users.remove(&id).map_or(0, |_| 1))
    }

    async fn insert_session(&self, new_session: NewLoginSession) -> DatabaseResult<LoginSession> {
        let mut inner = self.inner.write().await;

        if inner
            .sessions
            .values()
            .any(|s| s.token.jwt == new_session.token.jwt)
        {
            return Err(DatabaseError::Conflict("token already recorded".into()));
        }

        let session = LoginSession {
            id: Uuid::new_v4(),
            user_id: new_session.user_id,
            timestamp: Utc::now(),
            token: new_session.token,
        };
        inner.sessions.insert(session.id, session.clone());

        Ok(session)
    }

    async fn find_active_session(&self, user_id: Uuid) -> DatabaseResult<Option<LoginSession>> {
        let inner = self.inner.read().await;
        Ok(inner
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.token.status == SessionStatus::Active)
            .max_by_key(|s| s.timestamp)
            .cloned())
    }

    async fn find_session_by_token(&self, jwt: &str) -> DatabaseResult<Option<LoginSession>> {
        let inner = self.inner.read().await;
        Ok(inner
            .sessions
            .values()
            .find(|s| s.token.jwt == jwt)
            .cloned())
    }

    async fn transition_session(
        &self,
        jwt: &str,
        status: SessionStatus,
    ) -> DatabaseResult<Option<LoginSession>> {
        let mut inner = self.inner.write().await;
        let Some(session) = inner.sessions.values_mut().find(|s| s.token.jwt == jwt) else {
            return Ok(None);
        };

        if session.token.status == SessionStatus::Active {
            session.token.status = status;
        }
        Ok(Some(session.clone()))
    }
}
