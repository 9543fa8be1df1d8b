//! Login session lifecycle backed by the credential store

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AuthError, AuthResult},
    models::{LoginSession, SessionStatus},
    repositories::CredentialStore,
};

/// Status transitions and liveness checks of login sessions
#[derive(Clone)]
pub struct SessionLifecycle {
    store: Arc<dyn CredentialStore>,
}

impl SessionLifecycle {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Move the session owning `jwt` to a terminal `status`
    ///
    /// Sessions already terminal keep their status. `Active` is not a valid target.
    pub async fn invalidate(
        &self,
        jwt: &str,
        status: SessionStatus,
    ) -> AuthResult<Option<LoginSession>> {
        if !status.is_terminal() {
            warn!("Refusing to move a session back to Active");
            return Ok(self.store.find_session_by_token(jwt).await?);
        }

        let session = self.store.transition_session(jwt, status).await?;
        if let Some(session) = &session {
            info!(
                session_id = %session.id,
                user_id = %session.user_id,
                status = ?session.token.status,
                "Session transitioned"
            );
        }

        Ok(session)
    }

    pub async fn find_active_session(&self, user_id: Uuid) -> AuthResult<Option<LoginSession>> {
        Ok(self.store.find_active_session(user_id).await?)
    }

    pub async fn find_by_token(&self, jwt: &str) -> AuthResult<Option<LoginSession>> {
        Ok(self.store.find_session_by_token(jwt).await?)
    }

    /// The persisted session of `jwt`, provided it is still `Active`
    pub async fn ensure_live(&self, jwt: &str) -> AuthResult<LoginSession> {
        let session = self
            .store
            .find_session_by_token(jwt)
            .await?
            .ok_or(AuthError::TokenInvalidated)?;

        match session.token.status {
            SessionStatus::Active => Ok(session),
            SessionStatus::LoggedOut => Err(AuthError::TokenLoggedOut),
            SessionStatus::Expired => Err(AuthError::TokenExpired),
            SessionStatus::Invalidated => Err(AuthError::TokenInvalidated),
        }
    }
}
