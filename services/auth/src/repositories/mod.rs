//! Persistence boundary of the authentication service
//!
//! The service only needs equality lookups and single-record writes over two
//! collections, users and login sessions. [`CredentialStore`] is that
//! contract; [`MemoryStore`] and [`PgStore`] implement it.

use async_trait::async_trait;
use common::error::DatabaseResult;
use uuid::Uuid;

use crate::models::{
    LoginSession, NewLoginSession, NewUser, PasswordResetToken, SessionStatus, UpdateUser, User,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a user. A duplicate email yields `DatabaseError::Conflict`.
    async fn insert_user(&self, new_user: NewUser) -> DatabaseResult<User>;

    async fn count_users_by_email(&self, email: &str) -> DatabaseResult<u64>;

    async fn find_user_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> DatabaseResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> DatabaseResult<Option<User>>;

    async fn find_user_by_reset_token(&self, token: &str) -> DatabaseResult<Option<User>>;

    /// Replace the pending reset token of the user owning `email`
    async fn set_pending_reset(
        &self,
        email: &str,
        reset: &PasswordResetToken,
    ) -> DatabaseResult<Option<User>>;

    /// Store the new digest (and username when given) and clear the pending
    /// token, in one write, provided `token` is still the pending one.
    async fn redeem_reset_token(
        &self,
        token: &str,
        password_digest: &str,
        username: Option<&str>,
    ) -> DatabaseResult<Option<User>>;

    async fn set_password_digest(&self, id: Uuid, password_digest: &str) -> DatabaseResult<()>;

    async fn update_user(&self, id: Uuid, update: &UpdateUser) -> DatabaseResult<Option<User>>;

    /// Delete a user and return the number of removed records. Sessions are left untouched.
    async fn delete_user(&self, id: Uuid) -> DatabaseResult<u64>;

    async fn insert_session(&self, new_session: NewLoginSession) -> DatabaseResult<LoginSession>;

    /// Most recent session of the user whose status is `Active`, expired or not
    async fn find_active_session(&self, user_id: Uuid) -> DatabaseResult<Option<LoginSession>>;

    async fn find_session_by_token(&self, jwt: &str) -> DatabaseResult<Option<LoginSession>>;

    /// Move the session owning `jwt` to `status` if it is still `Active`.
    ///
    /// Returns the record as it stands after the call: updated when the
    /// transition applied, unchanged when the session was already terminal,
    /// `None` when no session owns the token.
    async fn transition_session(
        &self,
        jwt: &str,
        status: SessionStatus,
    ) -> DatabaseResult<Option<LoginSession>>;
}
