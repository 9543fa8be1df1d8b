//! PostgreSQL-backed credential store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{debug, info};
use uuid::Uuid;

use super::CredentialStore;
use crate::models::{
    LoginSession, NewLoginSession, NewUser, PasswordResetToken, ResetPurpose, SessionStatus,
    SessionToken, UpdateUser, User,
};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const USER_COLUMNS: &str = "id, email, username, password_digest, is_admin, reset_token, \
     reset_created_at, reset_expires_at, reset_purpose, created_at, updated_at";

const SESSION_COLUMNS: &str = "id, user_id, created_at, jwt, expires_at, status";

/// Credential store over a shared connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables and indexes if they do not exist yet
    pub async fn migrate(&self) -> DatabaseResult<()> {
        info!("Applying credential store schema");
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(())
    }

    async fn fetch_user(&self, sql: &str, value: &str) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_query)?;

        row.as_ref().map(user_from_row).transpose()
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> DatabaseResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name).map_err(DatabaseError::from_query)
}

fn user_from_row(row: &PgRow) -> DatabaseResult<User> {
    let reset_token: Option<String> = column(row, "reset_token")?;
    let pending_reset = match reset_token {
        Some(token) => {
            let created_at: Option<DateTime<Utc>> = column(row, "reset_created_at")?;
            let expires_at: Option<DateTime<Utc>> = column(row, "reset_expires_at")?;
            let purpose: Option<String> = column(row, "reset_purpose")?;

            let (Some(created_at), Some(expires_at), Some(purpose)) =
                (created_at, expires_at, purpose)
            else {
                return Err(DatabaseError::Decode(
                    "reset token stored without its metadata".into(),
                ));
            };
            let purpose = ResetPurpose::parse(&purpose).ok_or_else(|| {
                DatabaseError::Decode(format!("unknown reset purpose {purpose}"))
            })?;

            Some(PasswordResetToken {
                token,
                created_at,
                expires_at,
                purpose,
            })
        }
        None => None,
    };

    Ok(User {
        id: column(row, "id")?,
        email: column(row, "email")?,
        username: column(row, "username")?,
        password_digest: column(row, "password_digest")?,
        is_admin: column(row, "is_admin")?,
        pending_reset,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn session_from_row(row: &PgRow) -> DatabaseResult<LoginSession> {
    let code: i16 = column(row, "status")?;
    let status = SessionStatus::from_code(code)
        .ok_or_else(|| DatabaseError::Decode(format!("unknown session status {code}")))?;

    Ok(LoginSession {
        id: column(row, "id")?,
        user_id: column(row, "user_id")?,
        timestamp: column(row, "created_at")?,
        token: SessionToken {
            jwt: column(row, "jwt")?,
            expires_at: column(row, "expires_at")?,
            status,
        },
    })
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn insert_user(&self, new_user: NewUser) -> DatabaseResult<User> {
        debug!("Inserting user");
        let reset = new_user.pending_reset.as_ref();

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (id, email, reset_token, reset_created_at, reset_expires_at, reset_purpose)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.email)
        .bind(reset.map(|r| r.token.as_str()))
        .bind(reset.map(|r| r.created_at))
        .bind(reset.map(|r| r.expires_at))
        .bind(reset.map(|r| r.purpose.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        user_from_row(&row)
    }

    async fn count_users_by_email(&self, email: &str) -> DatabaseResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = $1")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_query)?;

        Ok(count.max(0) as u64)
    }

    async fn find_user_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_query)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        self.fetch_user(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"),
            email,
        )
        .await
    }

    async fn find_user_by_username(&self, username: &str) -> DatabaseResult<Option<User>> {
        self.fetch_user(
            &format!(
                "SELECT {USER_COLUMNS} FROM users WHERE username = $1 ORDER BY created_at LIMIT 1"
            ),
            username,
        )
        .await
    }

    async fn find_user_by_reset_token(&self, token: &str) -> DatabaseResult<Option<User>> {
        self.fetch_user(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE reset_token = $1"),
            token,
        )
        .await
    }

    async fn set_pending_reset(
        &self,
        email: &str,
        reset: &PasswordResetToken,
    ) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET reset_token = $2, reset_created_at = $3, reset_expires_at = $4,
                reset_purpose = $5, updated_at = NOW()
            WHERE email = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(&reset.token)
        .bind(reset.created_at)
        .bind(reset.expires_at)
        .bind(reset.purpose.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn redeem_reset_token(
        &self,
        token: &str,
        password_digest: &str,
        username: Option<&str>,
    ) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET password_digest = $2, username = COALESCE($3, username),
                reset_token = NULL, reset_created_at = NULL, reset_expires_at = NULL,
                reset_purpose = NULL, updated_at = NOW()
            WHERE reset_token = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(token)
        .bind(password_digest)
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn set_password_digest(&self, id: Uuid, password_digest: &str) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET password_digest = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_digest)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_query)?;
        Ok(())
    }

    async fn update_user(&self, id: Uuid, update: &UpdateUser) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username), is_admin = COALESCE($3, is_admin),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.username.as_deref())
        .bind(update.is_admin)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn delete_user(&self, id: Uuid) -> DatabaseResult<u64> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_query)?;

        Ok(result.rows_affected())
    }

    async fn insert_session(&self, new_session: NewLoginSession) -> DatabaseResult<LoginSession> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO login_sessions (id, user_id, jwt, expires_at, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new_session.user_id)
        .bind(&new_session.token.jwt)
        .bind(new_session.token.expires_at)
        .bind(new_session.token.status.code())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        session_from_row(&row)
    }

    async fn find_active_session(&self, user_id: Uuid) -> DatabaseResult<Option<LoginSession>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM login_sessions
            WHERE user_id = $1 AND status = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .bind(SessionStatus::Active.code())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn find_session_by_token(&self, jwt: &str) -> DatabaseResult<Option<LoginSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM login_sessions WHERE jwt = $1"
        ))
        .bind(jwt)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn transition_session(
        &self,
        jwt: &str,
        status: SessionStatus,
    ) -> DatabaseResult<Option<LoginSession>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE login_sessions
            SET status = CASE WHEN status = $3 THEN $2 ELSE status END
            WHERE jwt = $1
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(jwt)
        .bind(status.code())
        .bind(SessionStatus::Active.code())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        row.as_ref().map(session_from_row).transpose()
    }
}
