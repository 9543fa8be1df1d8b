//! Error taxonomy of the authentication service
//!
//! Every variant carries a stable numeric code and an HTTP status. Responses
//! are always `{"code": .., "message": ..}`; store and internal failures are
//! logged and answered with a generic message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::DatabaseError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authorization header is missing")]
    AuthMissing,

    #[error("Not authorized")]
    NotAuthorized,

    #[error("Token is expired")]
    TokenExpired,

    #[error("Token is malformed")]
    TokenMalformed,

    #[error("Token is invalid")]
    TokenInvalid,

    #[error("Token has been invalidated")]
    TokenInvalidated,

    #[error("Token is already logged out")]
    TokenLoggedOut,

    #[error("Authorization header is empty")]
    AuthorizationMissing,

    #[error("Authorization header must start with \"Bearer \"")]
    AuthorizationInvalid,

    #[error("Unknown error during Authorization check")]
    UnknownError,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Credentials are missing")]
    CredentialsMissing,

    #[error("Too many failed login attempts, try again later")]
    TooManyAttempts,

    #[error("Email is not valid: {0}")]
    EmailInvalid(String),

    #[error("Email is already taken")]
    EmailAlreadyTaken,

    #[error("Email is missing")]
    EmailMissing,

    #[error("Password reset token not found")]
    ResetTokenNotFound,

    #[error("Password reset token is expired")]
    ResetTokenExpired,

    #[error("Email is not found")]
    EmailNotFound,

    #[error("{0}")]
    InvalidPassword(String),

    #[error("{0}")]
    InvalidUsername(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u32,
    pub message: String,
}

impl AuthError {
    /// Stable service code
    pub fn code(&self) -> u32 {
        match self {
            AuthError::AuthMissing => 10100,
            AuthError::NotAuthorized => 10101,
            AuthError::TokenExpired => 10102,
            AuthError::TokenMalformed => 10103,
            AuthError::TokenInvalid => 10104,
            AuthError::TokenInvalidated => 10105,
            AuthError::TokenLoggedOut => 10106,
            AuthError::AuthorizationMissing => 10107,
            AuthError::AuthorizationInvalid => 10108,
            AuthError::UnknownError => 10109,
            AuthError::InvalidCredentials => 10110,
            AuthError::CredentialsMissing => 10111,
            AuthError::TooManyAttempts => 10112,
            AuthError::EmailInvalid(_) => 10200,
            AuthError::EmailAlreadyTaken => 10201,
            AuthError::EmailMissing => 10202,
            AuthError::ResetTokenNotFound => 10203,
            AuthError::ResetTokenExpired => 10204,
            AuthError::EmailNotFound => 10205,
            AuthError::InvalidPassword(_) => 10206,
            AuthError::InvalidUsername(_) => 10207,
            AuthError::UserNotFound => 10208,
            AuthError::Store(_) | AuthError::Internal(_) => 10000,
        }
    }

    /// 401 when no usable credentials were supplied, 403 when they were
    /// supplied but are invalid or insufficient.
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::AuthMissing
            | AuthError::AuthorizationMissing
            | AuthError::AuthorizationInvalid => StatusCode::UNAUTHORIZED,
            AuthError::NotAuthorized
            | AuthError::TokenExpired
            | AuthError::TokenMalformed
            | AuthError::TokenInvalid
            | AuthError::TokenInvalidated
            | AuthError::TokenLoggedOut
            | AuthError::UnknownError
            | AuthError::InvalidCredentials => StatusCode::FORBIDDEN,
            AuthError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            AuthError::CredentialsMissing
            | AuthError::EmailInvalid(_)
            | AuthError::EmailAlreadyTaken
            | AuthError::EmailMissing
            | AuthError::ResetTokenExpired
            | AuthError::InvalidPassword(_)
            | AuthError::InvalidUsername(_) => StatusCode::BAD_REQUEST,
            AuthError::ResetTokenNotFound | AuthError::EmailNotFound | AuthError::UserNotFound => {
                StatusCode::NOT_FOUND
            }
            AuthError::Store(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing body; internal details never leave the process.
    pub fn body(&self) -> ErrorBody {
        let message = match self {
            AuthError::Store(_) | AuthError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            code: self.code(),
            message,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), "Request failed: {}", self);
        }

        (status, Json(self.body())).into_response()
    }
}

/// Type alias for service results
pub type AuthResult<T> = Result<T, AuthError>;
