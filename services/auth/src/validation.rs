//! Input validation for account fields

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{AuthError, AuthResult};

const EMAIL_MAX_LEN: usize = 254;
const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;
const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 8..=128;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("email pattern compiles")
});

static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("username pattern compiles"));

/// Validate an email, distinguishing a missing one from a malformed one
pub fn validate_email(email: &str) -> AuthResult<()> {
    if email.trim().is_empty() {
        return Err(AuthError::EmailMissing);
    }

    if email.len() > EMAIL_MAX_LEN {
        return Err(AuthError::EmailInvalid(format!(
            "must be at most {EMAIL_MAX_LEN} characters long"
        )));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err(AuthError::EmailInvalid(email.to_string()));
    }

    Ok(())
}

pub fn validate_username(username: &str) -> AuthResult<()> {
    let invalid = |msg: &str| Err(AuthError::InvalidUsername(msg.to_string()));

    if username.is_empty() {
        return invalid("Username is required");
    }

    if !USERNAME_LEN.contains(&username.chars().count()) {
        return invalid("Username must be between 3 and 32 characters long");
    }

    if !USERNAME_REGEX.is_match(username) {
        return invalid("Username can only contain letters, numbers, and underscores");
    }

    Ok(())
}

pub fn validate_password(password: &str) -> AuthResult<()> {
    let invalid = |msg: &str| Err(AuthError::InvalidPassword(msg.to_string()));

    if password.is_empty() {
        return invalid("Password is required");
    }

    if !PASSWORD_LEN.contains(&password.chars().count()) {
        return invalid("Password must be between 8 and 128 characters long");
    }

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return invalid("Password must contain at least one uppercase letter");
    }

    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return invalid("Password must contain at least one lowercase letter");
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return invalid("Password must contain at least one digit");
    }

    Ok(())
}
