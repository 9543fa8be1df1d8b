//! Login token encoding and verification
//!
//! Tokens are compact JWS signed with a symmetric HMAC key. Only the HMAC
//! family is accepted on decode, expiry is checked without leeway and the
//! issuer must match the configured one.

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::{AuthError, AuthResult};

const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Claims carried by every login token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
    /// Username at login time, empty when the user has none
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    /// Unique per issued token
    pub jti: String,
}

/// Why a token was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token structure is unreadable")]
    Malformed,
    #[error("token is expired")]
    Expired,
    #[error("token signature or claims are invalid")]
    Invalid,
    #[error("token claims could not be read")]
    Unrecoverable,
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => AuthError::TokenMalformed,
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Invalid => AuthError::TokenInvalid,
            TokenError::Unrecoverable => AuthError::UnknownError,
        }
    }
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
}

impl TokenCodec {
    pub fn new(secret: &str, issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = HMAC_ALGORITHMS.to_vec();
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_issuer(&[issuer.as_str()]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign claims with HS256
    pub fn encode(&self, claims: &Claims) -> AuthResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to encode token: {e}")))
    }

    /// Verify a token and return its claims
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let header = decode_header(token).map_err(|e| {
            debug!("Unreadable token header: {}", e);
            TokenError::Malformed
        })?;

        if !HMAC_ALGORITHMS.contains(&header.alg) {
            debug!(alg = ?header.alg, "Rejected token signed with a non-HMAC algorithm");
            return Err(TokenError::Invalid);
        }

        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Token rejected: {}", e);
                match e.kind() {
                    ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => {
                        TokenError::Malformed
                    }
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    ErrorKind::Json(_) => TokenError::Unrecoverable,
                    _ => TokenError::Invalid,
                }
            })
    }
}
