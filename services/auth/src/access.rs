//! Bearer token gate for protected routes
//!
//! A gated request passes four checks in order: a well-formed
//! `Authorization: Bearer` header, a token that verifies, a persisted session
//! that is still active, and the route's [`AccessPredicate`]. The first
//! failing check answers the request.

use std::collections::HashMap;

use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::{
    error::{AuthError, AuthResult},
    jwt::{Claims, TokenCodec, TokenError},
    models::SessionStatus,
    session::SessionLifecycle,
};

const BEARER_PREFIX: &str = "Bearer ";

/// Path parameter naming the user a route acts on
pub const TARGET_USER_PARAM: &str = "user_id";

/// Raw token of an authorized request, available to handlers as an extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

/// Authorization rule evaluated once the token is known to be valid and live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPredicate {
    AlwaysAllow,
    RequireLoggedIn,
    RequireAdmin,
    /// The caller is the user named by the route, or an admin
    RequireSelfOrAdmin,
}

impl AccessPredicate {
    pub fn allows(&self, claims: &Claims, target_user_id: Option<&str>) -> bool {
        match self {
            AccessPredicate::AlwaysAllow => true,
            AccessPredicate::RequireLoggedIn => !claims.user_id.is_empty(),
            AccessPredicate::RequireAdmin => claims.is_admin,
            AccessPredicate::RequireSelfOrAdmin => {
                claims.is_admin || target_user_id.is_some_and(|target| target == claims.user_id)
            }
        }
    }
}

/// Token from the `Authorization` header
pub fn bearer_token(headers: &HeaderMap) -> AuthResult<&str> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthError::AuthMissing)?;
    if value.is_empty() {
        return Err(AuthError::AuthorizationMissing);
    }

    value
        .to_str()
        .ok()
        .and_then(|header| header.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .ok_or(AuthError::AuthorizationInvalid)
}

#[derive(Clone)]
pub struct AccessGate {
    codec: TokenCodec,
    lifecycle: SessionLifecycle,
    predicate: AccessPredicate,
}

impl AccessGate {
    pub fn new(codec: TokenCodec, lifecycle: SessionLifecycle, predicate: AccessPredicate) -> Self {
        Self {
            codec,
            lifecycle,
            predicate,
        }
    }

    /// Run every check against a request and return its claims and token
    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        target_user_id: Option<&str>,
    ) -> AuthResult<(Claims, BearerToken)> {
        let token = bearer_token(headers)?;

        let claims = match self.codec.decode(token) {
            Ok(claims) => claims,
            Err(TokenError::Expired) => {
                self.mark_expired(token).await;
                return Err(AuthError::TokenExpired);
            }
            Err(e) => return Err(e.into()),
        };

        self.lifecycle.ensure_live(token).await?;

        if !self.predicate.allows(&claims, target_user_id) {
            debug!(
                user_id = %claims.user_id,
                predicate = ?self.predicate,
                "Access denied"
            );
            return Err(AuthError::NotAuthorized);
        }

        Ok((claims, BearerToken(token.to_string())))
    }

    async fn mark_expired(&self, token: &str) {
        if let Err(e) = self.lifecycle.invalidate(token, SessionStatus::Expired).await {
            warn!("Failed to mark expired session: {}", e);
        }
    }
}

/// Middleware guarding a route with the gate held in its state
pub async fn require_access(
    State(gate): State<AccessGate>,
    params: Option<Path<HashMap<String, String>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let target = params
        .as_ref()
        .and_then(|Path(params)| params.get(TARGET_USER_PARAM))
        .map(String::as_str);

    let (claims, token) = gate.authorize(req.headers(), target).await?;

    req.extensions_mut().insert(claims);
    req.extensions_mut().insert(token);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewLoginSession, SessionToken};
    use crate::repositories::{CredentialStore, MemoryStore};
    use axum::http::HeaderValue;
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn claims(user_id: &str, is_admin: bool) -> Claims {
        Claims {
            user_id: user_id.to_string(),
            is_admin,
            sub: String::new(),
            iat: 0,
            exp: 0,
            iss: String::new(),
            jti: String::new(),
        }
    }

    fn headers(value: &'static [u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_bytes(value).unwrap());
        headers
    }

    #[test]
    fn test_self_or_admin_matrix() {
        let predicate = AccessPredicate::RequireSelfOrAdmin;
        let me = "6f9619ff-8b86-d011-b42d-00cf4fc964ff";
        let other = "0b7f2c9e-3a51-4f0e-8d1c-5e6a7b8c9d0e";

        assert!(predicate.allows(&claims(me, false), Some(me)));
        assert!(predicate.allows(&claims(me, true), Some(me)));
        assert!(predicate.allows(&claims(me, true), Some(other)));
        assert!(!predicate.allows(&claims(me, false), Some(other)));
        assert!(!predicate.allows(&claims(me, false), None));
    }

    #[test]
    fn test_other_predicates() {
        let user = claims("6f9619ff-8b86-d011-b42d-00cf4fc964ff", false);
        let admin = claims("6f9619ff-8b86-d011-b42d-00cf4fc964ff", true);

        assert!(AccessPredicate::AlwaysAllow.allows(&claims("", false), None));
        assert!(AccessPredicate::RequireLoggedIn.allows(&user, None));
        assert!(!AccessPredicate::RequireLoggedIn.allows(&claims("", false), None));
        assert!(!AccessPredicate::RequireAdmin.allows(&user, None));
        assert!(AccessPredicate::RequireAdmin.allows(&admin, None));
    }

    #[test]
    fn test_bearer_extraction() {
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::AuthMissing)
        ));
        assert!(matches!(
            bearer_token(&headers(b"")),
            Err(AuthError::AuthorizationMissing)
        ));
        assert!(matches!(
            bearer_token(&headers(b"Basic abc")),
            Err(AuthError::AuthorizationInvalid)
        ));
        assert!(matches!(
            bearer_token(&headers(b"bearer abc")),
            Err(AuthError::AuthorizationInvalid)
        ));
        assert!(matches!(
            bearer_token(&headers(b"Bearer \xffabc")),
            Err(AuthError::AuthorizationInvalid)
        ));
        assert_eq!(bearer_token(&headers(b"Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        codec: TokenCodec,
        lifecycle: SessionLifecycle,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        Fixture {
            codec: TokenCodec::new("test-secret", "memoboard-test"),
            lifecycle: SessionLifecycle::new(store.clone()),
            store,
        }
    }

    async fn issue(fx: &Fixture, exp_offset: i64) -> (Claims, String) {
        let now = Utc::now();
        let user_id = Uuid::new_v4();
        let claims = Claims {
            user_id: user_id.to_string(),
            is_admin: false,
            sub: "Pouet".into(),
            iat: now.timestamp(),
            exp: now.timestamp() + exp_offset,
            iss: "memoboard-test".into(),
            jti: Uuid::new_v4().to_string(),
        };
        let jwt = fx.codec.encode(&claims).unwrap();
        fx.store
            .insert_session(NewLoginSession {
                user_id,
                token: SessionToken {
                    jwt: jwt.clone(),
                    expires_at: now + chrono::Duration::seconds(exp_offset),
                    status: SessionStatus::Active,
                },
            })
            .await
            .unwrap();
        (claims, jwt)
    }

    fn bearer(jwt: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {jwt}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_live_token_is_authorized() {
        let fx = fixture();
        let gate = AccessGate::new(
            fx.codec.clone(),
            fx.lifecycle.clone(),
            AccessPredicate::RequireSelfOrAdmin,
        );
        let (claims, jwt) = issue(&fx, 3600).await;

        let (seen, token) = gate
            .authorize(&bearer(&jwt), Some(&claims.user_id))
            .await
            .unwrap();
        assert_eq!(seen, claims);
        assert_eq!(token, BearerToken(jwt.clone()));

        let err = gate
            .authorize(&bearer(&jwt), Some("someone-else"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotAuthorized));
    }

    #[tokio::test]
    async fn test_expired_token_marks_session() {
        let fx = fixture();
        let gate = AccessGate::new(
            fx.codec.clone(),
            fx.lifecycle.clone(),
            AccessPredicate::AlwaysAllow,
        );
        let (_, jwt) = issue(&fx, -60).await;

        let err = gate.authorize(&bearer(&jwt), None).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));

        let session = fx.lifecycle.find_by_token(&jwt).await.unwrap().unwrap();
        assert_eq!(session.token.status, SessionStatus::Expired);
    }

    #[tokio::test]
    async fn test_logged_out_token_is_refused() {
        let fx = fixture();
        let gate = AccessGate::new(
            fx.codec.clone(),
            fx.lifecycle.clone(),
            AccessPredicate::RequireLoggedIn,
        );
        let (_, jwt) = issue(&fx, 3600).await;
        fx.lifecycle
            .invalidate(&jwt, SessionStatus::LoggedOut)
            .await
            .unwrap();

        assert!(fx.codec.decode(&jwt).is_ok());
        let err = gate.authorize(&bearer(&jwt), None).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenLoggedOut));
    }

    #[tokio::test]
    async fn test_valid_token_without_session_is_invalidated() {
        let fx = fixture();
        let gate = AccessGate::new(
            fx.codec.clone(),
            fx.lifecycle.clone(),
            AccessPredicate::AlwaysAllow,
        );
        let (claims, _) = issue(&fx, 3600).await;
        let unrecorded = fx
            .codec
            .encode(&Claims {
                jti: Uuid::new_v4().to_string(),
                ..claims
            })
            .unwrap();

        let err = gate.authorize(&bearer(&unrecorded), None).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalidated));
    }

    #[tokio::test]
    async fn test_garbage_token_is_malformed() {
        let fx = fixture();
        let gate = AccessGate::new(fx.codec.clone(), fx.lifecycle.clone(), AccessPredicate::AlwaysAllow);

        let err = gate.authorize(&bearer("garbage"), None).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenMalformed));
    }
}
