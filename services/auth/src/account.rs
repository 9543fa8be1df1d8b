//! Registration, password reset and user detail flows

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::MAX_TOKEN_TTL,
    error::{AuthError, AuthResult},
    jwt::Claims,
    mailer::{Mailer, OutgoingEmail},
    models::{NewUser, PasswordResetToken, ResetPurpose, UpdateUser, User},
    password::PasswordHasher,
    repositories::CredentialStore,
    validation::{validate_email, validate_password, validate_username},
};

/// `requestType` of a forgotten password request
pub const REQUEST_PASSWORD_RESET: u8 = 0;
/// `requestType` of an account registration
pub const REQUEST_NEW_ACCOUNT: u8 = 1;

/// Body of `/register` and `/password/request`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PasswordRequest {
    #[serde(default)]
    pub email: String,
    #[serde(rename = "redirectURL", default)]
    pub redirect_url: Option<String>,
    #[serde(rename = "requestType", default)]
    pub request_type: Option<u8>,
}

/// Body of `/password/update`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PasswordUpdate {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
    /// Only applied when activating a new account
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    mailer: Arc<dyn Mailer>,
    reset_ttl: chrono::Duration,
    client_domain: String,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
        mailer: Arc<dyn Mailer>,
        reset_ttl: std::time::Duration,
        client_domain: impl Into<String>,
    ) -> AuthResult<Self> {
        if reset_ttl > MAX_TOKEN_TTL {
            return Err(AuthError::Internal("Reset token TTL out of range".to_string()));
        }
        let reset_ttl = chrono::Duration::from_std(reset_ttl)
            .map_err(|e| AuthError::Internal(format!("Reset token TTL out of range: {e}")))?;

        Ok(Self {
            store,
            hasher,
            mailer,
            reset_ttl,
            client_domain: client_domain.into(),
        })
    }

    /// Issue a reset token, creating the account for new account requests,
    /// and mail its link to the user
    pub async fn request_password(&self, request: PasswordRequest) -> AuthResult<()> {
        let email = request.email.trim();
        validate_email(email)?;

        let purpose = match request.request_type.unwrap_or(REQUEST_PASSWORD_RESET) {
            REQUEST_NEW_ACCOUNT => ResetPurpose::NewAccount,
            _ => ResetPurpose::PasswordReset,
        };
        let reset = PasswordResetToken::generate(purpose, self.reset_ttl);

        match purpose {
            ResetPurpose::NewAccount => {
                if self.store.count_users_by_email(email).await? > 0 {
                    return Err(AuthError::EmailAlreadyTaken);
                }

                let user = self
                    .store
                    .insert_user(NewUser {
                        email: email.to_string(),
                        pending_reset: Some(reset.clone()),
                    })
                    .await
                    .map_err(|e| {
                        if e.is_conflict() {
                            AuthError::EmailAlreadyTaken
                        } else {
                            AuthError::Store(e)
                        }
                    })?;
                info!(user_id = %user.id, "Registered new account");
            }
            ResetPurpose::PasswordReset => {
                let user = self
                    .store
                    .set_pending_reset(email, &reset)
                    .await?
                    .ok_or(AuthError::EmailNotFound)?;
                info!(user_id = %user.id, "Password reset requested");
            }
        }

        let link = match request.redirect_url.as_deref().filter(|u| !u.is_empty()) {
            Some(redirect) => format!("{redirect}{}", reset.token),
            None => format!("{}/user/password/?t={}", self.client_domain, reset.token),
        };
        let subject = match purpose {
            ResetPurpose::NewAccount => format!("Welcome to {}", self.client_domain),
            ResetPurpose::PasswordReset => "Reset your password".to_string(),
        };
        self.send_later(OutgoingEmail {
            to: email.to_string(),
            subject,
            body: format!("Follow this link to set your password: {link}"),
        });

        Ok(())
    }

    fn send_later(&self, email: OutgoingEmail) {
        let mailer = Arc::clone(&self.mailer);
        tokio::spawn(async move {
            if let Err(e) = mailer.send(email).await {
                warn!("Failed to send email: {:#}", e);
            }
        });
    }

    /// Redeem a reset token and set the new password
    pub async fn update_password(&self, update: PasswordUpdate) -> AuthResult<()> {
        let user = self
            .store
            .find_user_by_reset_token(&update.token)
            .await?
            .ok_or(AuthError::ResetTokenNotFound)?;
        let reset = user
            .pending_reset
            .as_ref()
            .ok_or(AuthError::ResetTokenNotFound)?;

        if reset.is_expired_at(Utc::now()) {
            return Err(AuthError::ResetTokenExpired);
        }

        validate_password(&update.password)?;

        let username = match (reset.purpose, update.username.as_deref()) {
            (ResetPurpose::NewAccount, Some(username)) if !username.is_empty() => {
                validate_username(username)?;
                Some(username)
            }
            _ => None,
        };

        let digest = self.hasher.hash(&update.password)?;
        let user = self
            .store
            .redeem_reset_token(&update.token, &digest, username)
            .await?
            .ok_or(AuthError::ResetTokenNotFound)?;
        info!(user_id = %user.id, "Password updated");

        Ok(())
    }

    pub async fn get_user(&self, user_id: &str) -> AuthResult<User> {
        let id = parse_user_id(user_id)?;
        self.store
            .find_user_by_id(id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Apply `update` to a user; only admins may change the admin flag
    pub async fn update_user(
        &self,
        user_id: &str,
        mut update: UpdateUser,
        caller: &Claims,
    ) -> AuthResult<User> {
        let current = self.get_user(user_id).await?;

        if update.is_admin.is_some_and(|flag| flag != current.is_admin) && !caller.is_admin {
            return Err(AuthError::NotAuthorized);
        }
        if update.username.as_deref().is_some_and(str::is_empty) {
            update.username = None;
        }
        if let Some(username) = &update.username {
            validate_username(username)?;
        }

        self.store
            .update_user(current.id, &update)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Delete a user record; its login sessions are kept
    pub async fn delete_user(&self, user_id: &str) -> AuthResult<()> {
        let id = parse_user_id(user_id)?;
        match self.store.delete_user(id).await? {
            0 => Err(AuthError::UserNotFound),
            _ => {
                info!(user_id = %id, "Deleted user");
                Ok(())
            }
        }
    }
}

fn parse_user_id(user_id: &str) -> AuthResult<Uuid> {
    Uuid::parse_str(user_id).map_err(|_| AuthError::UserNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct ChannelMailer(mpsc::UnboundedSender<OutgoingEmail>);

    #[async_trait]
    impl Mailer for ChannelMailer {
        async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
            self.0.send(email)?;
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        accounts: AccountService,
        outbox: mpsc::UnboundedReceiver<OutgoingEmail>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let (tx, outbox) = mpsc::unbounded_channel();
        let accounts = AccountService::new(
            store.clone(),
            PasswordHasher::new("test-pepper"),
            Arc::new(ChannelMailer(tx)),
            Duration::from_secs(600),
            "http://memo.test",
        )
        .unwrap();

        Fixture {
            store,
            accounts,
            outbox,
        }
    }

    fn register(email: &str) -> PasswordRequest {
        PasswordRequest {
            email: email.to_string(),
            redirect_url: None,
            request_type: Some(REQUEST_NEW_ACCOUNT),
        }
    }

    fn caller(is_admin: bool) -> Claims {
        Claims {
            user_id: Uuid::new_v4().to_string(),
            is_admin,
            sub: String::new(),
            iat: 0,
            exp: 0,
            iss: String::new(),
            jti: String::new(),
        }
    }

    async fn reset_token_of(store: &MemoryStore, email: &str) -> PasswordResetToken {
        store
            .find_user_by_email(email)
            .await
            .unwrap()
            .unwrap()
            .pending_reset
            .unwrap()
    }

    #[test]
    fn test_oversized_reset_ttl_is_refused() {
        let (tx, _outbox) = mpsc::unbounded_channel();
        let result = AccountService::new(
            Arc::new(MemoryStore::new()),
            PasswordHasher::new("test-pepper"),
            Arc::new(ChannelMailer(tx)),
            Duration::from_secs(9_000_000_000_000),
            "http://memo.test",
        );
        assert!(matches!(result, Err(AuthError::Internal(_))));
    }

    #[tokio::test]
    async fn test_registration_mails_default_link() {
        let mut fx = fixture();
        fx.accounts.request_password(register("a@test.com")).await.unwrap();

        let reset = reset_token_of(&fx.store, "a@test.com").await;
        assert_eq!(reset.purpose, ResetPurpose::NewAccount);

        let email = tokio::time::timeout(Duration::from_secs(1), fx.outbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(email.to, "a@test.com");
        assert!(
            email
                .body
                .contains(&format!("http://memo.test/user/password/?t={}", reset.token))
        );
    }

    #[tokio::test]
    async fn test_redirect_url_prefixes_token() {
        let mut fx = fixture();
        fx.accounts
            .request_password(PasswordRequest {
                redirect_url: Some("http://whatever-url.com?t=".into()),
                ..register("a@test.com")
            })
            .await
            .unwrap();

        let reset = reset_token_of(&fx.store, "a@test.com").await;
        let email = tokio::time::timeout(Duration::from_secs(1), fx.outbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(
            email
                .body
                .contains(&format!("http://whatever-url.com?t={}", reset.token))
        );
    }

    #[tokio::test]
    async fn test_registration_errors() {
        let fx = fixture();
        fx.accounts.request_password(register("a@test.com")).await.unwrap();

        let err = fx.accounts.request_password(register("a@test.com")).await.unwrap_err();
        assert!(matches!(err, AuthError::EmailAlreadyTaken));

        let err = fx.accounts.request_password(register("")).await.unwrap_err();
        assert!(matches!(err, AuthError::EmailMissing));

        let err = fx.accounts.request_password(register("nope")).await.unwrap_err();
        assert!(matches!(err, AuthError::EmailInvalid(_)));
    }

    #[tokio::test]
    async fn test_reset_requires_known_email() {
        let fx = fixture();
        let err = fx
            .accounts
            .request_password(PasswordRequest {
                email: "nobody@test.com".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailNotFound));
    }

    #[tokio::test]
    async fn test_activation_sets_password_and_username() {
        let fx = fixture();
        fx.accounts.request_password(register("a@test.com")).await.unwrap();
        let reset = reset_token_of(&fx.store, "a@test.com").await;

        fx.accounts
            .update_password(PasswordUpdate {
                token: reset.token.clone(),
                password: "Secret123".into(),
                username: Some("Pouet".into()),
            })
            .await
            .unwrap();

        let user = fx.store.find_user_by_email("a@test.com").await.unwrap().unwrap();
        assert_eq!(user.username.as_deref(), Some("Pouet"));
        assert!(user.password_digest.is_some());
        assert!(user.pending_reset.is_none());

        let err = fx
            .accounts
            .update_password(PasswordUpdate {
                token: reset.token,
                password: "Secret123".into(),
                username: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ResetTokenNotFound));
    }

    #[tokio::test]
    async fn test_reset_ignores_username() {
        let fx = fixture();
        fx.accounts.request_password(register("a@test.com")).await.unwrap();
        fx.accounts
            .request_password(PasswordRequest {
                email: "a@test.com".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let reset = reset_token_of(&fx.store, "a@test.com").await;
        assert_eq!(reset.purpose, ResetPurpose::PasswordReset);

        fx.accounts
            .update_password(PasswordUpdate {
                token: reset.token,
                password: "Secret123".into(),
                username: Some("Pouet".into()),
            })
            .await
            .unwrap();

        let user = fx.store.find_user_by_email("a@test.com").await.unwrap().unwrap();
        assert!(user.username.is_none());
    }

    #[tokio::test]
    async fn test_update_password_rejections() {
        let fx = fixture();
        fx.store
            .insert_user(NewUser {
                email: "a@test.com".into(),
                pending_reset: Some(PasswordResetToken::generate(
                    ResetPurpose::NewAccount,
                    chrono::Duration::seconds(-1),
                )),
            })
            .await
            .unwrap();
        let expired = reset_token_of(&fx.store, "a@test.com").await;

        let err = fx
            .accounts
            .update_password(PasswordUpdate {
                token: expired.token,
                password: "Secret123".into(),
                username: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ResetTokenExpired));

        fx.accounts.request_password(register("b@test.com")).await.unwrap();
        let fresh = reset_token_of(&fx.store, "b@test.com").await;

        let err = fx
            .accounts
            .update_password(PasswordUpdate {
                token: fresh.token.clone(),
                password: "weak".into(),
                username: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidPassword(_)));

        let err = fx
            .accounts
            .update_password(PasswordUpdate {
                token: fresh.token,
                password: "Secret123".into(),
                username: Some("no spaces allowed".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidUsername(_)));

        let err = fx
            .accounts
            .update_password(PasswordUpdate {
                token: "unknown".into(),
                password: "Secret123".into(),
                username: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ResetTokenNotFound));
    }

    #[tokio::test]
    async fn test_only_admins_change_admin_flag() {
        let fx = fixture();
        fx.accounts.request_password(register("a@test.com")).await.unwrap();
        let user = fx.store.find_user_by_email("a@test.com").await.unwrap().unwrap();
        let id = user.id.to_string();

        let promote = UpdateUser {
            username: None,
            is_admin: Some(true),
        };
        let err = fx
            .accounts
            .update_user(&id, promote.clone(), &caller(false))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotAuthorized));

        let updated = fx
            .accounts
            .update_user(&id, promote, &caller(true))
            .await
            .unwrap();
        assert!(updated.is_admin);

        let renamed = fx
            .accounts
            .update_user(
                &id,
                UpdateUser {
                    username: Some("Pouet".into()),
                    is_admin: Some(true),
                },
                &caller(false),
            )
            .await
            .unwrap();
        assert_eq!(renamed.username.as_deref(), Some("Pouet"));
    }

    #[tokio::test]
    async fn test_user_detail_not_found() {
        let fx = fixture();
        assert!(matches!(
            fx.accounts.get_user("not-a-uuid").await,
            Err(AuthError::UserNotFound)
        ));
        assert!(matches!(
            fx.accounts.delete_user(&Uuid::new_v4().to_string()).await,
            Err(AuthError::UserNotFound)
        ));

        fx.accounts.request_password(register("a@test.com")).await.unwrap();
        let user = fx.store.find_user_by_email("a@test.com").await.unwrap().unwrap();
        fx.accounts.delete_user(&user.id.to_string()).await.unwrap();
        assert!(matches!(
            fx.accounts.get_user(&user.id.to_string()).await,
            Err(AuthError::UserNotFound)
        ));
    }
}
