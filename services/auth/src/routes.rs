//! HTTP routes of the authentication service

use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, info};

use crate::{
    AppState,
    access::{AccessPredicate, BearerToken, require_access},
    account::{PasswordRequest, PasswordUpdate, REQUEST_NEW_ACCOUNT},
    config::LoginIdentifier,
    error::{AuthError, AuthResult},
    jwt::Claims,
    login::SuccessfulLogin,
    models::{UpdateUser, User},
};

/// Body of a login request
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let logged_in = Router::new()
        .route("/logout", post(logout))
        .route_layer(from_fn_with_state(
            state.gate(AccessPredicate::RequireLoggedIn),
            require_access,
        ));

    let self_or_admin = Router::new()
        .route(
            "/detail/:user_id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route_layer(from_fn_with_state(
            state.gate(AccessPredicate::RequireSelfOrAdmin),
            require_access,
        ));

    let users = Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/password/request", post(request_password))
        .route("/password/update", post(update_password))
        .merge(logged_in)
        .merge(self_or_admin);

    Router::new()
        .route("/health", get(health_check))
        .nest("/v1/users", users)
        .with_state(state)
}

/// Malformed or absent bodies read as empty, so that field checks answer
fn json_or_default<T: DeserializeOwned + Default>(body: &Bytes) -> T {
    serde_json::from_slice(body).unwrap_or_else(|e| {
        if !body.is_empty() {
            debug!("Unreadable request body: {}", e);
        }
        T::default()
    })
}

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "auth"
    }))
}

/// Credentials come from the JSON body, or from HTTP Basic auth when the body has none
pub async fn login(
    State(state): State<AppState>,
    basic: Option<TypedHeader<Authorization<Basic>>>,
    body: Bytes,
) -> AuthResult<Json<SuccessfulLogin>> {
    let request: LoginRequest = json_or_default(&body);
    let identifier = match state.config.login_identifier {
        LoginIdentifier::Email => request.email,
        LoginIdentifier::Username => request.username,
    };

    let (identifier, password) = if !identifier.is_empty() && !request.password.is_empty() {
        (identifier, request.password)
    } else if let Some(TypedHeader(Authorization(basic))) = basic {
        (basic.username().to_string(), basic.password().to_string())
    } else {
        return Err(AuthError::CredentialsMissing);
    };

    if identifier.is_empty() || password.is_empty() {
        return Err(AuthError::CredentialsMissing);
    }

    let login = state.logins.authenticate(&identifier, &password).await?;
    Ok(Json(login))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> AuthResult<StatusCode> {
    state.logins.logout(&token).await?;
    info!(user_id = %claims.user_id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn register(State(state): State<AppState>, body: Bytes) -> AuthResult<StatusCode> {
    let mut request: PasswordRequest = json_or_default(&body);
    request.request_type.get_or_insert(REQUEST_NEW_ACCOUNT);

    state.accounts.request_password(request).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn request_password(
    State(state): State<AppState>,
    body: Bytes,
) -> AuthResult<StatusCode> {
    state.accounts.request_password(json_or_default(&body)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_password(
    State(state): State<AppState>,
    body: Bytes,
) -> AuthResult<StatusCode> {
    let update: PasswordUpdate = json_or_default(&body);
    state.accounts.update_password(update).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AuthResult<Json<User>> {
    Ok(Json(state.accounts.get_user(&user_id).await?))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(claims): Extension<Claims>,
    body: Bytes,
) -> AuthResult<Json<User>> {
    let update: UpdateUser = json_or_default(&body);
    Ok(Json(
        state.accounts.update_user(&user_id, update, &claims).await?,
    ))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AuthResult<StatusCode> {
    state.accounts.delete_user(&user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
