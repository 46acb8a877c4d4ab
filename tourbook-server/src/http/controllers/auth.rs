//! Signup, login, logout and password management

use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tourbook_core::user::{digest_reset_token, validate_password, ResetToken};
use tourbook_core::{User, UserInput};

use crate::auth::{password, CurrentUser};
use crate::db::repos::UserRepo;
use crate::http::controller::{Controller, Route, Verb};
use crate::http::envelope::{Envelope, ForCookie};
use crate::http::error::ApiError;
use crate::http::extractors::JsonBody;
use crate::mail::password_reset_email;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

/// Signup answer: the new user plus its session token.
#[derive(Debug, Serialize)]
pub struct UserWithToken {
    #[serde(flatten)]
    pub user: User,
    pub token: String,
}

/// Wrap `payload` so the response also sets a session cookie for `user`.
fn with_session<T>(
    state: &AppState,
    user: &User,
    payload: impl FnOnce(String) -> T,
) -> Result<ForCookie<T>, ApiError> {
    let token = state.keys().issue(user.id, user.role)?;
    Ok(ForCookie::new(
        payload(token.clone()),
        token,
        state.keys().lifetime(),
        state.secure_cookies(),
    ))
}

/// POST /signup
async fn signup(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<UserInput>,
) -> Result<ForCookie<UserWithToken>, ApiError> {
    let new_user = input.into_signup()?;
    let hash = password::hash(new_user.password.clone()).await?;
    let user = UserRepo::new(state.pool()).create(&new_user, &hash).await?;
    tracing::info!(user = %user.id, "user signed up");

    with_session(&state, &user, |token| UserWithToken {
        user: user.clone(),
        token,
    })
}

/// POST /login
async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> Result<ForCookie<String>, ApiError> {
    let (email, candidate) = match (body.email, body.password) {
        (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
            (email.trim().to_lowercase(), password)
        }
        _ => {
            return Err(ApiError::bad_request(
                "Please provide correct email address and password",
            ))
        }
    };

    let incorrect = || ApiError::unauthorized("Incorrect email or password");
    let credentials = UserRepo::new(state.pool())
        .find_by_email_with_password(&email)
        .await?
        .ok_or_else(incorrect)?;
    if !password::verify(candidate, credentials.password_hash).await? {
        tracing::debug!(user = %credentials.user.id, "login rejected");
        return Err(incorrect());
    }

    with_session(&state, &credentials.user, |token| token)
}

/// GET /logout
async fn logout() -> ForCookie<String> {
    ForCookie::logout()
}

/// POST /forgot-password
async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ForgotPasswordRequest>,
) -> Result<Envelope<&'static str>, ApiError> {
    let email = tourbook_core::user::normalize_email(body.email.as_deref().unwrap_or_default())?;
    let repo = UserRepo::new(state.pool());
    let user = repo
        .find_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::not_found("There is no user with that email address"))?;

    let reset = ResetToken::generate();
    repo.set_reset_token(user.id, &reset.digest, reset.expires_at)
        .await?;

    let url = format!(
        "{}/reset-password/{}",
        state.config().public_base_url,
        reset.token
    );
    if let Err(e) = state.mailer().send(password_reset_email(&user.email, &url)).await {
        tracing::error!(user = %user.id, "sending reset email failed: {}", e);
        repo.clear_reset_token(user.id).await?;
        return Err(ApiError::EmailDelivery);
    }

    Ok(Envelope::success("Reset token has been sent by email!"))
}

/// PATCH /reset-password/{token}
async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    JsonBody(body): JsonBody<ResetPasswordRequest>,
) -> Result<ForCookie<String>, ApiError> {
    let repo = UserRepo::new(state.pool());
    let user = repo
        .find_by_reset_token(&digest_reset_token(&token))
        .await?
        .ok_or_else(|| ApiError::bad_request("Token is invalid or has expired"))?;

    let new_password = validate_password(body.password, body.password_confirm)?;
    let hash = password::hash(new_password).await?;
    let user = repo.set_password(user.id, &hash).await?;
    tracing::info!(user = %user.id, "password reset");

    with_session(&state, &user, |token| token)
}

/// PATCH /change-password
async fn change_password(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    JsonBody(body): JsonBody<ChangePasswordRequest>,
) -> Result<ForCookie<String>, ApiError> {
    let mismatch = || ApiError::unauthorized("User id is not found or password not matching");

    let repo = UserRepo::new(state.pool());
    let credentials = repo
        .find_by_id_with_password(current.id)
        .await?
        .ok_or_else(mismatch)?;
    let candidate = body.current_password.unwrap_or_default();
    if !password::verify(candidate, credentials.password_hash).await? {
        return Err(mismatch());
    }

    let new_password = validate_password(body.password, body.password_confirm)?;
    let hash = password::hash(new_password).await?;
    let user = repo.set_password(current.id, &hash).await?;
    tracing::info!(user = %user.id, "password changed");

    with_session(&state, &user, |token| token)
}

pub struct AuthController;

impl Controller for AuthController {
    fn name() -> &'static str {
        "auth"
    }

    fn base_path() -> &'static str {
        "/"
    }

    fn routes() -> Vec<Route> {
        vec![
            Route::new(Verb::Post, "/signup", signup),
            Route::new(Verb::Post, "/login", login).status(StatusCode::OK),
            Route::new(Verb::Get, "/logout", logout),
            Route::new(Verb::Post, "/forgot-password", forgot_password).status(StatusCode::OK),
            Route::new(Verb::Patch, "/reset-password/{token}", reset_password),
            Route::new(Verb::Patch, "/change-password", change_password).authorize(),
        ]
    }
}
