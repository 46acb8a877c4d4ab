//! User administration and self-service profile endpoints

use axum::extract::State;
use serde_json::Value;
use tourbook_core::{Role, User, UserInput, USER_SCHEMA};

use super::project;
use crate::auth::{password, CurrentUser};
use crate::db::repos::UserRepo;
use crate::http::controller::{Controller, Route, Verb};
use crate::http::envelope::Envelope;
use crate::http::error::ApiError;
use crate::http::extractors::{JsonBody, QueryParams, ValidId};
use crate::http::upload::{with_stored_photo, ProfileForm};
use crate::state::AppState;

const ADMIN: &[Role] = &[Role::Admin];

/// GET /api/v1/users
async fn list(
    State(state): State<AppState>,
    params: QueryParams,
) -> Result<Envelope<Value>, ApiError> {
    let query = params.list_query(&USER_SCHEMA)?;
    let users = UserRepo::new(state.pool()).list(&query).await?;
    Ok(Envelope::success(project(&users, &query.projection)?))
}

/// POST /api/v1/users
async fn create(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<UserInput>,
) -> Result<Envelope<User>, ApiError> {
    let new_user = input.into_new_user()?;
    let hash = password::hash(new_user.password.clone()).await?;
    let user = UserRepo::new(state.pool()).create(&new_user, &hash).await?;
    tracing::info!(user = %user.id, role = %user.role, "user created by admin");
    Ok(Envelope::success(user))
}

/// GET /api/v1/users/me
async fn me(CurrentUser(user): CurrentUser) -> Envelope<User> {
    Envelope::success(user)
}

/// PATCH /api/v1/users/me/update-authenticated-user
async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    form: ProfileForm,
) -> Result<Envelope<User>, ApiError> {
    let ProfileForm { mut input, photo } = form;
    // The photo only changes through an upload
    input.photo = None;
    input.role = None;
    let mut update = input.into_profile_update()?;
    let repo = UserRepo::new(state.pool());
    let user_id = user.id;

    let updated = match photo {
        // The stored file is dropped again if the update fails
        Some(upload) => {
            with_stored_photo(&state.config().public_dir, user_id, upload, |file_name| async move {
                update.photo = Some(file_name);
                repo.update_profile(user_id, &update).await.map_err(ApiError::from)
            })
            .await?
        }
        None if update.is_empty() => user,
        None => repo.update_profile(user_id, &update).await?,
    };
    Ok(Envelope::success(updated))
}

/// DELETE /api/v1/users/me/delete-authenticated-user
async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Envelope<()>, ApiError> {
    UserRepo::new(state.pool()).deactivate(user.id).await?;
    tracing::info!(user = %user.id, "user deactivated");
    Ok(Envelope::empty())
}

/// GET /api/v1/users/{id}
async fn get(
    State(state): State<AppState>,
    ValidId(id): ValidId,
) -> Result<Envelope<User>, ApiError> {
    Ok(Envelope::success(UserRepo::new(state.pool()).get(id).await?))
}

/// PATCH /api/v1/users/{id}
async fn update(
    State(state): State<AppState>,
    ValidId(id): ValidId,
    JsonBody(input): JsonBody<UserInput>,
) -> Result<Envelope<User>, ApiError> {
    if input.password.is_some() || input.password_confirm.is_some() {
        return Err(ApiError::bad_request(
            "This route is not for password updates. Please use /change-password.",
        ));
    }
    let update = input.into_admin_update()?;
    let repo = UserRepo::new(state.pool());
    let user = if update.is_empty() {
        repo.get(id).await?
    } else {
        repo.update_profile(id, &update).await?
    };
    Ok(Envelope::success(user))
}

/// DELETE /api/v1/users/{id}
async fn delete(
    State(state): State<AppState>,
    ValidId(id): ValidId,
) -> Result<Envelope<()>, ApiError> {
    UserRepo::new(state.pool()).delete(id).await?;
    tracing::info!(user = %id, "user deleted");
    Ok(Envelope::empty())
}

pub struct UsersController;

impl Controller for UsersController {
    fn name() -> &'static str {
        "users"
    }

    fn base_path() -> &'static str {
        "/api/v1/users"
    }

    fn routes() -> Vec<Route> {
        vec![
            Route::new(Verb::Get, "/", list).roles(ADMIN),
            Route::new(Verb::Post, "/", create).roles(ADMIN),
            Route::new(Verb::Get, "/me", me).authorize(),
            Route::new(Verb::Patch, "/me/update-authenticated-user", update_me).authorize(),
            Route::new(Verb::Delete, "/me/delete-authenticated-user", delete_me).authorize(),
            Route::new(Verb::Get, "/{id}", get).roles(ADMIN),
            Route::new(Verb::Patch, "/{id}", update).roles(ADMIN),
            Route::new(Verb::Delete, "/{id}", delete).roles(ADMIN),
        ]
    }
}

#[cfg(test)]
mod tests {
    use crate::http::controllers::testing::{request, send};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn me_needs_login() {
        let (status, body, _) = send(request("GET", "/api/v1/users/me")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body,
            json!({ "status": "error", "message": "Please login to get this route" })
        );
    }

    #[tokio::test]
    async fn admin_routes_need_login() {
        for (method, uri) in [
            ("GET", "/api/v1/users"),
            ("POST", "/api/v1/users"),
            ("GET", "/api/v1/users/8f14e45f-ceea-467f-a8b6-6b6a7e9a3f2c"),
            ("DELETE", "/api/v1/users/8f14e45f-ceea-467f-a8b6-6b6a7e9a3f2c"),
        ] {
            let (status, _, _) = send(request(method, uri)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn invalid_cookie_is_reported() {
        let (status, body, _) = send(
            request("GET", "/api/v1/users/me").header("cookie", "jwt=garbage"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid signature. Please login again");
    }
}
