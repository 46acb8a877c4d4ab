//! Review endpoints, standalone and bound to a tour

use axum::extract::State;
use serde_json::Value;
use tourbook_core::{ListQuery, Review, ReviewInput, Role, REVIEW_SCHEMA};
use uuid::Uuid;

use super::project;
use crate::auth::CurrentUser;
use crate::db::repos::ReviewRepo;
use crate::http::controller::{Controller, Route, Verb};
use crate::http::envelope::Envelope;
use crate::http::error::ApiError;
use crate::http::extractors::{JsonBody, QueryParams, ValidId};
use crate::state::AppState;

/// Non-admins may only touch their own reviews.
pub fn ensure_author(current: &CurrentUser, review: &Review) -> Result<(), ApiError> {
    if current.is_admin() || review.user.id == current.0.id {
        Ok(())
    } else {
        Err(ApiError::forbidden("You can only modify your own reviews"))
    }
}

async fn list_with(
    state: &AppState,
    query: ListQuery,
    tour: Option<Uuid>,
) -> Result<Envelope<Value>, ApiError> {
    let reviews = ReviewRepo::new(state.pool()).list(&query, tour).await?;
    Ok(Envelope::success(project(&reviews, &query.projection)?))
}

async fn create_with(
    state: &AppState,
    current: &CurrentUser,
    mut input: ReviewInput,
    tour: Option<Uuid>,
) -> Result<Envelope<Review>, ApiError> {
    // Only admins may write on someone else's behalf
    if !current.is_admin() {
        input.user = None;
    }
    if tour.is_some() {
        input.tour = tour;
    }
    let review = input.into_new(current.0.id)?;
    let created = ReviewRepo::new(state.pool()).create(&review).await?;
    tracing::info!(review = %created.id, tour = %created.tour, "review created");
    Ok(Envelope::success(created))
}

/// GET /api/v1/reviews
async fn list(
    State(state): State<AppState>,
    params: QueryParams,
) -> Result<Envelope<Value>, ApiError> {
    list_with(&state, params.list_query(&REVIEW_SCHEMA)?, None).await
}

/// GET /api/v1/tours/{id}/reviews
pub(crate) async fn list_for_tour(
    State(state): State<AppState>,
    ValidId(tour): ValidId,
    params: QueryParams,
) -> Result<Envelope<Value>, ApiError> {
    list_with(&state, params.list_query(&REVIEW_SCHEMA)?, Some(tour)).await
}

/// GET /api/v1/reviews/{id}
async fn get(
    State(state): State<AppState>,
    ValidId(id): ValidId,
) -> Result<Envelope<Review>, ApiError> {
    Ok(Envelope::success(ReviewRepo::new(state.pool()).get(id).await?))
}

/// POST /api/v1/reviews
async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    JsonBody(input): JsonBody<ReviewInput>,
) -> Result<Envelope<Review>, ApiError> {
    create_with(&state, &current, input, None).await
}

/// POST /api/v1/tours/{id}/reviews
pub(crate) async fn create_for_tour(
    State(state): State<AppState>,
    ValidId(tour): ValidId,
    current: CurrentUser,
    JsonBody(input): JsonBody<ReviewInput>,
) -> Result<Envelope<Review>, ApiError> {
    create_with(&state, &current, input, Some(tour)).await
}

/// PATCH /api/v1/reviews/{id}
async fn update(
    State(state): State<AppState>,
    ValidId(id): ValidId,
    current: CurrentUser,
    JsonBody(input): JsonBody<ReviewInput>,
) -> Result<Envelope<Review>, ApiError> {
    let repo = ReviewRepo::new(state.pool());
    ensure_author(&current, &repo.get(id).await?)?;
    let update = input.into_update()?;
    Ok(Envelope::success(repo.update(id, &update).await?))
}

/// DELETE /api/v1/reviews/{id}
async fn delete(
    State(state): State<AppState>,
    ValidId(id): ValidId,
    current: CurrentUser,
) -> Result<Envelope<()>, ApiError> {
    let repo = ReviewRepo::new(state.pool());
    ensure_author(&current, &repo.get(id).await?)?;
    repo.delete(id).await?;
    Ok(Envelope::empty())
}

pub struct ReviewsController;

impl Controller for ReviewsController {
    fn name() -> &'static str {
        "reviews"
    }

    fn base_path() -> &'static str {
        "/api/v1/reviews"
    }

    fn routes() -> Vec<Route> {
        vec![
            Route::new(Verb::Get, "/", list),
            Route::new(Verb::Get, "/{id}", get),
            Route::new(Verb::Post, "/", create).roles(&[Role::User, Role::Admin]),
            Route::new(Verb::Patch, "/{id}", update).authorize(),
            Route::new(Verb::Delete, "/{id}", delete).authorize(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::controllers::testing::{request, send};
    use axum::http::StatusCode;
    use chrono::Utc;
    use serde_json::json;
    use tourbook_core::{ReviewUser, User};

    fn current(role: Role) -> CurrentUser {
        CurrentUser(User {
            id: Uuid::new_v4(),
            name: "Sophie Louise Hart".into(),
            email: "sophie@example.com".into(),
            role,
            photo: "default.jpg".into(),
            created_at: Utc::now(),
            password_changed_at: None,
        })
    }

    fn review_by(author: Uuid) -> Review {
        Review {
            id: Uuid::new_v4(),
            description: "Amazing!".into(),
            rating: 5,
            created_at: Utc::now(),
            tour: Uuid::new_v4(),
            user: ReviewUser {
                id: author,
                name: "Author".into(),
                photo: "default.jpg".into(),
            },
        }
    }

    #[test]
    fn only_authors_and_admins_modify() {
        let author = current(Role::User);
        let stranger = current(Role::User);
        let admin = current(Role::Admin);
        let review = review_by(author.0.id);

        assert!(ensure_author(&author, &review).is_ok());
        assert!(ensure_author(&admin, &review).is_ok());
        let err = ensure_author(&stranger, &review).unwrap_err();
        assert_eq!(err.to_string(), "You can only modify your own reviews");
    }

    #[tokio::test]
    async fn creating_needs_login() {
        let (status, _, _) = send(
            request("POST", "/api/v1/reviews").json(json!({ "description": "x", "rating": 4 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let tour = Uuid::new_v4();
        let (status, _, _) = send(
            request("POST", &format!("/api/v1/tours/{}/reviews", tour))
                .json(json!({ "description": "x", "rating": 4 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn delete_needs_login() {
        let (status, body, _) =
            send(request("DELETE", &format!("/api/v1/reviews/{}", Uuid::new_v4()))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "error");
    }
}
