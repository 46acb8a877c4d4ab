//! Server-rendered pages

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use serde_json::json;
use tourbook_core::{ListQuery, UserInput, REVIEW_SCHEMA, TOUR_SCHEMA};

use crate::auth::{CurrentUser, MaybeUser};
use crate::db::repos::{ReviewRepo, TourRepo, UserRepo};
use crate::http::controller::{Controller, Route, Verb};
use crate::http::error::ApiError;
use crate::http::extractors::FormBody;
use crate::http::render::View;
use crate::state::AppState;

/// Fields the account page may edit.
#[derive(Debug, Deserialize)]
pub struct AccountForm {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl From<AccountForm> for UserInput {
    fn from(form: AccountForm) -> Self {
        UserInput {
            name: form.name,
            email: form.email,
            ..UserInput::default()
        }
    }
}

async fn overview(State(state): State<AppState>) -> Result<View, ApiError> {
    let tours = TourRepo::new(state.pool())
        .list(&ListQuery::all(&TOUR_SCHEMA))
        .await?;
    Ok(View::new(
        "overview",
        json!({ "title": "All Tours", "tours": tours }),
    ))
}

async fn tour(State(state): State<AppState>, Path(slug): Path<String>) -> Result<View, ApiError> {
    let Some(tour) = TourRepo::new(state.pool()).get_by_slug(&slug).await? else {
        return Ok(View::error(
            StatusCode::NOT_FOUND,
            "There is no tour with that name.",
        ));
    };
    let reviews = ReviewRepo::new(state.pool())
        .list_for_tour(tour.id, &ListQuery::all(&REVIEW_SCHEMA))
        .await?;
    Ok(View::new(
        "tour",
        json!({ "title": format!("{} Tour", tour.name), "tour": tour, "reviews": reviews }),
    ))
}

/// Logged-in users go straight to their account.
async fn login(MaybeUser(user): MaybeUser) -> Response {
    if user.is_some() {
        return Redirect::to("/me").into_response();
    }
    View::new("login", json!({ "title": "Log into your account" })).into_response()
}

async fn account(_user: CurrentUser) -> View {
    View::new("account", json!({ "title": "Your account" }))
}

async fn update_account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    FormBody(form): FormBody<AccountForm>,
) -> Result<View, ApiError> {
    let update = UserInput::from(form).into_profile_update()?;
    let user = if update.is_empty() {
        user
    } else {
        UserRepo::new(state.pool()).update_profile(user.id, &update).await?
    };
    tracing::info!(user = %user.id, "account updated from settings page");
    Ok(View::new(
        "account",
        json!({ "title": "Your account", "user": user }),
    ))
}

pub struct ViewsController;

impl Controller for ViewsController {
    fn name() -> &'static str {
        "views"
    }

    fn base_path() -> &'static str {
        ""
    }

    fn routes() -> Vec<Route> {
        vec![
            Route::new(Verb::Get, "/", overview),
            Route::new(Verb::Get, "/tour/{slug}", tour),
            Route::new(Verb::Get, "/login", login),
            Route::new(Verb::Get, "/me", account).authorize(),
            Route::new(Verb::Post, "/me", update_account)
                .authorize()
                .status(StatusCode::OK),
        ]
    }
}
