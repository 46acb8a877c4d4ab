//! Admin-only dataset maintenance

use axum::extract::State;
use serde::Serialize;
use tourbook_core::Role;

use crate::dataset;
use crate::http::controller::{Controller, Route, Verb};
use crate::http::envelope::Envelope;
use crate::http::error::ApiError;
use crate::state::AppState;

const ADMIN: &[Role] = &[Role::Admin];

#[derive(Debug, Serialize)]
pub struct Affected {
    pub count: u64,
}

type Outcome = Result<Envelope<Affected>, ApiError>;

fn affected(count: u64) -> Outcome {
    Ok(Envelope::success(Affected { count }))
}

async fn import_tours(State(state): State<AppState>) -> Outcome {
    affected(dataset::import_tours(state.pool(), &state.config().data_folder).await?)
}

async fn delete_tours(State(state): State<AppState>) -> Outcome {
    affected(dataset::delete_tours(state.pool()).await?)
}

async fn import_users(State(state): State<AppState>) -> Outcome {
    affected(dataset::import_users(state.pool(), &state.config().data_folder).await?)
}

async fn delete_users(State(state): State<AppState>) -> Outcome {
    affected(dataset::delete_users(state.pool()).await?)
}

async fn import_reviews(State(state): State<AppState>) -> Outcome {
    affected(dataset::import_reviews(state.pool(), &state.config().data_folder).await?)
}

async fn delete_reviews(State(state): State<AppState>) -> Outcome {
    affected(dataset::delete_reviews(state.pool()).await?)
}

pub struct ServiceController;

impl Controller for ServiceController {
    fn name() -> &'static str {
        "service"
    }

    fn base_path() -> &'static str {
        "/api/v1/service"
    }

    fn routes() -> Vec<Route> {
        vec![
            Route::new(Verb::Post, "/import-tours", import_tours).roles(ADMIN),
            Route::new(Verb::Post, "/delete-tours", delete_tours).roles(ADMIN),
            Route::new(Verb::Post, "/import-users", import_users).roles(ADMIN),
            Route::new(Verb::Post, "/delete-users", delete_users).roles(ADMIN),
            Route::new(Verb::Post, "/import-reviews", import_reviews).roles(ADMIN),
            Route::new(Verb::Post, "/delete-reviews", delete_reviews).roles(ADMIN),
        ]
    }
}

#[cfg(test)]
mod tests {
    use crate::http::controllers::testing::{request, send};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn anonymous_cannot_touch_the_dataset() {
        let (status, _, _) = send(request("POST", "/api/v1/service/delete-tours")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn only_post_is_routed() {
        let (status, _, _) = send(request("GET", "/api/v1/service/import-tours")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
