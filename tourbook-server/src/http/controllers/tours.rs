//! Tour endpoints, including aggregations and geo lookups

use std::collections::HashMap;

use axum::extract::{Path, State};
use serde_json::Value;
use tourbook_core::geo::{self, Coordinates, Unit};
use tourbook_core::{
    ListQuery, MonthlyPlan, Role, Tour, TourDistance, TourInput, TourStats, TOUR_SCHEMA,
};

use super::{project, reviews};
use crate::db::repos::TourRepo;
use crate::http::controller::{Controller, Route, Verb};
use crate::http::envelope::Envelope;
use crate::http::error::ApiError;
use crate::http::extractors::{JsonBody, QueryParams, ValidId};
use crate::state::AppState;

const EDITORS: &[Role] = &[Role::Admin, Role::LeadGuide];
const STAFF: &[Role] = &[Role::Admin, Role::LeadGuide, Role::Guide];

async fn list_with(state: &AppState, query: ListQuery) -> Result<Envelope<Value>, ApiError> {
    let tours = TourRepo::new(state.pool()).list(&query).await?;
    Ok(Envelope::success(project(&tours, &query.projection)?))
}

/// GET /api/v1/tours
async fn list(
    State(state): State<AppState>,
    params: QueryParams,
) -> Result<Envelope<Value>, ApiError> {
    list_with(&state, params.list_query(&TOUR_SCHEMA)?).await
}

/// Query behind the "top 5 cheap" alias.
pub fn top_five_cheap() -> Result<ListQuery, ApiError> {
    let params: HashMap<String, String> = [
        ("sort", "price,-ratingsAverage"),
        ("page", "1"),
        ("limit", "5"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect();
    Ok(ListQuery::parse(&params, &TOUR_SCHEMA)?)
}

/// GET /api/v1/tours/top-5-cheap
async fn top_cheap(State(state): State<AppState>) -> Result<Envelope<Value>, ApiError> {
    list_with(&state, top_five_cheap()?).await
}

/// GET /api/v1/tours/tour-stats
async fn stats(State(state): State<AppState>) -> Result<Envelope<Vec<TourStats>>, ApiError> {
    let stats = TourRepo::new(state.pool()).stats().await?;
    Ok(Envelope::success(stats))
}

/// GET /api/v1/tours/monthly-plan/{year}
async fn monthly_plan(
    State(state): State<AppState>,
    Path(year): Path<String>,
) -> Result<Envelope<Vec<MonthlyPlan>>, ApiError> {
    let year: i32 = year
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid year: {}", year)))?;
    let plan = TourRepo::new(state.pool()).monthly_plan(year).await?;
    Ok(Envelope::success(plan))
}

fn parse_center(latlng: &str, unit: &str) -> Result<(Coordinates, Unit), ApiError> {
    let center = Coordinates::parse(latlng)?;
    let unit = unit.parse::<Unit>()?;
    Ok((center, unit))
}

/// Tours whose start location lies within `radius` of `center`.
pub fn tours_within(tours: Vec<Tour>, center: Coordinates, radius: f64, unit: Unit) -> Vec<Tour> {
    tours
        .into_iter()
        .filter(|tour| {
            tour.start_location
                .as_ref()
                .and_then(|loc| loc.position().ok())
                .is_some_and(|point| geo::within(center, point, radius, unit))
        })
        .collect()
}

/// Distance from `center` to every tour start, nearest first.
pub fn distances(tours: &[Tour], center: Coordinates, unit: Unit) -> Vec<TourDistance> {
    let mut out: Vec<TourDistance> = tours
        .iter()
        .filter_map(|tour| {
            let point = tour.start_location.as_ref()?.position().ok()?;
            Some(TourDistance {
                id: tour.id,
                name: tour.name.clone(),
                distance: geo::distance(center, point, unit),
            })
        })
        .collect();
    out.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    out
}

/// GET /api/v1/tours/tours-within/{distance}/center/{latlng}/unit/{unit}
async fn within(
    State(state): State<AppState>,
    Path((distance, latlng, unit)): Path<(String, String, String)>,
) -> Result<Envelope<Vec<Tour>>, ApiError> {
    let radius: f64 = distance
        .trim()
        .parse()
        .ok()
        .filter(|d: &f64| d.is_finite() && *d > 0.0)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid distance: {}", distance)))?;
    let (center, unit) = parse_center(&latlng, &unit)?;

    let tours = TourRepo::new(state.pool()).with_start_location().await?;
    Ok(Envelope::success(tours_within(tours, center, radius, unit)))
}

/// GET /api/v1/tours/distances/{latlng}/unit/{unit}
async fn distances_from(
    State(state): State<AppState>,
    Path((latlng, unit)): Path<(String, String)>,
) -> Result<Envelope<Vec<TourDistance>>, ApiError> {
    let (center, unit) = parse_center(&latlng, &unit)?;
    let tours = TourRepo::new(state.pool()).with_start_location().await?;
    Ok(Envelope::success(distances(&tours, center, unit)))
}

/// GET /api/v1/tours/{id}
async fn get(
    State(state): State<AppState>,
    ValidId(id): ValidId,
) -> Result<Envelope<Tour>, ApiError> {
    Ok(Envelope::success(TourRepo::new(state.pool()).get(id).await?))
}

/// POST /api/v1/tours
async fn create(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<TourInput>,
) -> Result<Envelope<Tour>, ApiError> {
    let tour = input.into_new()?;
    let repo = TourRepo::new(state.pool());
    repo.ensure_guides(&tour.guides).await?;
    let created = repo.create(&tour).await?;
    tracing::info!(tour = %created.id, slug = %created.slug, "tour created");
    Ok(Envelope::success(created))
}

/// PATCH /api/v1/tours/{id}
async fn update(
    State(state): State<AppState>,
    ValidId(id): ValidId,
    JsonBody(input): JsonBody<TourInput>,
) -> Result<Envelope<Tour>, ApiError> {
    let repo = TourRepo::new(state.pool());
    let existing = repo.get(id).await?;
    let tour = input.apply_to(&existing)?;
    repo.ensure_guides(&tour.guides).await?;
    Ok(Envelope::success(repo.update(id, &tour).await?))
}

/// DELETE /api/v1/tours/{id}
async fn delete(
    State(state): State<AppState>,
    ValidId(id): ValidId,
) -> Result<Envelope<()>, ApiError> {
    TourRepo::new(state.pool()).delete(id).await?;
    tracing::info!(tour = %id, "tour deleted");
    Ok(Envelope::empty())
}

pub struct ToursController;

impl Controller for ToursController {
    fn name() -> &'static str {
        "tours"
    }

    fn base_path() -> &'static str {
        "/api/v1/tours"
    }

    fn routes() -> Vec<Route> {
        vec![
            Route::new(Verb::Get, "/", list),
            Route::new(Verb::Get, "/top-5-cheap", top_cheap),
            Route::new(Verb::Get, "/tour-stats", stats),
            Route::new(Verb::Get, "/monthly-plan/{year}", monthly_plan).roles(STAFF),
            Route::new(
                Verb::Get,
                "/tours-within/{distance}/center/{latlng}/unit/{unit}",
                within,
            ),
            Route::new(Verb::Get, "/distances/{latlng}/unit/{unit}", distances_from),
            Route::new(Verb::Get, "/{id}", get),
            Route::new(Verb::Post, "/", create).roles(EDITORS),
            Route::new(Verb::Patch, "/{id}", update).roles(EDITORS),
            Route::new(Verb::Delete, "/{id}", delete).roles(EDITORS),
            Route::new(Verb::Get, "/{id}/reviews", reviews::list_for_tour),
            Route::new(Verb::Post, "/{id}/reviews", reviews::create_for_tour).roles(&[Role::User]),
        ]
    }
}
