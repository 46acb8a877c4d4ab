//! Tour repository
//!
//! Secret tours never leave this module: every read and aggregation filters
//! them out. Guides are populated from `users` in the same statement.

use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tourbook_core::tour::duration_weeks;
use tourbook_core::{Guide, ListQuery, Location, MonthlyPlan, NewTour, Tour, TourStats};
use uuid::Uuid;

use super::{decode_error, DbError};
use crate::db::query::push_list_query;

const SELECT_TOURS: &str = r#"
    SELECT
        t.id, t.name, t.slug, t.duration, t.max_group_size, t.difficulty,
        t.ratings_average, t.ratings_quantity, t.price, t.price_discount,
        t.summary, t.description, t.image_cover, t.images, t.start_dates,
        t.secret_tour, t.start_location, t.locations, t.created_at,
        COALESCE((
            SELECT json_agg(
                json_build_object(
                    'id', u.id, 'name', u.name, 'email', u.email,
                    'role', u.role, 'photo', u.photo
                )
                ORDER BY array_position(t.guides, u.id)
            )
            FROM users u
            WHERE u.id = ANY(t.guides) AND u.active
        ), '[]'::json) AS guides
    FROM tours t
"#;

#[derive(Debug, FromRow)]
struct TourRow {
    id: Uuid,
    name: String,
    slug: String,
    duration: i32,
    max_group_size: i32,
    difficulty: String,
    ratings_average: f64,
    ratings_quantity: i32,
    price: f64,
    price_discount: Option<f64>,
    summary: String,
    description: Option<String>,
    image_cover: String,
    images: Vec<String>,
    start_dates: Vec<DateTime<Utc>>,
    secret_tour: bool,
    start_location: Option<Json<Location>>,
    locations: Json<Vec<Location>>,
    created_at: DateTime<Utc>,
    guides: Json<Vec<Guide>>,
}

impl TryFrom<TourRow> for Tour {
    type Error = DbError;

    fn try_from(row: TourRow) -> Result<Self, Self::Error> {
        Ok(Tour {
            id: row.id,
            name: row.name,
            slug: row.slug,
            duration: row.duration,
            duration_weeks: duration_weeks(row.duration),
            max_group_size: row.max_group_size,
            difficulty: row.difficulty.parse().map_err(decode_error)?,
            ratings_average: row.ratings_average,
            ratings_quantity: row.ratings_quantity,
            price: row.price,
            price_discount: row.price_discount,
            summary: row.summary,
            description: row.description,
            image_cover: row.image_cover,
            images: row.images,
            created_at: row.created_at,
            start_dates: row.start_dates,
            secret_tour: row.secret_tour,
            start_location: row.start_location.map(|Json(l)| l),
            locations: row.locations.0,
            guides: row.guides.0,
        })
    }
}

fn into_tours(rows: Vec<TourRow>) -> Result<Vec<Tour>, DbError> {
    rows.into_iter().map(Tour::try_from).collect()
}

/// Tour repository
pub struct TourRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> TourRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List tours through the query helper.
    pub async fn list(&self, query: &ListQuery) -> Result<Vec<Tour>, DbError> {
        let started = Instant::now();

        let mut builder = QueryBuilder::<Postgres>::new(SELECT_TOURS);
        builder.push(" WHERE NOT t.secret_tour");
        push_list_query(&mut builder, query, "t.id");
        let rows: Vec<TourRow> = builder.build_query_as().fetch_all(self.pool).await?;

        tracing::debug!("tour list query took {} ms", started.elapsed().as_millis());
        into_tours(rows)
    }

    /// Get a single (non-secret) tour by ID.
    pub async fn get(&self, id: Uuid) -> Result<Tour, DbError> {
        self.fetch(id, false)
            .await?
            .ok_or_else(|| DbError::not_found("tour", id))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Tour>, DbError> {
        let sql = format!("{} WHERE t.slug = $1 AND NOT t.secret_tour", SELECT_TOURS);
        let row: Option<TourRow> = sqlx::query_as(&sql)
            .bind(slug)
            .fetch_optional(self.pool)
            .await?;
        row.map(Tour::try_from).transpose()
    }

    async fn fetch(&self, id: Uuid, include_secret: bool) -> Result<Option<Tour>, DbError> {
        let sql = format!(
            "{} WHERE t.id = $1 AND ($2 OR NOT t.secret_tour)",
            SELECT_TOURS
        );
        let row: Option<TourRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(include_secret)
            .fetch_optional(self.pool)
            .await?;
        row.map(Tour::try_from).transpose()
    }

    /// Fail with 404 semantics when any guide id is not an active user.
    pub async fn ensure_guides(&self, guides: &[Uuid]) -> Result<(), DbError> {
        if guides.is_empty() {
            return Ok(());
        }
        let found: Vec<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE id = ANY($1) AND active")
                .bind(guides)
                .fetch_all(self.pool)
                .await?;
        match guides.iter().find(|g| !found.iter().any(|(id,)| id == *g)) {
            Some(missing) => Err(DbError::not_found("guide", missing)),
            None => Ok(()),
        }
    }

    pub async fn create(&self, tour: &NewTour) -> Result<Tour, DbError> {
        self.create_with_id(None, tour).await
    }

    /// Insert a tour, keeping `id` when one is given (dataset import).
    pub async fn create_with_id(&self, id: Option<Uuid>, tour: &NewTour) -> Result<Tour, DbError> {
        self.ensure_guides(&tour.guides).await?;

        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO tours (
                id, name, slug, duration, max_group_size, difficulty,
                ratings_average, ratings_quantity, price, price_discount,
                summary, description, image_cover, images, start_dates,
                secret_tour, start_location, locations, guides
            )
            VALUES (
                COALESCE($1, gen_random_uuid()), $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19
            )
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(&tour.name)
        .bind(&tour.slug)
        .bind(tour.duration)
        .bind(tour.max_group_size)
        .bind(tour.difficulty.as_str())
        .bind(tour.ratings_average)
        .bind(tour.ratings_quantity)
        .bind(tour.price)
        .bind(tour.price_discount)
        .bind(&tour.summary)
        .bind(&tour.description)
        .bind(&tour.image_cover)
        .bind(&tour.images)
        .bind(&tour.start_dates)
        .bind(tour.secret_tour)
        .bind(tour.start_location.as_ref().map(Json))
        .bind(Json(&tour.locations))
        .bind(&tour.guides)
        .fetch_one(self.pool)
        .await
        .map_err(|e| DbError::unique(e, "name", &tour.name))?;

        self.fetch(id, true)
            .await?
            .ok_or_else(|| DbError::not_found("tour", id))
    }

    /// Replace every stored field of a tour with the validated merge result.
    pub async fn update(&self, id: Uuid, tour: &NewTour) -> Result<Tour, DbError> {
        self.ensure_guides(&tour.guides).await?;

        let result = sqlx::query(
            r#"
            UPDATE tours SET
                name = $2, slug = $3, duration = $4, max_group_size = $5,
                difficulty = $6, ratings_average = $7, ratings_quantity = $8,
                price = $9, price_discount = $10, summary = $11,
                description = $12, image_cover = $13, images = $14,
                start_dates = $15, secret_tour = $16, start_location = $17,
                locations = $18, guides = $19
            WHERE id = $1 AND NOT secret_tour
            "#,
        )
        .bind(id)
        .bind(&tour.name)
        .bind(&tour.slug)
        .bind(tour.duration)
        .bind(tour.max_group_size)
        .bind(tour.difficulty.as_str())
        .bind(tour.ratings_average)
        .bind(tour.ratings_quantity)
        .bind(tour.price)
        .bind(tour.price_discount)
        .bind(&tour.summary)
        .bind(&tour.description)
        .bind(&tour.image_cover)
        .bind(&tour.images)
        .bind(&tour.start_dates)
        .bind(tour.secret_tour)
        .bind(tour.start_location.as_ref().map(Json))
        .bind(Json(&tour.locations))
        .bind(&tour.guides)
        .execute(self.pool)
        .await
        .map_err(|e| DbError::unique(e, "name", &tour.name))?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("tour", id));
        }

        self.fetch(id, true)
            .await?
            .ok_or_else(|| DbError::not_found("tour", id))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM tours WHERE id = $1 AND NOT secret_tour")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("tour", id));
        }
        Ok(())
    }

    /// Remove every tour (and, through the foreign key, every review).
    pub async fn delete_all(&self) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM tours").execute(self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Statistics per difficulty over well-rated tours, cheapest first.
    pub async fn stats(&self) -> Result<Vec<TourStats>, DbError> {
        let rows: Vec<(String, i64, i64, f64, f64, f64, f64)> = sqlx::query_as(
            r#"
            SELECT
                UPPER(difficulty) AS difficulty,
                COUNT(*) AS num_tours,
                COALESCE(SUM(ratings_quantity), 0)::BIGINT AS num_ratings,
                AVG(ratings_average) AS avg_rating,
                AVG(price) AS avg_price,
                MIN(price) AS min_price,
                MAX(price) AS max_price
            FROM tours
            WHERE NOT secret_tour AND ratings_average >= 4.5
            GROUP BY UPPER(difficulty)
            ORDER BY avg_price ASC
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(difficulty, num_tours, num_ratings, avg_rating, avg_price, min_price, max_price)| {
                    TourStats {
                        difficulty,
                        num_tours,
                        num_ratings,
                        avg_rating,
                        avg_price,
                        min_price,
                        max_price,
                    }
                },
            )
            .collect())
    }

    /// Tour starts per month of `year`, busiest month first.
    pub async fn monthly_plan(&self, year: i32) -> Result<Vec<MonthlyPlan>, DbError> {
        let Some((from, to)) = year_bounds(year) else {
            return Ok(Vec::new());
        };

        let rows: Vec<(i32, i64, Vec<String>)> = sqlx::query_as(
            r#"
            SELECT
                EXTRACT(MONTH FROM d AT TIME ZONE 'UTC')::INT AS month,
                COUNT(*) AS num_tour_starts,
                ARRAY_AGG(t.name ORDER BY t.name) AS tours
            FROM tours t, UNNEST(t.start_dates) AS d
            WHERE NOT t.secret_tour AND d >= $1 AND d < $2
            GROUP BY month
            ORDER BY num_tour_starts DESC, month ASC
            LIMIT 12
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(month, num_tour_starts, tours)| MonthlyPlan {
                month,
                num_tour_starts,
                tours,
            })
            .collect())
    }

    /// Every visible tour that has a start location, for geo filtering.
    pub async fn with_start_location(&self) -> Result<Vec<Tour>, DbError> {
        let sql = format!(
            "{} WHERE NOT t.secret_tour AND t.start_location IS NOT NULL ORDER BY t.created_at DESC, t.id",
            SELECT_TOURS
        );
        let rows: Vec<TourRow> = sqlx::query_as(&sql).fetch_all(self.pool).await?;
        into_tours(rows)
    }
}

/// `[Jan 1 of year, Jan 1 of year + 1)` in UTC.
fn year_bounds(year: i32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)?.and_utc();
    let end = NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?
        .and_hms_opt(0, 0, 0)?
        .and_utc();
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn year_bounds_cover_whole_year() {
        let (from, to) = year_bounds(2021).unwrap();
        assert_eq!(from.year(), 2021);
        assert_eq!((from.month(), from.day()), (1, 1));
        assert_eq!(to.year(), 2022);
        assert!(year_bounds(i32::MAX).is_none());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn secret_tours_are_invisible() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.expect("pool creation failed");
        crate::db::migrations::run(&pool).await.expect("migrations failed");
        let repo = TourRepo::new(&pool);

        let name = format!("Secret Test {}", &Uuid::new_v4().to_string()[..8]);
        let tour = NewTour {
            name: name.clone(),
            slug: String::new(),
            duration: 3,
            max_group_size: 5,
            difficulty: tourbook_core::Difficulty::Easy,
            ratings_average: 4.5,
            ratings_quantity: 0,
            price: 100.0,
            price_discount: None,
            summary: "Hidden".into(),
            description: None,
            image_cover: "cover.jpg".into(),
            images: vec![],
            start_dates: vec![],
            secret_tour: true,
            start_location: None,
            locations: vec![],
            guides: vec![],
        }
        .validate()
        .expect("valid tour");

        let created = repo.create(&tour).await.expect("create failed");
        assert!(created.secret_tour);
        assert!(matches!(
            repo.get(created.id).await,
            Err(DbError::NotFound { .. })
        ));
        let listed = repo
            .list(&ListQuery::all(&tourbook_core::TOUR_SCHEMA))
            .await
            .expect("list failed");
        assert!(listed.iter().all(|t| t.id != created.id));

        // Writes by id cannot reach it either
        assert!(matches!(
            repo.update(created.id, &tour).await,
            Err(DbError::NotFound { .. })
        ));
        assert!(matches!(
            repo.delete(created.id).await,
            Err(DbError::NotFound { .. })
        ));

        sqlx::query("DELETE FROM tours WHERE id = $1")
            .bind(created.id)
            .execute(&pool)
            .await
            .expect("cleanup failed");
    }
}
