//! Review repository
//!
//! Every write recomputes the owning tour's rating statistics inside the
//! same transaction.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use tourbook_core::{ListQuery, NewReview, Review, ReviewUpdate, ReviewUser};
use uuid::Uuid;

use super::DbError;
use crate::db::query::push_list_query;

const SELECT_REVIEWS: &str = r#"
    SELECT
        r.id, r.description, r.rating, r.created_at, r.tour_id,
        u.id AS user_id, u.name AS user_name, u.photo AS user_photo
    FROM reviews r
    JOIN users u ON u.id = r.user_id
    JOIN tours t ON t.id = r.tour_id
    WHERE NOT t.secret_tour AND u.active
"#;

#[derive(Debug, FromRow)]
struct ReviewRow {
    id: Uuid,
    description: String,
    rating: i16,
    created_at: DateTime<Utc>,
    tour_id: Uuid,
    user_id: Uuid,
    user_name: String,
    user_photo: String,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Review {
            id: row.id,
            description: row.description,
            rating: row.rating,
            created_at: row.created_at,
            tour: row.tour_id,
            user: ReviewUser {
                id: row.user_id,
                name: row.user_name,
                photo: row.user_photo,
            },
        }
    }
}

/// Refresh `ratings_quantity` and `ratings_average` of one tour.
///
/// With no reviews left the average falls back to 4.5.
pub(crate) async fn recalculate_rating(
    tx: &mut Transaction<'_, Postgres>,
    tour_id: Uuid,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE tours SET
            ratings_quantity = s.quantity,
            ratings_average = s.average
        FROM (
            SELECT
                COUNT(*)::INT AS quantity,
                COALESCE(ROUND(AVG(rating)::NUMERIC, 1)::DOUBLE PRECISION, 4.5) AS average
            FROM reviews
            WHERE tour_id = $1
        ) s
        WHERE tours.id = $1
        "#,
    )
    .bind(tour_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Review repository
pub struct ReviewRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ReviewRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List reviews, optionally bound to one tour.
    pub async fn list(&self, query: &ListQuery, tour: Option<Uuid>) -> Result<Vec<Review>, DbError> {
        let mut builder = QueryBuilder::<Postgres>::new(SELECT_REVIEWS);
        if let Some(tour_id) = tour {
            builder.push(" AND r.tour_id = ").push_bind(tour_id);
        }
        push_list_query(&mut builder, query, "r.id");
        let rows: Vec<ReviewRow> = builder.build_query_as().fetch_all(self.pool).await?;
        Ok(rows.into_iter().map(Review::from).collect())
    }

    pub async fn list_for_tour(&self, tour_id: Uuid, query: &ListQuery) -> Result<Vec<Review>, DbError> {
        self.list(query, Some(tour_id)).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Review, DbError> {
        let sql = format!("{} AND r.id = $1", SELECT_REVIEWS);
        let row: Option<ReviewRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        row.map(Review::from)
            .ok_or_else(|| DbError::not_found("review", id))
    }

    pub async fn create(&self, review: &NewReview) -> Result<Review, DbError> {
        self.create_with_id(None, review).await
    }

    /// Insert a review and refresh the tour rating (atomic).
    pub async fn create_with_id(&self, id: Option<Uuid>, review: &NewReview) -> Result<Review, DbError> {
        let mut tx = self.pool.begin().await?;

        let (tour_exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM tours WHERE id = $1 AND NOT secret_tour)",
        )
        .bind(review.tour)
        .fetch_one(&mut *tx)
        .await?;
        if !tour_exists {
            return Err(DbError::not_found("tour", review.tour));
        }

        let (user_exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1 AND active)")
                .bind(review.user)
                .fetch_one(&mut *tx)
                .await?;
        if !user_exists {
            return Err(DbError::not_found("user", review.user));
        }

        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO reviews (id, description, rating, tour_id, user_id)
            VALUES (COALESCE($1, gen_random_uuid()), $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(&review.description)
        .bind(review.rating)
        .bind(review.tour)
        .bind(review.user)
        .fetch_one(&mut *tx)
        .await?;

        recalculate_rating(&mut tx, review.tour).await?;
        tx.commit().await?;

        self.get(id).await
    }

    pub async fn update(&self, id: Uuid, update: &ReviewUpdate) -> Result<Review, DbError> {
        let mut tx = self.pool.begin().await?;

        let (tour_id,): (Uuid,) = sqlx::query_as(
            r#"
            UPDATE reviews SET
                description = COALESCE($2, description),
                rating = COALESCE($3, rating)
            WHERE id = $1
            RETURNING tour_id
            "#,
        )
        .bind(id)
        .bind(&update.description)
        .bind(update.rating)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("review", id))?;

        recalculate_rating(&mut tx, tour_id).await?;
        tx.commit().await?;

        self.get(id).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        let (tour_id,): (Uuid,) =
            sqlx::query_as("DELETE FROM reviews WHERE id = $1 RETURNING tour_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| DbError::not_found("review", id))?;

        recalculate_rating(&mut tx, tour_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Remove every review and reset every tour's rating.
    pub async fn delete_all(&self) -> Result<u64, DbError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM reviews").execute(&mut *tx).await?;
        sqlx::query("UPDATE tours SET ratings_quantity = 0, ratings_average = 4.5")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repos::{TourRepo, UserRepo};
    use tourbook_core::{Difficulty, NewTour, NewUser, Role};

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.expect("pool creation failed");
        crate::db::migrations::run(&pool).await.expect("migrations failed");
        pool
    }

    /// A fresh user and a fresh public tour.
    async fn fixture(pool: &PgPool, label: &str) -> (tourbook_core::User, tourbook_core::Tour) {
        let suffix = &Uuid::new_v4().to_string()[..8];
        let user = UserRepo::new(pool)
            .create(
                &NewUser {
                    name: format!("{} Test", label),
                    email: format!("{}-{}@example.com", label.to_lowercase(), suffix),
                    role: Role::User,
                    photo: "default.jpg".into(),
                    password: String::new(),
                },
                "hash",
            )
            .await
            .expect("user create failed");
        let tour = TourRepo::new(pool)
            .create(
                &NewTour {
                    name: format!("{} Tour {}", label, suffix),
                    slug: String::new(),
                    duration: 4,
                    max_group_size: 8,
                    difficulty: Difficulty::Medium,
                    ratings_average: 4.5,
                    ratings_quantity: 0,
                    price: 250.0,
                    price_discount: None,
                    summary: "Rated".into(),
                    description: None,
                    image_cover: "cover.jpg".into(),
                    images: vec![],
                    start_dates: vec![],
                    secret_tour: false,
                    start_location: None,
                    locations: vec![],
                    guides: vec![],
                }
                .validate()
                .expect("valid tour"),
            )
            .await
            .expect("tour create failed");
        (user, tour)
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn reviews_drive_tour_rating() {
        let pool = pool().await;
        let (user, tour) = fixture(&pool, "Rating").await;

        let repo = ReviewRepo::new(&pool);
        let review = |rating| NewReview {
            description: "Test review".into(),
            rating,
            tour: tour.id,
            user: user.id,
        };
        let first = repo.create(&review(5)).await.expect("review create failed");
        repo.create(&review(4)).await.expect("review create failed");
        repo.create(&review(4)).await.expect("review create failed");

        let rated = TourRepo::new(&pool).get(tour.id).await.expect("tour get failed");
        assert_eq!(rated.ratings_quantity, 3);
        assert_eq!(rated.ratings_average, 4.3);

        repo.delete(first.id).await.expect("review delete failed");
        let rated = TourRepo::new(&pool).get(tour.id).await.expect("tour get failed");
        assert_eq!(rated.ratings_quantity, 2);
        assert_eq!(rated.ratings_average, 4.0);

        TourRepo::new(&pool).delete(tour.id).await.expect("cleanup failed");
        UserRepo::new(&pool).delete(user.id).await.expect("cleanup failed");
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn reviews_of_deactivated_users_are_hidden() {
        let pool = pool().await;
        let (user, tour) = fixture(&pool, "Inactive").await;

        let repo = ReviewRepo::new(&pool);
        let review = repo
            .create(&NewReview {
                description: "Soon gone".into(),
                rating: 3,
                tour: tour.id,
                user: user.id,
            })
            .await
            .expect("review create failed");
        UserRepo::new(&pool).deactivate(user.id).await.expect("deactivate failed");

        let listed = repo
            .list_for_tour(tour.id, &ListQuery::all(&tourbook_core::REVIEW_SCHEMA))
            .await
            .expect("list failed");
        assert!(listed.is_empty());
        assert!(matches!(repo.get(review.id).await, Err(DbError::NotFound { .. })));

        TourRepo::new(&pool).delete(tour.id).await.expect("cleanup failed");
        UserRepo::new(&pool).delete(user.id).await.expect("cleanup failed");
    }
}
