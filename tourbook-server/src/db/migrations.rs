//! Schema for users, tours and reviews
//!
//! Every statement is idempotent; running the migrations on an existing
//! database is a no-op.

use sqlx::PgPool;

/// Create tables and indexes.
pub async fn run(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL DEFAULT 'user'
                CHECK (role IN ('user', 'guide', 'lead-guide', 'admin')),
            photo TEXT NOT NULL DEFAULT 'default.jpg',
            password_hash TEXT NOT NULL,
            password_changed_at TIMESTAMPTZ,
            password_reset_token TEXT,
            password_reset_expires TIMESTAMPTZ,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tours (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name TEXT NOT NULL UNIQUE,
            slug TEXT NOT NULL,
            duration INTEGER NOT NULL CHECK (duration > 0),
            max_group_size INTEGER NOT NULL CHECK (max_group_size > 0),
            difficulty TEXT NOT NULL CHECK (difficulty IN ('easy', 'medium', 'difficult')),
            ratings_average DOUBLE PRECISION NOT NULL DEFAULT 4.5,
            ratings_quantity INTEGER NOT NULL DEFAULT 0,
            price DOUBLE PRECISION NOT NULL CHECK (price > 0),
            price_discount DOUBLE PRECISION,
            summary TEXT NOT NULL,
            description TEXT,
            image_cover TEXT NOT NULL,
            images TEXT[] NOT NULL DEFAULT '{}',
            start_dates TIMESTAMPTZ[] NOT NULL DEFAULT '{}',
            secret_tour BOOLEAN NOT NULL DEFAULT FALSE,
            start_location JSONB,
            locations JSONB NOT NULL DEFAULT '[]',
            guides UUID[] NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reviews (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            description TEXT NOT NULL,
            rating SMALLINT NOT NULL CHECK (rating BETWEEN 1 AND 5),
            tour_id UUID NOT NULL REFERENCES tours(id) ON DELETE CASCADE,
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    create_indexes(pool).await?;

    tracing::info!("Migrations complete");
    Ok(())
}

async fn create_indexes(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Tour indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tours_slug ON tours(slug)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tours_price_rating ON tours(price, ratings_average DESC)",
    )
    .execute(pool)
    .await?;

    // Review indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reviews_tour ON reviews(tour_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reviews_user ON reviews(user_id)")
        .execute(pool)
        .await?;

    // User indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_users_reset_token ON users(password_reset_token) WHERE password_reset_token IS NOT NULL",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn migrations_are_idempotent() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.expect("pool creation failed");

        run(&pool).await.expect("first run");
        run(&pool).await.expect("second run");

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name IN ('users', 'tours', 'reviews')",
        )
        .fetch_one(&pool)
        .await
        .expect("query failed");
        assert_eq!(count, 3);
    }
}
