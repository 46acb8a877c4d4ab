//! User repository
//!
//! Deactivated users behave as if they did not exist for every read.
//! Password hashes and reset digests are only ever returned by the
//! credential lookups.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tourbook_core::{ListQuery, NewUser, ProfileUpdate, Role, User};
use uuid::Uuid;

use super::{decode_error, DbError};
use crate::db::query::push_list_query;

const USER_COLUMNS: &str =
    "u.id, u.name, u.email, u.role, u.photo, u.created_at, u.password_changed_at";

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    photo: String,
    created_at: DateTime<Utc>,
    password_changed_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            role: Role::parse(&row.role).map_err(decode_error)?,
            photo: row.photo,
            created_at: row.created_at,
            password_changed_at: row.password_changed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CredentialsRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

/// A user together with the stored bcrypt hash.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: User,
    pub password_hash: String,
}

impl TryFrom<CredentialsRow> for Credentials {
    type Error = DbError;

    fn try_from(row: CredentialsRow) -> Result<Self, Self::Error> {
        Ok(Credentials {
            user: row.user.try_into()?,
            password_hash: row.password_hash,
        })
    }
}

/// User repository
pub struct UserRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Vec<User>, DbError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
        builder.push(USER_COLUMNS).push(" FROM users u WHERE u.active");
        push_list_query(&mut builder, query, "u.id");
        let rows: Vec<UserRow> = builder.build_query_as().fetch_all(self.pool).await?;
        rows.into_iter().map(User::try_from).collect()
    }

    pub async fn get(&self, id: Uuid) -> Result<User, DbError> {
        let sql = format!("SELECT {} FROM users u WHERE u.id = $1 AND u.active", USER_COLUMNS);
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        row.ok_or_else(|| DbError::not_found("user", id))?.try_into()
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let sql = format!(
            "SELECT {} FROM users u WHERE u.email = $1 AND u.active",
            USER_COLUMNS
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(email)
            .fetch_optional(self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    /// Login lookup: the user and its password hash.
    pub async fn find_by_email_with_password(
        &self,
        email: &str,
    ) -> Result<Option<Credentials>, DbError> {
        let sql = format!(
            "SELECT {}, u.password_hash FROM users u WHERE u.email = $1 AND u.active",
            USER_COLUMNS
        );
        let row: Option<CredentialsRow> = sqlx::query_as(&sql)
            .bind(email)
            .fetch_optional(self.pool)
            .await?;
        row.map(Credentials::try_from).transpose()
    }

    pub async fn find_by_id_with_password(&self, id: Uuid) -> Result<Option<Credentials>, DbError> {
        let sql = format!(
            "SELECT {}, u.password_hash FROM users u WHERE u.id = $1 AND u.active",
            USER_COLUMNS
        );
        let row: Option<CredentialsRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        row.map(Credentials::try_from).transpose()
    }

    pub async fn create(&self, user: &NewUser, password_hash: &str) -> Result<User, DbError> {
        self.create_with_id(None, user, password_hash, true).await
    }

    /// Insert a user, keeping `id` and `active` as given (dataset import).
    pub async fn create_with_id(
        &self,
        id: Option<Uuid>,
        user: &NewUser,
        password_hash: &str,
        active: bool,
    ) -> Result<User, DbError> {
        let sql = format!(
            r#"
            INSERT INTO users AS u (id, name, email, role, photo, password_hash, active)
            VALUES (COALESCE($1, gen_random_uuid()), $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row: UserRow = sqlx::query_as(&sql)
            .bind(id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.role.as_str())
            .bind(&user.photo)
            .bind(password_hash)
            .bind(active)
            .fetch_one(self.pool)
            .await
            .map_err(|e| DbError::unique(e, "email", &user.email))?;
        row.try_into()
    }

    /// Apply the fields present in `update`; absent ones are kept.
    pub async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<User, DbError> {
        let sql = format!(
            r#"
            UPDATE users AS u SET
                name = COALESCE($2, u.name),
                email = COALESCE($3, u.email),
                photo = COALESCE($4, u.photo),
                role = COALESCE($5, u.role)
            WHERE u.id = $1 AND u.active
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(&update.name)
            .bind(&update.email)
            .bind(&update.photo)
            .bind(update.role.as_ref().map(Role::as_str))
            .fetch_optional(self.pool)
            .await
            .map_err(|e| DbError::unique(e, "email", update.email.as_deref().unwrap_or_default()))?;
        row.ok_or_else(|| DbError::not_found("user", id))?.try_into()
    }

    /// Soft delete.
    pub async fn deactivate(&self, id: Uuid) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE users SET active = FALSE WHERE id = $1 AND active")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("user", id));
        }
        Ok(())
    }

    /// Hard delete; the user's reviews go with it.
    pub async fn delete(&self, id: Uuid) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        let tours: Vec<(Uuid,)> =
            sqlx::query_as("SELECT DISTINCT tour_id FROM reviews WHERE user_id = $1")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("user", id));
        }

        for (tour_id,) in tours {
            super::reviews::recalculate_rating(&mut tx, tour_id).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Store a new hash and drop any pending reset token.
    ///
    /// `password_changed_at` is backdated by one second so that a token
    /// issued right after the change is still newer than it.
    pub async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<User, DbError> {
        let sql = format!(
            r#"
            UPDATE users AS u SET
                password_hash = $2,
                password_changed_at = NOW() - INTERVAL '1 second',
                password_reset_token = NULL,
                password_reset_expires = NULL
            WHERE u.id = $1 AND u.active
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(password_hash)
            .fetch_optional(self.pool)
            .await?;
        row.ok_or_else(|| DbError::not_found("user", id))?.try_into()
    }

    pub async fn set_reset_token(
        &self,
        id: Uuid,
        digest: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE users SET password_reset_token = $2, password_reset_expires = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(digest)
        .bind(expires_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear_reset_token(&self, id: Uuid) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE users SET password_reset_token = NULL, password_reset_expires = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// User owning an unexpired reset token digest.
    pub async fn find_by_reset_token(&self, digest: &str) -> Result<Option<User>, DbError> {
        let sql = format!(
            r#"
            SELECT {} FROM users u
            WHERE u.password_reset_token = $1
              AND u.password_reset_expires > NOW()
              AND u.active
            "#,
            USER_COLUMNS
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(digest)
            .fetch_optional(self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    pub async fn delete_all(&self) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM users").execute(self.pool).await?;
        Ok(result.rows_affected())
    }
}
