//! Development dataset import and removal
//!
//! Reads `tours.json`, `users.json` and `reviews.json` from a data folder.
//! Users carry plaintext passwords in the file; they are hashed on the way in
//! and skip signup validation. Reviews go through the repository so that tour
//! ratings are recomputed.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tourbook_core::user::DEFAULT_PHOTO;
use tourbook_core::{NewUser, ReviewInput, Role, TourInput, ValidationError};
use uuid::Uuid;

use crate::auth::password;
use crate::db::repos::{DbError, ReviewRepo, TourRepo, UserRepo};
use crate::http::error::ApiError;

pub const TOURS_FILE: &str = "tours.json";
pub const USERS_FILE: &str = "users.json";
pub const REVIEWS_FILE: &str = "reviews.json";

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{file} record {index}: {source}")]
    Invalid {
        file: &'static str,
        index: usize,
        source: ValidationError,
    },

    #[error("hashing password of {email}: {message}")]
    Password { email: String, message: String },

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<DatasetError> for ApiError {
    fn from(e: DatasetError) -> Self {
        match e {
            DatasetError::Invalid { source, .. } => ApiError::Validation(source),
            DatasetError::Db(e) => e.into(),
            other => ApiError::internal(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TourRecord {
    id: Option<Uuid>,
    #[serde(flatten)]
    input: TourInput,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: Option<Uuid>,
    name: String,
    email: String,
    #[serde(default)]
    role: Role,
    photo: Option<String>,
    password: String,
    #[serde(default = "active_by_default")]
    active: bool,
}

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ReviewRecord {
    id: Option<Uuid>,
    #[serde(flatten)]
    input: ReviewInput,
}

/// Record counts per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub tours: u64,
    pub users: u64,
    pub reviews: u64,
}

async fn read_records<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<Vec<T>, DatasetError> {
    let path = dir.join(file);
    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| DatasetError::Io {
            path: path.clone(),
            source,
        })?;
    serde_json::from_str(&raw).map_err(|source| DatasetError::Json { path, source })
}

pub async fn import_tours(pool: &PgPool, dir: &Path) -> Result<u64, DatasetError> {
    let records: Vec<TourRecord> = read_records(dir, TOURS_FILE).await?;
    let repo = TourRepo::new(pool);
    let mut count = 0;
    for (index, record) in records.into_iter().enumerate() {
        let tour = record.input.into_new().map_err(|source| DatasetError::Invalid {
            file: TOURS_FILE,
            index,
            source,
        })?;
        repo.create_with_id(record.id, &tour).await?;
        count += 1;
    }
    tracing::info!(count, "tours imported");
    Ok(count)
}

pub async fn import_users(pool: &PgPool, dir: &Path) -> Result<u64, DatasetError> {
    let records: Vec<UserRecord> = read_records(dir, USERS_FILE).await?;
    let repo = UserRepo::new(pool);
    let mut count = 0;
    for record in records {
        let email = record.email.trim().to_lowercase();
        let hash = password::hash(record.password.clone())
            .await
            .map_err(|e| DatasetError::Password {
                email: email.clone(),
                message: e.to_string(),
            })?;
        let user = NewUser {
            name: record.name,
            email,
            role: record.role,
            photo: record.photo.unwrap_or_else(|| DEFAULT_PHOTO.to_owned()),
            password: record.password,
        };
        repo.create_with_id(record.id, &user, &hash, record.active)
            .await?;
        count += 1;
    }
    tracing::info!(count, "users imported");
    Ok(count)
}

pub async fn import_reviews(pool: &PgPool, dir: &Path) -> Result<u64, DatasetError> {
    let records: Vec<ReviewRecord> = read_records(dir, REVIEWS_FILE).await?;
    let repo = ReviewRepo::new(pool);
    let mut count = 0;
    for (index, record) in records.into_iter().enumerate() {
        let invalid = |source| DatasetError::Invalid {
            file: REVIEWS_FILE,
            index,
            source,
        };
        let user = record
            .input
            .user
            .ok_or_else(|| invalid(ValidationError::custom("Review must belong to a user!")))?;
        let review = record.input.into_new(user).map_err(invalid)?;
        repo.create_with_id(record.id, &review).await?;
        count += 1;
    }
    tracing::info!(count, "reviews imported");
    Ok(count)
}

/// Users first, then tours, then reviews (which reference both).
pub async fn import(pool: &PgPool, dir: &Path) -> Result<Counts, DatasetError> {
    let users = import_users(pool, dir).await?;
    let tours = import_tours(pool, dir).await?;
    let reviews = import_reviews(pool, dir).await?;
    Ok(Counts {
        tours,
        users,
        reviews,
    })
}

pub async fn delete_tours(pool: &PgPool) -> Result<u64, DatasetError> {
    let count = TourRepo::new(pool).delete_all().await?;
    tracing::info!(count, "tours deleted");
    Ok(count)
}

pub async fn delete_users(pool: &PgPool) -> Result<u64, DatasetError> {
    let count = UserRepo::new(pool).delete_all().await?;
    tracing::info!(count, "users deleted");
    Ok(count)
}

pub async fn delete_reviews(pool: &PgPool) -> Result<u64, DatasetError> {
    let count = ReviewRepo::new(pool).delete_all().await?;
    tracing::info!(count, "reviews deleted");
    Ok(count)
}

/// Remove everything `import` creates.
pub async fn delete(pool: &PgPool) -> Result<Counts, DatasetError> {
    let reviews = delete_reviews(pool).await?;
    let tours = delete_tours(pool).await?;
    let users = delete_users(pool).await?;
    Ok(Counts {
        tours,
        users,
        reviews,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../dev-data/data")
    }

    #[tokio::test]
    async fn bundled_files_parse() {
        let dir = data_dir();
        let tours: Vec<TourRecord> = read_records(&dir, TOURS_FILE).await.unwrap();
        let users: Vec<UserRecord> = read_records(&dir, USERS_FILE).await.unwrap();
        let reviews: Vec<ReviewRecord> = read_records(&dir, REVIEWS_FILE).await.unwrap();
        assert!(!tours.is_empty());
        assert!(users.iter().any(|u| u.role == Role::Admin));

        for record in tours {
            record.input.into_new().expect("bundled tour is valid");
        }
        for record in reviews {
            let user = record.input.user.expect("review user");
            assert!(users.iter().any(|u| u.id == Some(user)));
            record.input.into_new(user).expect("bundled review is valid");
        }
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_records::<TourRecord>(dir.path(), TOURS_FILE)
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::Io { .. }));
    }

    #[tokio::test]
    async fn malformed_file_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(USERS_FILE), "[{\"name\": ").unwrap();
        let err = read_records::<UserRecord>(dir.path(), USERS_FILE)
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::Json { .. }));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn import_then_delete() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.expect("pool creation failed");
        crate::db::migrations::run(&pool).await.expect("migrations failed");

        delete(&pool).await.expect("initial cleanup failed");
        let counts = import(&pool, &data_dir()).await.expect("import failed");
        assert!(counts.tours > 0 && counts.users > 0 && counts.reviews > 0);

        let removed = delete(&pool).await.expect("delete failed");
        assert_eq!(removed, counts);
    }
}
