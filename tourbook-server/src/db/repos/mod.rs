//! Repository implementations for database access
//!
//! Each repository borrows the pool and follows these patterns:
//! - Relations are populated in the same statement (no N+1)
//! - Duplicates are caught from the unique constraint, not checked first
//! - Multi-step writes run in a transaction

pub mod reviews;
pub mod tours;
pub mod users;

pub use reviews::ReviewRepo;
pub use tours::TourRepo;
pub use users::{Credentials, UserRepo};

use thiserror::Error;

/// Database errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("duplicate {field}: {value}")]
    Conflict { field: &'static str, value: String },
}

impl DbError {
    pub(crate) fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Turn a unique violation into [`DbError::Conflict`]; anything else
    /// stays a driver error.
    pub(crate) fn unique(e: sqlx::Error, field: &'static str, value: &str) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict {
                field,
                value: value.to_owned(),
            },
            _ => Self::Sqlx(e),
        }
    }
}

/// Surface a bad stored value as a decode error.
pub(crate) fn decode_error(e: tourbook_core::ValidationError) -> DbError {
    DbError::Sqlx(sqlx::Error::Decode(Box::new(e)))
}
