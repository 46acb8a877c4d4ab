//! Reviews

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::query::{Field, FieldKind, Schema};
use crate::ValidationError;

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;

pub const REVIEW_SCHEMA: Schema = Schema {
    fields: &[
        Field::new("rating", "r.rating", FieldKind::Integer),
        Field::new("tour", "r.tour_id", FieldKind::Uuid),
        Field::new("user", "r.user_id", FieldKind::Uuid),
        Field::new("createdAt", "r.created_at", FieldKind::Timestamp),
    ],
    default_sort: "-createdAt",
};

/// Author as shown next to a review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewUser {
    pub id: Uuid,
    pub name: String,
    pub photo: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub description: String,
    pub rating: i16,
    pub created_at: DateTime<Utc>,
    pub tour: Uuid,
    pub user: ReviewUser,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewInput {
    pub description: Option<String>,
    pub rating: Option<i16>,
    pub tour: Option<Uuid>,
    pub user: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub description: String,
    pub rating: i16,
    pub tour: Uuid,
    pub user: Uuid,
}

/// Validated partial update; the tour and author of a review never change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewUpdate {
    pub description: Option<String>,
    pub rating: Option<i16>,
}

impl ReviewInput {
    /// Validate a new review. Without an explicit `user` the review belongs
    /// to `user`, normally the logged-in one.
    pub fn into_new(self, user: Uuid) -> Result<NewReview, ValidationError> {
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| ValidationError::custom("A review must have a description!"))?
            .to_owned();
        let rating = self
            .rating
            .ok_or_else(|| ValidationError::custom("A review must be rated!"))?;
        check_rating(rating)?;
        let tour = self
            .tour
            .ok_or_else(|| ValidationError::custom("Review must specify a tour!"))?;

        Ok(NewReview {
            description,
            rating,
            tour,
            user: self.user.unwrap_or(user),
        })
    }

    pub fn into_update(self) -> Result<ReviewUpdate, ValidationError> {
        let description = match self.description {
            Some(d) if d.trim().is_empty() => {
                return Err(ValidationError::custom("A review must have a description!"))
            }
            Some(d) => Some(d.trim().to_owned()),
            None => None,
        };
        if let Some(rating) = self.rating {
            check_rating(rating)?;
        }
        Ok(ReviewUpdate {
            description,
            rating: self.rating,
        })
    }
}

fn check_rating(rating: i16) -> Result<(), ValidationError> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(ValidationError::OutOfRange {
            field: "rating",
            min: MIN_RATING as f64,
            max: MAX_RATING as f64,
        });
    }
    Ok(())
}
