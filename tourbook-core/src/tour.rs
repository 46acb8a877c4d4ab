//! Tours: the main resource of the catalogue.
//!
//! `TourInput` is what clients send (every field optional, so the same type
//! serves create and partial update). `NewTour` is the validated, complete
//! record that repositories persist. `Tour` is what reads return.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Coordinates;
use crate::query::{Field, FieldKind, Schema};
use crate::slug::slugify;
use crate::validation::required;
use crate::{Role, ValidationError};

const NAME_MIN: usize = 10;
const NAME_MAX: usize = 40;

/// Rating assigned to tours nobody has reviewed yet.
pub const DEFAULT_RATING: f64 = 4.5;

/// Fields clients may filter and sort tours on.
pub const TOUR_SCHEMA: Schema = Schema {
    fields: &[
        Field::new("name", "t.name", FieldKind::Text),
        Field::new("slug", "t.slug", FieldKind::Text),
        Field::new("duration", "t.duration", FieldKind::Integer),
        Field::new("maxGroupSize", "t.max_group_size", FieldKind::Integer),
        Field::new("difficulty", "t.difficulty", FieldKind::Text),
        Field::new("ratingsAverage", "t.ratings_average", FieldKind::Float),
        Field::new("ratingsQuantity", "t.ratings_quantity", FieldKind::Integer),
        Field::new("price", "t.price", FieldKind::Float),
        Field::new("priceDiscount", "t.price_discount", FieldKind::Float),
        Field::new("summary", "t.summary", FieldKind::Text),
        Field::new("createdAt", "t.created_at", FieldKind::Timestamp),
    ],
    default_sort: "-createdAt",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Difficult => "difficult",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "difficult" => Ok(Self::Difficult),
            _ => Err(ValidationError::custom(
                "Difficulty is either: easy, medium, difficult",
            )),
        }
    }
}

fn point() -> String {
    "Point".to_owned()
}

/// GeoJSON-style point. `coordinates` is `[longitude, latitude]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(rename = "type", default = "point")]
    pub kind: String,
    pub coordinates: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<i32>,
}

impl Location {
    pub fn position(&self) -> Result<Coordinates, ValidationError> {
        let [lng, lat] = self.coordinates;
        Coordinates::new(lat, lng)
    }
}

/// Guide summary embedded in tour reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guide {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub photo: String,
}

/// Tour as returned by reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub duration: i32,
    /// Virtual: `round(duration / 7)`, never stored or queryable
    pub duration_weeks: i32,
    pub max_group_size: i32,
    pub difficulty: Difficulty,
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_discount: Option<f64>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub start_dates: Vec<DateTime<Utc>>,
    pub secret_tour: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_location: Option<Location>,
    pub locations: Vec<Location>,
    pub guides: Vec<Guide>,
}

/// Weeks shown next to a tour's duration in days.
pub fn duration_weeks(duration: i32) -> i32 {
    (duration as f64 / 7.0).round() as i32
}

/// Client payload for create and partial update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourInput {
    pub name: Option<String>,
    pub duration: Option<i32>,
    pub max_group_size: Option<i32>,
    pub difficulty: Option<String>,
    pub ratings_average: Option<f64>,
    pub ratings_quantity: Option<i32>,
    pub price: Option<f64>,
    pub price_discount: Option<f64>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<DateTime<Utc>>>,
    pub secret_tour: Option<bool>,
    pub start_location: Option<Location>,
    pub locations: Option<Vec<Location>>,
    pub guides: Option<Vec<Uuid>>,
}

/// Validated tour, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTour {
    pub name: String,
    pub slug: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: Difficulty,
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    pub start_dates: Vec<DateTime<Utc>>,
    pub secret_tour: bool,
    pub start_location: Option<Location>,
    pub locations: Vec<Location>,
    pub guides: Vec<Uuid>,
}

fn must(message: &str) -> ValidationError {
    ValidationError::custom(message)
}

impl TourInput {
    /// Validate a create payload.
    pub fn into_new(self) -> Result<NewTour, ValidationError> {
        let name = self.name.ok_or_else(|| must("A tour must have a name"))?;
        NewTour {
            slug: String::new(),
            name,
            duration: self.duration.ok_or_else(|| must("A tour must have a duration"))?,
            max_group_size: self
                .max_group_size
                .ok_or_else(|| must("A tour must have a group size"))?,
            difficulty: self
                .difficulty
                .ok_or_else(|| must("A tour must have a difficulty"))?
                .parse()?,
            ratings_average: self.ratings_average.unwrap_or(DEFAULT_RATING),
            ratings_quantity: self.ratings_quantity.unwrap_or(0),
            price: self.price.ok_or_else(|| must("A tour must have a price"))?,
            price_discount: self.price_discount,
            summary: self.summary.ok_or_else(|| must("A tour must have a description"))?,
            description: self.description,
            image_cover: self
                .image_cover
                .ok_or_else(|| must("A tour must have an image cover"))?,
            images: self.images.unwrap_or_default(),
            start_dates: self.start_dates.unwrap_or_default(),
            secret_tour: self.secret_tour.unwrap_or(false),
            start_location: self.start_location,
            locations: self.locations.unwrap_or_default(),
            guides: self.guides.unwrap_or_default(),
        }
        .validate()
    }

    /// Merge a partial update over an existing tour and validate the result.
    pub fn apply_to(self, existing: &Tour) -> Result<NewTour, ValidationError> {
        let difficulty = match self.difficulty {
            Some(d) => d.parse()?,
            None => existing.difficulty,
        };
        NewTour {
            slug: String::new(),
            name: self.name.unwrap_or_else(|| existing.name.clone()),
            duration: self.duration.unwrap_or(existing.duration),
            max_group_size: self.max_group_size.unwrap_or(existing.max_group_size),
            difficulty,
            ratings_average: self.ratings_average.unwrap_or(existing.ratings_average),
            ratings_quantity: self.ratings_quantity.unwrap_or(existing.ratings_quantity),
            price: self.price.unwrap_or(existing.price),
            price_discount: self.price_discount.or(existing.price_discount),
            summary: self.summary.unwrap_or_else(|| existing.summary.clone()),
            description: self.description.or_else(|| existing.description.clone()),
            image_cover: self.image_cover.unwrap_or_else(|| existing.image_cover.clone()),
            images: self.images.unwrap_or_else(|| existing.images.clone()),
            start_dates: self.start_dates.unwrap_or_else(|| existing.start_dates.clone()),
            secret_tour: self.secret_tour.unwrap_or(existing.secret_tour),
            start_location: self.start_location.or_else(|| existing.start_location.clone()),
            locations: self.locations.unwrap_or_else(|| existing.locations.clone()),
            guides: self
                .guides
                .unwrap_or_else(|| existing.guides.iter().map(|g| g.id).collect()),
        }
        .validate()
    }
}

impl NewTour {
    /// Apply every tour rule, normalizing text fields and deriving the slug.
    pub fn validate(mut self) -> Result<Self, ValidationError> {
        self.name = required("name", &self.name).map_err(|_| must("A tour must have a name"))?;
        let len = self.name.chars().count();
        if len > NAME_MAX {
            return Err(must("A Tour name must have less or equal than 40 characters"));
        }
        if len < NAME_MIN {
            return Err(must("A Tour name must have more or equal than 10 characters"));
        }
        self.slug = slugify(&self.name);

        if self.duration <= 0 {
            return Err(ValidationError::OutOfRange {
                field: "duration",
                min: 1.0,
                max: i32::MAX as f64,
            });
        }
        if self.max_group_size <= 0 {
            return Err(ValidationError::OutOfRange {
                field: "maxGroupSize",
                min: 1.0,
                max: i32::MAX as f64,
            });
        }

        if !self.ratings_average.is_finite() || self.ratings_average < 1.0 {
            return Err(must("Rating must be above or equal 1.0"));
        }
        if self.ratings_average > 5.0 {
            return Err(must("Rating must be below or equal 5.0"));
        }
        self.ratings_average = round_rating(self.ratings_average);
        if self.ratings_quantity < 0 {
            return Err(ValidationError::OutOfRange {
                field: "ratingsQuantity",
                min: 0.0,
                max: i32::MAX as f64,
            });
        }

        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "price",
                min: 0.0,
                max: f64::MAX,
            });
        }
        if let Some(discount) = self.price_discount {
            if !discount.is_finite() || discount >= self.price {
                return Err(ValidationError::custom(format!(
                    "Discount price ({}) should be below regular price",
                    discount
                )));
            }
        }

        self.summary =
            required("summary", &self.summary).map_err(|_| must("A tour must have a description"))?;
        self.description = self
            .description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());
        self.image_cover = required("imageCover", &self.image_cover)
            .map_err(|_| must("A tour must have an image cover"))?;

        if let Some(start) = &self.start_location {
            start.position()?;
        }
        for location in &self.locations {
            location.position()?;
        }

        Ok(self)
    }
}

/// Ratings are kept with one decimal (4.666 -> 4.7).
pub fn round_rating(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// One row of the difficulty statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourStats {
    pub difficulty: String,
    pub num_tours: i64,
    pub num_ratings: i64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// One month of the yearly start-date plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPlan {
    pub month: i32,
    pub num_tour_starts: i64,
    pub tours: Vec<String>,
}

/// Distance from a reference point to a tour's start location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourDistance {
    pub id: Uuid,
    pub name: String,
    pub distance: f64,
}
