//! Domain layer for tourbook: models, validation rules and the list-query
//! helper. Nothing in this crate touches the network or the database.

pub mod geo;
pub mod pagination;
pub mod query;
pub mod review;
pub mod role;
pub mod slug;
pub mod tour;
pub mod user;
pub mod validation;

pub use geo::{Coordinates, Unit};
pub use pagination::Pagination;
pub use query::{Direction, Filter, FilterValue, ListQuery, Op, Projection, Schema, SortKey};
pub use review::{NewReview, Review, ReviewInput, ReviewUpdate, ReviewUser, REVIEW_SCHEMA};
pub use role::Role;
pub use slug::slugify;
pub use tour::{
    Difficulty, Guide, Location, MonthlyPlan, NewTour, Tour, TourDistance, TourInput, TourStats,
    TOUR_SCHEMA,
};
pub use user::{NewUser, ProfileUpdate, ResetToken, User, UserInput, USER_SCHEMA};
pub use validation::ValidationError;
