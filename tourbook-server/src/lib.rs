//! tourbook-server: JSON API and server-rendered pages for tourbook
//!
//! Controllers declare their routes as data (see [`http::controller`]); the
//! server mounts them behind session resolution, view rendering and a rate
//! limit. Persistence is PostgreSQL through sqlx.

pub mod auth;
pub mod config;
pub mod dataset;
pub mod db;
pub mod http;
pub mod mail;
pub mod state;

pub use config::{load_dotenv, AppConfig, ConfigError, Environment};
pub use http::{build_router, run_server, ApiError, ServerConfig, ServerError};
pub use state::AppState;
