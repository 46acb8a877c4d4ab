//! HTTP layer: controllers, middleware, envelope and errors

pub mod controller;
pub mod controllers;
pub mod envelope;
pub mod error;
pub mod extractors;
pub mod rate_limit;
pub mod render;
pub mod server;
pub mod upload;

pub use controller::{Access, Controller, Route, Verb};
pub use envelope::{Envelope, ForCookie};
pub use error::ApiError;
pub use render::View;
pub use server::{build_router, run_server, ServerConfig, ServerError};
