//! Health check endpoint

use axum::Json;
use serde::Serialize;

use crate::http::controller::{Controller, Route, Verb};

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub struct HealthController;

impl Controller for HealthController {
    fn name() -> &'static str {
        "health"
    }

    fn base_path() -> &'static str {
        ""
    }

    fn routes() -> Vec<Route> {
        vec![Route::new(Verb::Get, "/health", health)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_returns_ok() {
        let Json(body) = health().await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }
}
