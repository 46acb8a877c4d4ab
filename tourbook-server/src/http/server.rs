//! Router assembly and the HTTP listener
//!
//! Every controller is mounted from its route table, then wrapped (outermost
//! first) in tracing, CORS, a body limit, session resolution, view rendering
//! and the `/api` rate limit. Unmatched paths try `PUBLIC_DIR` before the
//! 404 fallback.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::handler::HandlerWithoutStateExt;
use axum::http::HeaderValue;
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::controller::mount;
use super::controllers::{
    AuthController, HealthController, ReviewsController, ServiceController, ToursController,
    UsersController, ViewsController,
};
use super::{rate_limit, render};
use crate::auth::session;
use crate::state::AppState;

/// Uploads are the largest bodies we accept.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,

    /// Allow any origin. Otherwise only `PUBLIC_BASE_URL` may call the API
    /// from a browser.
    pub cors_permissive: bool,
}

impl ServerConfig {
    pub fn from_state(state: &AppState) -> Self {
        let config = state.config();
        Self {
            bind_addr: config.bind_addr,
            cors_permissive: config.environment.is_development(),
        }
    }
}

fn cors_layer(state: &AppState, permissive: bool) -> CorsLayer {
    if permissive {
        tracing::warn!("CORS: permissive mode enabled, all origins allowed");
        return CorsLayer::permissive();
    }
    let base = &state.config().public_base_url;
    match base.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            tracing::warn!(origin = %base, "PUBLIC_BASE_URL is not a valid origin, CORS disabled");
            CorsLayer::new()
        }
    }
}

/// Build the application router with all controllers mounted.
pub fn build_router(state: AppState) -> Router {
    let permissive = state.config().environment.is_development();
    build_router_with(state, permissive)
}

fn build_router_with(state: AppState, cors_permissive: bool) -> Router {
    let mut router = Router::new();
    router = mount::<HealthController>(router);
    router = mount::<AuthController>(router);
    router = mount::<ToursController>(router);
    router = mount::<ReviewsController>(router);
    router = mount::<UsersController>(router);
    router = mount::<ServiceController>(router);
    router = mount::<ViewsController>(router);

    let static_files = ServeDir::new(&state.config().public_dir)
        .call_fallback_on_method_not_allowed(true)
        .fallback(render::not_found.into_service());

    router
        .fallback_service(static_files)
        .layer(middleware::from_fn_with_state(
            state.limiter().clone(),
            rate_limit::limit,
        ))
        .layer(middleware::from_fn(render::render))
        .layer(middleware::from_fn_with_state(state.clone(), session::resolve))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(&state, cors_permissive))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until Ctrl+C or SIGTERM.
pub async fn run_server(state: AppState, config: ServerConfig) -> Result<(), ServerError> {
    let limiter = state.limiter().clone();
    let pruner = tokio::spawn(async move {
        let mut ticks = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            ticks.tick().await;
            limiter.prune();
        }
    });

    let app = build_router_with(state, config.cors_permissive);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    pruner.abort();
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::controllers::testing::{request, send, send_with};
    use crate::http::rate_limit::RateLimitConfig;
    use crate::state::testing;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn development_is_permissive() {
        let config = ServerConfig::from_state(&testing::state());
        assert!(config.cors_permissive);
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[tokio::test]
    async fn health_is_not_enveloped() {
        let (status, body, _) = send(request("GET", "/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body.get("data").is_none());
    }

    #[tokio::test]
    async fn unknown_api_route_is_json_404() {
        let (status, body, _) = send(request("GET", "/api/v1/bookings")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body,
            json!({ "status": "notfound", "message": "Could not find resource /api/v1/bookings" })
        );
    }

    #[tokio::test]
    async fn unknown_api_route_is_json_404_for_every_verb() {
        for method in ["POST", "PATCH", "PUT", "DELETE"] {
            let (status, body, _) = send(request(method, "/api/v1/bookings")).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", method);
            assert_eq!(
                body,
                json!({ "status": "notfound", "message": "Could not find resource /api/v1/bookings" })
            );
        }
    }

    #[tokio::test]
    async fn unknown_page_is_html_404() {
        let (status, body, _) = send(request("GET", "/no-such-page")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let html = body.as_str().unwrap();
        assert!(html.contains("Page not found"));
    }

    #[tokio::test]
    async fn static_files_are_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("css/style.css"), "body {}").unwrap();

        let mut config = testing::config();
        config.public_dir = dir.path().to_path_buf();
        let state = AppState::with_mailer(
            testing::state().pool().clone(),
            config,
            std::sync::Arc::new(crate::mail::LogMailer),
        );

        let (status, body, _) = send_with(state, request("GET", "/css/style.css")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("body {}"));
    }

    #[tokio::test]
    async fn api_is_rate_limited() {
        let mut config = testing::config();
        config.rate_limit = RateLimitConfig {
            max_requests: 2,
            window_secs: 3600,
        };
        let state = AppState::with_mailer(
            testing::state().pool().clone(),
            config,
            std::sync::Arc::new(crate::mail::LogMailer),
        );

        for _ in 0..2 {
            let (status, _, _) =
                send_with(state.clone(), request("GET", "/api/v1/tours/not-an-id")).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        let (status, body, _) =
            send_with(state.clone(), request("GET", "/api/v1/tours/not-an-id")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["message"], "Too many requests. Please try again in one hour!");

        // Pages are not counted
        let (status, _, _) = send_with(state, request("GET", "/health")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
