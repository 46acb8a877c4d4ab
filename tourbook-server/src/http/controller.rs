//! Declarative controllers
//!
//! A controller is a base path plus a table of [`Route`]s. Each route names
//! its verb, path, success status and access rule next to the handler, and
//! [`mount`] turns the table into an axum router:
//!
//! ```ignore
//! impl Controller for ToursController {
//!     fn name() -> &'static str { "tours" }
//!     fn base_path() -> &'static str { "/api/v1/tours" }
//!     fn routes() -> Vec<Route> {
//!         vec![
//!             Route::new(Verb::Get, "/", list),
//!             Route::new(Verb::Post, "/", create).roles(&[Role::Admin, Role::LeadGuide]),
//!         ]
//!     }
//! }
//!
//! let app = mount::<ToursController>(Router::new());
//! ```

use std::fmt;

use axum::body::Body;
use axum::extract::Request;
use axum::handler::Handler;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{self, MethodRouter};
use axum::Router;
use tourbook_core::Role;

use crate::auth::session;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    /// Status a successful handler answers with unless the route overrides it.
    pub fn default_status(self) -> StatusCode {
        match self {
            Self::Post => StatusCode::CREATED,
            Self::Delete => StatusCode::NO_CONTENT,
            Self::Get | Self::Put | Self::Patch => StatusCode::OK,
        }
    }

    fn method_router<H, T>(self, handler: H) -> MethodRouter<AppState>
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        match self {
            Self::Get => routing::get(handler),
            Self::Post => routing::post(handler),
            Self::Put => routing::put(handler),
            Self::Patch => routing::patch(handler),
            Self::Delete => routing::delete(handler),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Who may call a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    /// Any logged-in user
    Authenticated,
    /// Logged-in user holding one of the roles
    Roles(&'static [Role]),
}

/// One entry of a controller's route table.
pub struct Route {
    pub verb: Verb,
    pub path: &'static str,
    pub access: Access,
    pub status: StatusCode,
    method: MethodRouter<AppState>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("verb", &self.verb)
            .field("path", &self.path)
            .field("access", &self.access)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Route {
    pub fn new<H, T>(verb: Verb, path: &'static str, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        Self {
            verb,
            path,
            access: Access::Public,
            status: verb.default_status(),
            method: verb.method_router(handler),
        }
    }

    /// Require a logged-in user.
    pub fn authorize(mut self) -> Self {
        self.access = Access::Authenticated;
        self
    }

    /// Require one of `roles`.
    pub fn roles(mut self, roles: &'static [Role]) -> Self {
        self.access = Access::Roles(roles);
        self
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    fn into_method_router(self) -> MethodRouter<AppState> {
        let Self {
            access,
            status,
            method,
            ..
        } = self;
        method
            .route_layer(middleware::from_fn(move |req: Request, next: Next| {
                normalize_status(status, req, next)
            }))
            .route_layer(middleware::from_fn(move |req: Request, next: Next| {
                session::authorize(access, req, next)
            }))
    }
}

/// A group of routes under one base path.
pub trait Controller {
    fn name() -> &'static str;

    /// `""` or `"/"` mounts at the root.
    fn base_path() -> &'static str;

    fn routes() -> Vec<Route>;
}

/// Add `C`'s routes to `router`.
///
/// Panics when two routes share verb and path, like axum does for any
/// overlapping route.
pub fn mount<C: Controller>(router: Router<AppState>) -> Router<AppState> {
    let base = C::base_path().trim_end_matches('/');
    let mut routes = Router::new();
    for route in C::routes() {
        tracing::debug!(
            controller = C::name(),
            verb = %route.verb,
            path = %format!("{}{}", base, route.path),
            access = ?route.access,
            status = route.status.as_u16(),
            "route mounted"
        );
        let path = route.path;
        routes = routes.route(path, route.into_method_router());
    }

    if base.is_empty() {
        router.merge(routes)
    } else {
        router.nest(base, routes)
    }
}

/// A plain 200 from the handler becomes the route's status; 204 drops the body.
async fn normalize_status(status: StatusCode, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.status() != StatusCode::OK || status == StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    parts.status = status;
    if status == StatusCode::NO_CONTENT {
        parts.headers.remove(axum::http::header::CONTENT_TYPE);
        parts.headers.remove(axum::http::header::CONTENT_LENGTH);
        return Response::from_parts(parts, Body::empty());
    }
    Response::from_parts(parts, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CurrentUser;
    use crate::state::testing;
    use axum::body::to_bytes;
    use axum::extract::Path;
    use tower::ServiceExt;

    struct Probe;

    async fn list() -> &'static str {
        "list"
    }

    async fn create() -> &'static str {
        "created"
    }

    async fn remove(Path(id): Path<String>) -> String {
        id
    }

    async fn whoami(CurrentUser(user): CurrentUser) -> String {
        user.name
    }

    impl Controller for Probe {
        fn name() -> &'static str {
            "probe"
        }

        fn base_path() -> &'static str {
            "/api/v1/probe"
        }

        fn routes() -> Vec<Route> {
            vec![
                Route::new(Verb::Get, "/", list),
                Route::new(Verb::Post, "/", create),
                Route::new(Verb::Post, "/login", create).status(StatusCode::OK),
                Route::new(Verb::Delete, "/{id}", remove).roles(&[Role::Admin]),
                Route::new(Verb::Get, "/me", whoami).authorize(),
            ]
        }
    }

    fn app() -> Router {
        mount::<Probe>(Router::new())
            .layer(middleware::from_fn_with_state(testing::state(), session::resolve))
            .with_state(testing::state())
    }

    async fn send(method: &str, uri: &str) -> Response {
        app()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[test]
    fn verb_defaults() {
        assert_eq!(Verb::Get.default_status(), StatusCode::OK);
        assert_eq!(Verb::Post.default_status(), StatusCode::CREATED);
        assert_eq!(Verb::Delete.default_status(), StatusCode::NO_CONTENT);
        assert_eq!(Verb::Patch.default_status(), StatusCode::OK);
    }

    #[test]
    fn route_builder() {
        let route = Route::new(Verb::Delete, "/{id}", remove).roles(&[Role::Admin]);
        assert_eq!(route.access, Access::Roles(&[Role::Admin]));
        assert_eq!(route.status, StatusCode::NO_CONTENT);
        let route = Route::new(Verb::Post, "/login", create).status(StatusCode::OK);
        assert_eq!(route.access, Access::Public);
        assert_eq!(route.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn get_and_post_share_a_path() {
        let response = send("GET", "/api/v1/probe").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"list");

        let response = send("POST", "/api/v1/probe").await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn status_override() {
        let response = send("POST", "/api/v1/probe/login").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_need_a_session() {
        let response = send("DELETE", "/api/v1/probe/42").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send("GET", "/api/v1/probe/me").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejected_token_reports_reason() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/probe/me")
                    .header("authorization", "Bearer not-a-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Invalid signature. Please login again");
    }

    #[tokio::test]
    async fn no_content_drops_body() {
        let app = Router::new()
            .route(
                "/gone",
                routing::delete(|| async { "still here" }).route_layer(middleware::from_fn(
                    |req: Request, next: Next| normalize_status(StatusCode::NO_CONTENT, req, next),
                )),
            );
        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/gone")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }
}
