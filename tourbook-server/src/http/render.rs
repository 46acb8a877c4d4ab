//! Server-rendered pages
//!
//! View handlers return a [`View`]; the [`render`] middleware turns it into
//! HTML with the logged-in user added to the context. The same middleware
//! swaps JSON error responses for the error page when a browser asked for a
//! page outside `/api`.

use axum::extract::Request;
use axum::http::header::ACCEPT;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use minijinja::{AutoEscape, Environment};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tourbook_core::User;

use super::envelope::Envelope;
use super::error::{ApiError, ErrorPage};
use crate::auth::{CurrentUser, Session};

const TEMPLATE_SOURCES: [(&str, &str); 6] = [
    ("base", include_str!("../../templates/base.html")),
    ("overview", include_str!("../../templates/overview.html")),
    ("tour", include_str!("../../templates/tour.html")),
    ("login", include_str!("../../templates/login.html")),
    ("account", include_str!("../../templates/account.html")),
    ("error", include_str!("../../templates/error.html")),
];

static TEMPLATES: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::Html);
    for (name, source) in TEMPLATE_SOURCES {
        if let Err(e) = env.add_template(name, source) {
            tracing::error!(template = name, "template failed to parse: {}", e);
        }
    }
    env
});

/// A template plus its context, rendered by [`render`].
#[derive(Debug, Clone)]
pub struct View {
    pub template: &'static str,
    pub context: Value,
    pub status: StatusCode,
}

impl View {
    pub fn new(template: &'static str, context: Value) -> Self {
        Self {
            template,
            context,
            status: StatusCode::OK,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::new(
            "error",
            json!({ "title": "Something went wrong!", "msg": message }),
        )
        .with_status(status)
    }

    /// Render to HTML with `user` available to the template unless the
    /// context already carries one.
    pub fn render(&self, user: Option<&User>) -> Result<String, ApiError> {
        let mut context = match &self.context {
            Value::Object(map) => map.clone(),
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_owned(), other.clone());
                map
            }
        };
        if let Some(user) = user.filter(|_| !context.contains_key("user")) {
            let user = serde_json::to_value(user)
                .map_err(|e| ApiError::internal(format!("user serialization failed: {}", e)))?;
            context.insert("user".to_owned(), user);
        }

        TEMPLATES
            .get_template(self.template)
            .and_then(|t| t.render(&context))
            .map_err(|e| ApiError::internal(format!("rendering {} failed: {}", self.template, e)))
    }
}

impl IntoResponse for View {
    fn into_response(self) -> Response {
        let mut response = self.status.into_response();
        response.extensions_mut().insert(self);
        response
    }
}

fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/html"))
}

/// Render views and page-level errors.
pub async fn render(request: Request, next: Next) -> Response {
    let user = match request.extensions().get::<Session>() {
        Some(Session::Authenticated(CurrentUser(user))) => Some(user.clone()),
        _ => None,
    };
    let page_request =
        !request.uri().path().starts_with("/api") && accepts_html(request.headers());

    let response = next.run(request).await;

    let view = match response.extensions().get::<View>() {
        Some(view) => view.clone(),
        None if page_request => match response.extensions().get::<ErrorPage>() {
            Some(page) => View::error(page.status, &page.message),
            None => return response,
        },
        None => return response,
    };

    match view.render(user.as_ref()) {
        Ok(html) => (view.status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!("{}", e);
            let message = e.public_message();
            (e.status(), Envelope::<()>::error(message)).into_response()
        }
    }
}

/// Unmatched routes: JSON under `api/v1`, the error page elsewhere.
pub async fn not_found(uri: Uri) -> Response {
    if uri.to_string().contains("api/v1") {
        return (
            StatusCode::NOT_FOUND,
            Envelope::<()>::not_found(format!("Could not find resource {}", uri)),
        )
            .into_response();
    }
    View::error(StatusCode::NOT_FOUND, "Page not found").into_response()
}
