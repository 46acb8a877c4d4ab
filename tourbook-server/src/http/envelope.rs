//! Response envelope and the cookie-issuing wrapper

use axum::http::header::SET_COOKIE;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::Duration;
use serde::Serialize;
use time::OffsetDateTime;

pub const JWT_COOKIE: &str = "jwt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
    NotFound,
}

/// `{status, data?, message?}` body shared by every JSON response.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: Status::Success,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: Status::NotFound,
            data: None,
            message: Some(message.into()),
        }
    }
}

impl Envelope<()> {
    /// Success without a `data` field (deletes).
    pub fn empty() -> Self {
        Self {
            status: Status::Success,
            data: None,
            message: None,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// A payload that also sets the `jwt` session cookie.
#[derive(Debug, Clone)]
pub struct ForCookie<T> {
    pub payload: T,
    pub token: String,
    pub lifetime: Duration,
    pub secure: bool,
}

impl<T> ForCookie<T> {
    pub fn new(payload: T, token: impl Into<String>, lifetime: Duration, secure: bool) -> Self {
        Self {
            payload,
            token: token.into(),
            lifetime,
            secure,
        }
    }

    fn cookie(&self) -> Cookie<'static> {
        let expires = OffsetDateTime::now_utc() + time::Duration::seconds(self.lifetime.num_seconds());
        Cookie::build((JWT_COOKIE, self.token.clone()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .expires(expires)
            .build()
    }
}

impl ForCookie<String> {
    /// Clears the session: empty token expiring in ten seconds.
    pub fn logout() -> Self {
        Self::new(String::new(), String::new(), Duration::seconds(10), false)
    }
}

impl<T: Serialize> IntoResponse for ForCookie<T> {
    fn into_response(self) -> Response {
        let cookie = self.cookie().to_string();
        let mut response = Envelope::success(self.payload).into_response();
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => tracing::error!("Invalid session cookie header: {}", e),
        }
        response
    }
}
