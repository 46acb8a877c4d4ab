//! Session resolution and per-route authorization
//!
//! [`resolve`] runs on every request and stores a [`Session`] in the request
//! extensions. Routes that need a user wrap themselves in [`authorize`],
//! and handlers read the user through [`CurrentUser`] or [`MaybeUser`].

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use tourbook_core::{Role, User};

use crate::db::repos::{DbError, UserRepo};
use crate::http::controller::Access;
use crate::http::envelope::JWT_COOKIE;
use crate::http::error::ApiError;
use crate::state::AppState;

/// Outcome of looking at the request's credentials.
#[derive(Debug, Clone)]
pub enum Session {
    /// No token at all
    Anonymous,
    /// A token was sent but is not usable
    Rejected(ApiError),
    Authenticated(CurrentUser),
}

/// Bearer header first, then the `jwt` cookie. Empty values count as absent.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_owned());
    }

    CookieJar::from_headers(headers)
        .get(JWT_COOKIE)
        .map(|c| c.value().trim().to_owned())
        .filter(|t| !t.is_empty())
}

/// Verify a token and load the user it belongs to.
pub async fn authenticate(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = state.keys().verify(token)?;

    let user = match UserRepo::new(state.pool()).get(claims.id).await {
        Ok(user) => user,
        Err(DbError::NotFound { .. }) => {
            return Err(ApiError::unauthorized(
                "The user belonging to this token no longer exists",
            ))
        }
        Err(e) => return Err(e.into()),
    };

    if user.changed_password_after(claims.iat) {
        return Err(ApiError::unauthorized(
            "User recently changed password! Please log in again",
        ));
    }
    Ok(user)
}

/// Global middleware: attach a [`Session`] to every request.
pub async fn resolve(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let session = match token_from_headers(request.headers()) {
        None => Session::Anonymous,
        Some(token) => match authenticate(&state, &token).await {
            Ok(user) => Session::Authenticated(CurrentUser(user)),
            Err(e) => {
                tracing::debug!(error = %e, "session rejected");
                Session::Rejected(e)
            }
        },
    };
    request.extensions_mut().insert(session);
    next.run(request).await
}

/// Decide whether a session satisfies an access rule.
pub fn check(access: Access, session: Option<&Session>) -> Result<(), ApiError> {
    let required: &[Role] = match access {
        Access::Public => return Ok(()),
        Access::Authenticated => &[],
        Access::Roles(roles) => roles,
    };

    let user = match session {
        Some(Session::Authenticated(CurrentUser(user))) => user,
        Some(Session::Rejected(e)) => return Err(e.clone()),
        Some(Session::Anonymous) | None => {
            return Err(ApiError::unauthorized("Please login to get this route"))
        }
    };

    if !required.is_empty() && !required.contains(&user.role) {
        let names: Vec<&str> = required.iter().map(Role::as_str).collect();
        return Err(ApiError::forbidden(format!(
            "{} role cannot access this content. Required: {}",
            user.role,
            names.join(", ")
        )));
    }
    Ok(())
}

/// Route middleware enforcing `access`.
pub async fn authorize(access: Access, request: Request, next: Next) -> Response {
    match check(access, request.extensions().get::<Session>()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::debug!(error = %e, path = %request.uri().path(), "authorization failed");
            e.into_response()
        }
    }
}

/// The logged-in user. Rejects with 401 when there is none.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.0.role == Role::Admin
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Session>() {
            Some(Session::Authenticated(user)) => Ok(user.clone()),
            Some(Session::Rejected(e)) => Err(e.clone()),
            _ => Err(ApiError::unauthorized("Please login to get this route")),
        }
    }
}

/// The logged-in user if any; never rejects.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(match parts.extensions.get::<Session>() {
            Some(Session::Authenticated(CurrentUser(user))) => Self(Some(user.clone())),
            _ => Self(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;
    use uuid::Uuid;

    fn user(role: Role) -> Session {
        Session::Authenticated(CurrentUser(User {
            id: Uuid::new_v4(),
            name: "Leo Gillespie".into(),
            email: "leo@example.com".into(),
            role,
            photo: "default.jpg".into(),
            created_at: Utc::now(),
            password_changed_at: None,
        }))
    }

    #[test]
    fn bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        headers.insert("cookie", HeaderValue::from_static("jwt=from-cookie"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn cookie_fallback_and_empty_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("theme=dark; jwt=from-cookie"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("from-cookie"));

        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("jwt="));
        assert_eq!(token_from_headers(&headers), None);
    }

    #[test]
    fn public_always_passes() {
        assert!(check(Access::Public, None).is_ok());
        assert!(check(Access::Public, Some(&Session::Anonymous)).is_ok());
    }

    #[test]
    fn anonymous_needs_login() {
        let err = check(Access::Authenticated, Some(&Session::Anonymous)).unwrap_err();
        assert_eq!(err.to_string(), "Please login to get this route");
    }

    #[test]
    fn rejected_session_keeps_reason() {
        let session = Session::Rejected(ApiError::unauthorized("Token expired, please login again"));
        let err = check(Access::Authenticated, Some(&session)).unwrap_err();
        assert_eq!(err.to_string(), "Token expired, please login again");
    }

    #[test]
    fn role_mismatch_is_forbidden() {
        let access = Access::Roles(&[Role::Admin, Role::LeadGuide]);
        let err = check(access, Some(&user(Role::Guide))).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert_eq!(
            err.to_string(),
            "guide role cannot access this content. Required: admin, lead-guide"
        );
        assert!(check(access, Some(&user(Role::LeadGuide))).is_ok());
    }

    async fn maybe_user(session: Option<Session>) -> MaybeUser {
        let mut request = axum::http::Request::new(());
        if let Some(session) = session {
            request.extensions_mut().insert(session);
        }
        let (mut parts, _) = request.into_parts();
        MaybeUser::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn maybe_user_never_rejects() {
        assert!(maybe_user(None).await.0.is_none());
        let rejected = Session::Rejected(ApiError::unauthorized("Invalid signature. Please login again"));
        assert!(maybe_user(Some(rejected)).await.0.is_none());
        let found = maybe_user(Some(user(Role::User))).await;
        assert_eq!(found.0.map(|u| u.name).as_deref(), Some("Leo Gillespie"));
    }
}
