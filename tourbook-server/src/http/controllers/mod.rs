//! Controllers grouped by resource

pub mod auth;
pub mod health;
pub mod reviews;
pub mod service;
pub mod tours;
pub mod users;
pub mod views;

pub use auth::AuthController;
pub use health::HealthController;
pub use reviews::ReviewsController;
pub use service::ServiceController;
pub use tours::ToursController;
pub use users::UsersController;
pub use views::ViewsController;

use serde::Serialize;
use serde_json::Value;
use tourbook_core::Projection;

use super::error::ApiError;

/// Serialize `data` and keep only the projected fields.
pub(crate) fn project<T: Serialize>(data: &T, projection: &Projection) -> Result<Value, ApiError> {
    let value = serde_json::to_value(data)
        .map_err(|e| ApiError::internal(format!("serialization failed: {}", e)))?;
    Ok(projection.apply(value))
}

#[cfg(test)]
pub(crate) mod testing {
    use axum::body::{to_bytes, Body};
    use axum::http::{HeaderMap, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::http::server::build_router;
    use crate::state::{testing, AppState};

    /// Small request builder for router tests.
    pub struct TestRequest {
        builder: axum::http::request::Builder,
        body: Body,
    }

    pub fn request(method: &str, uri: &str) -> TestRequest {
        TestRequest {
            builder: Request::builder().method(method).uri(uri),
            body: Body::empty(),
        }
    }

    impl TestRequest {
        pub fn json(mut self, value: Value) -> Self {
            self.builder = self.builder.header("content-type", "application/json");
            self.body = Body::from(value.to_string());
            self
        }

        pub fn header(mut self, name: &str, value: &str) -> Self {
            self.builder = self.builder.header(name, value);
            self
        }

        pub fn bearer(self, token: &str) -> Self {
            self.header("authorization", &format!("Bearer {}", token))
        }
    }

    /// Send through the full router over a pool that never connects.
    pub async fn send(req: TestRequest) -> (StatusCode, Value, HeaderMap) {
        send_with(testing::state(), req).await
    }

    pub async fn send_with(state: AppState, req: TestRequest) -> (StatusCode, Value, HeaderMap) {
        let response = build_router(state)
            .oneshot(req.builder.body(req.body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body, headers)
    }
}
