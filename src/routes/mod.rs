use std::sync::Arc;

use axum::{routing::get, Router};
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{AppError, AppResult};
use crate::AppState;

pub mod auth;
pub mod events;
pub mod health;
pub mod routines;
pub mod tasks;

/// Authenticated API plus health. The rate-limited public auth endpoints
/// live in [`auth::public_router`] and are merged by the caller.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .merge(auth::router())
        .nest("/api/events", events::router())
        .nest("/api/routines", routines::router())
        .nest("/api/tasks", tasks::router())
}

/// Parse an RFC 3339 timestamp from a request field.
pub(crate) fn parse_instant(field: &str, value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AppError::BadRequest(format!("invalid {} format", field)))
}

/// Parse a calendar date given either as `YYYY-MM-DD` or as an RFC 3339
/// timestamp (its UTC date is used).
pub(crate) fn parse_date(field: &str, value: &str) -> AppResult<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| parse_instant(field, value).map(|dt| dt.date_naive()))
        .map_err(|_| AppError::BadRequest(format!("invalid {} format", field)))
}

/// Treat empty strings from the frontend as absent.
pub(crate) fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::Router;
    use chrono::NaiveDate;
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::clock::{Clock, FixedClock};
    use crate::config::Config;
    use crate::db::testing::test_store;
    use crate::AppState;

    pub const TEST_SECRET: &str = "test-secret-test-secret-test-secret";

    pub struct TestApp {
        pub router: Router,
        pub clock: Arc<FixedClock>,
        pub token: String,
    }

    impl TestApp {
        /// App with one account already set up, clock on `today`.
        pub async fn on(today: NaiveDate) -> Self {
            let mut config = Config::default();
            config.jwt.secret = TEST_SECRET.to_string();
            config.security.bcrypt_cost = 4;

            let clock = Arc::new(FixedClock::on(today));
            let state = Arc::new(AppState {
                store: test_store().await,
                config,
                clock: clock.clone() as Arc<dyn Clock>,
            });
            let router = super::router()
                .merge(super::auth::public_router())
                .with_state(state);

            let mut app = TestApp {
                router,
                clock,
                token: String::new(),
            };
            let (status, body) = app
                .send(
                    "POST",
                    "/api/setup",
                    Some(serde_json::json!({
                        "name": "Ada",
                        "email": "ada@example.com",
                        "password": "Secret123"
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{}", body);
            app.token = body["accessToken"].as_str().unwrap().to_string();
            app
        }

        pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if !self.token.is_empty() {
                builder = builder.header("authorization", format!("Bearer {}", self.token));
            }
            let request = match body {
                Some(json) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, json)
        }
    }
}
