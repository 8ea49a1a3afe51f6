use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub timestamp: String,
}

/// Liveness plus a trivial database round trip. A broken database yields 503.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_ok = sqlx::query("SELECT 1")
        .execute(state.store.pool())
        .await
        .map_err(|e| tracing::error!("Health check database ping failed: {:?}", e))
        .is_ok();

    let (code, status, database) = if db_ok {
        (StatusCode::OK, "healthy", "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unavailable")
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        database,
        timestamp: state.clock.now().to_rfc3339(),
    };

    (code, Json(response))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use http::StatusCode;

    use crate::routes::testing::TestApp;

    #[tokio::test]
    async fn reports_healthy_with_a_working_database() {
        let app = TestApp::on(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()).await;
        let (status, body) = app.send("GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "ok");
        assert_eq!(body["timestamp"], "2024-05-01T12:00:00+00:00");
    }
}
