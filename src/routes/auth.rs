use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::User;
use crate::error::AppError;
use crate::services::auth::IssuedToken;
use crate::AppState;

/// Endpoints that need a token (plus the setup status probe).
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(logout))
}

/// Credential endpoints. `main` wraps these in the per-IP rate limiter.
pub fn public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/setup", post(setup))
        .route("/api/auth/login", post(login))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub needs_setup: bool,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub message: &'static str,
    pub user: User,
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
}

impl AuthResponse {
    fn new(message: &'static str, user: User, token: IssuedToken) -> Self {
        AuthResponse {
            message,
            user,
            access_token: token.token,
            token_type: "Bearer",
            expires_at: token.expires_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, AppError> {
    Ok(Json(StatusResponse {
        needs_setup: state.auth().needs_setup().await?,
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Create the one and only account.
async fn setup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, token) = state
        .auth()
        .setup(&request.name, &request.email, &request.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse::new("Account created successfully", user, token)),
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let (user, token) = state.auth().login(&request.email, &request.password).await?;
    Ok(Json(AuthResponse::new("Login successful", user, token)))
}

async fn me(AuthUser(user): AuthUser) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "user": user }))
}

/// Tokens are stateless; the endpoint exists so the frontend can call it.
async fn logout(AuthUser(user): AuthUser) -> Json<serde_json::Value> {
    tracing::debug!("User {} logged out", user.id);
    Json(serde_json::json!({ "message": "Logout successful" }))
}

// ============================================================================
// Auth Extractor
// ============================================================================

/// Extractor for authenticated user
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::debug!("Missing or invalid Authorization header");
                AppError::Unauthorized
            })?;

        if !auth_header.to_ascii_lowercase().starts_with("bearer ") {
            tracing::debug!("Authorization header doesn't start with 'Bearer '");
            return Err(AppError::Unauthorized);
        }

        let token = auth_header[7..].trim();
        if token.is_empty() {
            tracing::debug!("Empty bearer token in Authorization header");
            return Err(AppError::Unauthorized);
        }

        let user = state.auth().user_from_token(token).await.map_err(|e| {
            tracing::debug!("Failed to get user from token: {:?}", e);
            AppError::Unauthorized
        })?;

        Ok(AuthUser(user))
    }
}
