use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::{non_empty, parse_instant};
use crate::db::models::{TaskFields, TaskPriority, TaskStatus};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::services::tasks::{TaskFilter, TaskPatch, TimeFilter};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/:id", get(get_task).put(update_task).delete(delete_task))
        .route("/:id/status", patch(toggle_status))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQuery {
    pub domain: Option<String>,
    pub status: Option<String>,
    pub time_filter: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub domain: String,
    pub deadline: Option<String>,
}

/// Absent fields are left unchanged; an empty `deadline` clears it.
#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub domain: Option<String>,
    pub deadline: Option<String>,
}

/// Unknown or missing priorities fall back to Medium.
fn priority_or_default(raw: Option<&String>) -> TaskPriority {
    non_empty(raw)
        .and_then(|p| p.parse().ok())
        .unwrap_or_default()
}

fn parse_deadline(raw: Option<&String>) -> AppResult<Option<chrono::DateTime<chrono::Utc>>> {
    non_empty(raw)
        .map(|v| parse_instant("deadline", v))
        .transpose()
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<TaskQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let filter = TaskFilter {
        domain: non_empty(query.domain.as_ref()).map(str::to_string),
        status: non_empty(query.status.as_ref())
            .map(str::parse::<TaskStatus>)
            .transpose()?,
        time: non_empty(query.time_filter.as_ref())
            .map(str::parse::<TimeFilter>)
            .transpose()?,
    };

    let tasks = state.tasks().list_tasks(&user.id, &filter).await?;
    Ok(Json(json!({ "tasks": tasks })))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    let fields = TaskFields {
        priority: priority_or_default(request.priority.as_ref()),
        deadline: parse_deadline(request.deadline.as_ref())?,
        title: request.title,
        description: request.description.filter(|d| !d.is_empty()),
        domain: request.domain,
    };
    let task = state.tasks().create_task(&user.id, fields).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Task created successfully", "task": task })),
    ))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let task = state.tasks().get_task(&id, &user.id).await?;
    Ok(Json(json!({ "task": task })))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateTaskRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let patch = TaskPatch {
        deadline: match &request.deadline {
            Some(_) => Some(parse_deadline(request.deadline.as_ref())?),
            None => None,
        },
        priority: non_empty(request.priority.as_ref()).and_then(|p| p.parse().ok()),
        domain: non_empty(request.domain.as_ref()).map(str::to_string),
        title: request.title,
        description: request.description,
    };
    let task = state.tasks().update_task(&id, &user.id, patch).await?;
    Ok(Json(json!({ "message": "Task updated successfully", "task": task })))
}

async fn toggle_status(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let task = state.tasks().toggle_status(&id, &user.id).await?;
    Ok(Json(json!({ "message": "Task status toggled successfully", "task": task })))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.tasks().delete_task(&id, &user.id).await?;
    Ok(Json(json!({ "message": "Task deleted successfully" })))
}
