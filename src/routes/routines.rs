use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::non_empty;
use crate::db::models::{RoutineDefinition, RoutineFields, TimeType};
use crate::error::{AppError, AppResult};
use crate::recurrence::{
    parse_weekday_names, weekday_from_sunday_index, weekday_names, MonthDay, RecurrenceKind,
    RecurrenceRule,
};
use crate::routes::auth::AuthUser;
use crate::services::routines::RoutinePatch;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_routines).post(create_routine))
        .route("/today", get(todays_routines))
        .route(
            "/:id",
            get(get_routine).put(update_routine).delete(delete_routine),
        )
        .route("/:id/complete", patch(complete_routine))
        .route("/:id/skip", patch(skip_routine))
        .route("/:id/history", get(routine_history))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub frequency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineRequest {
    pub title: String,
    pub frequency: String,
    #[serde(default)]
    pub weekdays: Vec<String>,
    /// Legacy single weekday, 0 = Sunday.
    pub weekday: Option<i64>,
    pub day_of_month: Option<u32>,
    pub quarterly_day: Option<u32>,
    pub yearly_date: Option<MonthDay>,
    #[serde(default)]
    pub is_skippable: bool,
    #[serde(default)]
    pub show_streak: bool,
    pub time_type: String,
    pub specific_time: Option<String>,
}

impl RoutineRequest {
    fn into_fields(self) -> AppResult<RoutineFields> {
        let kind: RecurrenceKind = self.frequency.parse()?;

        let mut weekdays = parse_weekday_names(&self.weekdays)?;
        if let Some(index) = self.weekday {
            weekdays.push(weekday_from_sunday_index(index)?);
        }

        let (day_of_month, month) = match kind {
            RecurrenceKind::Monthly => (self.day_of_month, None),
            RecurrenceKind::Quarterly => (self.quarterly_day, None),
            RecurrenceKind::Yearly => match self.yearly_date {
                Some(md) => (Some(md.day), Some(md.month)),
                None => (None, None),
            },
            _ => (None, None),
        };

        Ok(RoutineFields {
            title: self.title,
            rule: RecurrenceRule {
                kind,
                weekdays,
                day_of_month,
                month,
                until: None,
            },
            is_skippable: self.is_skippable,
            show_streak: self.show_streak,
            time_type: self.time_type.parse::<TimeType>()?,
            specific_time: self.specific_time,
        })
    }
}

/// Partial update; absent fields keep their stored values.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoutineRequest {
    pub title: Option<String>,
    pub frequency: Option<String>,
    pub weekdays: Option<Vec<String>>,
    pub weekday: Option<i64>,
    pub day_of_month: Option<u32>,
    pub quarterly_day: Option<u32>,
    pub yearly_date: Option<MonthDay>,
    pub is_skippable: Option<bool>,
    pub show_streak: Option<bool>,
    pub time_type: Option<String>,
    pub specific_time: Option<String>,
}

impl UpdateRoutineRequest {
    fn into_patch(self) -> AppResult<RoutinePatch> {
        let weekdays = match (self.weekdays, self.weekday) {
            (None, None) => None,
            (names, index) => {
                let mut days = parse_weekday_names(&names.unwrap_or_default())?;
                if let Some(index) = index {
                    days.push(weekday_from_sunday_index(index)?);
                }
                Some(days)
            }
        };

        Ok(RoutinePatch {
            kind: non_empty(self.frequency.as_ref())
                .map(str::parse::<RecurrenceKind>)
                .transpose()?,
            time_type: non_empty(self.time_type.as_ref())
                .map(str::parse::<TimeType>)
                .transpose()?,
            specific_time: self
                .specific_time
                .map(|t| Some(t).filter(|t| !t.trim().is_empty())),
            title: self.title,
            weekdays,
            day_of_month: self.day_of_month,
            quarterly_day: self.quarterly_day,
            yearly_date: self.yearly_date,
            is_skippable: self.is_skippable,
            show_streak: self.show_streak,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineResponse {
    pub id: String,
    pub title: String,
    pub frequency: &'static str,
    pub weekdays: Option<Vec<String>>,
    pub weekday: Option<u32>,
    pub day_of_month: Option<u32>,
    pub quarterly_day: Option<u32>,
    pub yearly_date: Option<MonthDay>,
    pub is_skippable: bool,
    pub show_streak: bool,
    pub time_type: TimeType,
    pub specific_time: Option<String>,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RoutineDefinition> for RoutineResponse {
    fn from(r: RoutineDefinition) -> Self {
        let rule = &r.rule;
        let weekly = rule.kind == RecurrenceKind::Weekly;
        RoutineResponse {
            id: r.id.clone(),
            title: r.title.clone(),
            frequency: rule.kind.label(),
            weekdays: weekly.then(|| weekday_names(&rule.weekdays)),
            weekday: if weekly {
                rule.weekdays.first().map(|d| d.num_days_from_sunday())
            } else {
                None
            },
            day_of_month: (rule.kind == RecurrenceKind::Monthly)
                .then_some(rule.day_of_month)
                .flatten(),
            quarterly_day: (rule.kind == RecurrenceKind::Quarterly)
                .then_some(rule.day_of_month)
                .flatten(),
            yearly_date: rule.month_day(),
            is_skippable: r.is_skippable,
            show_streak: r.show_streak,
            time_type: r.time_type,
            specific_time: r.specific_time,
            current_streak: r.current_streak,
            longest_streak: r.longest_streak,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

fn routine_list(routines: Vec<RoutineDefinition>) -> Json<serde_json::Value> {
    let routines: Vec<RoutineResponse> = routines.into_iter().map(Into::into).collect();
    Json(json!({ "routines": routines }))
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_routines(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let kind = non_empty(query.frequency.as_ref())
        .map(str::parse::<RecurrenceKind>)
        .transpose()?;
    let routines = state.routines().list_routines(&user.id, kind).await?;
    Ok(routine_list(routines))
}

async fn todays_routines(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let routines = state.routines().todays_routines(&user.id).await?;
    Ok(routine_list(routines))
}

async fn create_routine(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<RoutineRequest>,
) -> Result<impl IntoResponse, AppError> {
    let routine = state
        .routines()
        .create_routine(&user.id, request.into_fields()?)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Routine created successfully",
            "routine": RoutineResponse::from(routine),
        })),
    ))
}

async fn get_routine(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let routine = state.routines().get_routine(&id, &user.id).await?;
    Ok(Json(json!({ "routine": RoutineResponse::from(routine) })))
}

async fn update_routine(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateRoutineRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let routine = state
        .routines()
        .update_routine(&id, &user.id, request.into_patch()?)
        .await?;

    Ok(Json(json!({
        "message": "Routine updated successfully",
        "routine": RoutineResponse::from(routine),
    })))
}

async fn delete_routine(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.routines().delete_routine(&id, &user.id).await?;
    Ok(Json(json!({ "message": "Routine deleted successfully" })))
}

async fn complete_routine(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let routine = state.routines().complete_routine(&id, &user.id).await?;
    Ok(Json(json!({
        "message": "Routine completed successfully",
        "routine": RoutineResponse::from(routine),
    })))
}

async fn skip_routine(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let routine = state.routines().skip_routine(&id, &user.id).await?;
    Ok(Json(json!({
        "message": "Routine skipped successfully",
        "routine": RoutineResponse::from(routine),
    })))
}

async fn routine_history(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let history = state.routines().history(&id, &user.id, query.limit).await?;
    Ok(Json(json!({ "history": history })))
}
