use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{non_empty, parse_date, parse_instant};
use crate::db::models::{EventDefinition, EventException, EventFields, ExceptionChange, Occurrence};
use crate::error::{AppError, AppResult};
use crate::recurrence::{parse_weekday_names, weekday_names, RecurrenceKind, RecurrenceRule};
use crate::routes::auth::AuthUser;
use crate::services::events::{DeleteOutcome, EditOutcome, EditScope};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_events).post(create_event))
        .route("/:id", get(get_event).put(update_event).delete(delete_event))
        .route("/:id/exceptions", get(list_exceptions))
        .route("/:id/exceptions/:exception_id", delete(restore_occurrence))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: String,
    pub end: String,
}

/// `recurrenceDays` arrives either as a JSON array or as a string holding
/// a JSON-encoded array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecurrenceDays {
    List(Vec<String>),
    Encoded(String),
}

impl RecurrenceDays {
    fn names(&self) -> AppResult<Vec<String>> {
        match self {
            RecurrenceDays::List(names) => Ok(names.clone()),
            RecurrenceDays::Encoded(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            RecurrenceDays::Encoded(raw) => serde_json::from_str(raw)
                .map_err(|_| AppError::BadRequest("invalid recurrenceDays format".to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    pub title: String,
    pub start_date: String,
    pub end_date: Option<String>,
    #[serde(default)]
    pub all_day: bool,
    pub domain: String,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurrence_type: Option<String>,
    pub recurrence_end: Option<String>,
    pub recurrence_days: Option<RecurrenceDays>,
    #[serde(default)]
    pub hide_from_agenda: bool,
}

impl EventRequest {
    /// Convert into service fields. `rule` stays `None` when the request
    /// says nothing about recurrence.
    fn into_fields(self) -> AppResult<EventFields> {
        let start_date = parse_instant("start date", &self.start_date)?;
        let end_date = non_empty(self.end_date.as_ref())
            .map(|v| parse_instant("end date", v))
            .transpose()?;

        let kind = non_empty(self.recurrence_type.as_ref())
            .map(str::parse::<RecurrenceKind>)
            .transpose()?;
        let rule = match kind {
            Some(kind) => {
                let until = non_empty(self.recurrence_end.as_ref())
                    .map(|v| parse_date("recurrence end date", v))
                    .transpose()?;
                let weekdays = match &self.recurrence_days {
                    Some(days) => parse_weekday_names(&days.names()?)?,
                    None => Vec::new(),
                };
                Some(RecurrenceRule {
                    kind,
                    weekdays,
                    day_of_month: None,
                    month: None,
                    until,
                })
            }
            None if self.is_recurring => {
                return Err(AppError::Validation(
                    "recurrenceType is required for recurring events".to_string(),
                ))
            }
            None => None,
        };

        Ok(EventFields {
            title: self.title,
            domain: self.domain,
            start_date,
            end_date,
            all_day: self.all_day,
            rule,
            hide_from_agenda: self.hide_from_agenda,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    pub edit_scope: Option<String>,
    pub occurrence_date: Option<String>,
    #[serde(flatten)]
    pub event: EventRequest,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEventRequest {
    pub delete_scope: Option<String>,
    pub occurrence_date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub id: String,
    pub title: String,
    pub domain: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub is_recurring: bool,
    pub recurrence_type: Option<RecurrenceKind>,
    pub recurrence_days: Option<Vec<String>>,
    pub recurrence_end: Option<NaiveDate>,
    pub hide_from_agenda: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EventDefinition> for EventResponse {
    fn from(e: EventDefinition) -> Self {
        let recurring = e.is_recurring();
        EventResponse {
            id: e.id,
            title: e.title,
            domain: e.domain,
            start_date: e.start_date,
            end_date: e.end_date,
            all_day: e.all_day,
            is_recurring: recurring,
            recurrence_type: recurring.then_some(e.rule.kind),
            recurrence_days: (e.rule.kind == RecurrenceKind::Weekly)
                .then(|| weekday_names(&e.rule.weekdays)),
            recurrence_end: e.rule.until,
            hide_from_agenda: e.hide_from_agenda,
            version: e.version,
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OccurrenceResponse {
    pub id: String,
    pub title: String,
    pub domain: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub is_recurring: bool,
    pub recurrence_type: Option<RecurrenceKind>,
    pub recurrence_days: Option<Vec<String>>,
    pub recurrence_end: Option<NaiveDate>,
    pub hide_from_agenda: bool,
    pub occurrence_date: NaiveDate,
    pub is_exception: bool,
}

impl From<Occurrence> for OccurrenceResponse {
    fn from(o: Occurrence) -> Self {
        let recurring = o.rule.is_recurring();
        OccurrenceResponse {
            id: o.event_id,
            title: o.title,
            domain: o.domain,
            start_date: o.start_date,
            end_date: o.end_date,
            all_day: o.all_day,
            is_recurring: recurring,
            recurrence_type: recurring.then_some(o.rule.kind),
            recurrence_days: (o.rule.kind == RecurrenceKind::Weekly)
                .then(|| weekday_names(&o.rule.weekdays)),
            recurrence_end: o.rule.until,
            hide_from_agenda: o.hide_from_agenda,
            occurrence_date: o.occurrence_date,
            is_exception: o.is_exception,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionResponse {
    pub id: String,
    pub event_id: String,
    pub original_date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub modified_title: Option<String>,
    pub modified_start_date: Option<DateTime<Utc>>,
    pub modified_end_date: Option<DateTime<Utc>>,
    pub modified_domain: Option<String>,
    pub modified_all_day: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl From<EventException> for ExceptionResponse {
    fn from(e: EventException) -> Self {
        let kind = e.change.kind();
        let overrides = match e.change {
            ExceptionChange::Modified(overrides) => overrides,
            ExceptionChange::Deleted => Default::default(),
        };
        ExceptionResponse {
            id: e.id,
            event_id: e.event_id,
            original_date: e.original_date,
            kind,
            modified_title: overrides.title,
            modified_start_date: overrides.start_date,
            modified_end_date: overrides.end_date,
            modified_domain: overrides.domain,
            modified_all_day: overrides.all_day,
            created_at: e.created_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Expanded occurrences in `[start, end]`.
async fn list_events(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<RangeQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let start = parse_instant("start date", &query.start)?;
    let end = parse_instant("end date", &query.end)?;

    let occurrences = state.events().expand_occurrences(&user.id, start, end).await?;
    let events: Vec<OccurrenceResponse> = occurrences.into_iter().map(Into::into).collect();

    Ok(Json(json!({ "events": events })))
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<EventRequest>,
) -> Result<impl IntoResponse, AppError> {
    let fields = request.into_fields()?;
    let event = state.events().create_event(&user.id, fields).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Event created successfully",
            "event": EventResponse::from(event),
        })),
    ))
}

async fn get_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let event = state.events().get_event(&id, &user.id).await?;
    Ok(Json(json!({ "event": EventResponse::from(event) })))
}

async fn update_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateEventRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let scope = scope_or_all(request.edit_scope.as_ref())?;
    let occurrence_date = non_empty(request.occurrence_date.as_ref())
        .map(|v| parse_date("occurrence date", v))
        .transpose()?;
    let fields = request.event.into_fields()?;

    let outcome = state
        .events()
        .apply_edit(&id, &user.id, scope, occurrence_date, fields)
        .await?;

    Ok(Json(match outcome {
        EditOutcome::Unchanged(event) => json!({
            "message": "No changes",
            "event": EventResponse::from(event),
        }),
        EditOutcome::Exception { event, exception } => json!({
            "message": "Occurrence updated successfully",
            "event": EventResponse::from(event),
            "exception": ExceptionResponse::from(exception),
        }),
        EditOutcome::Split { truncated, created } => json!({
            "message": "Event updated successfully",
            "event": EventResponse::from(created),
            "previous": EventResponse::from(truncated),
        }),
        EditOutcome::Updated(event) => json!({
            "message": "Event updated successfully",
            "event": EventResponse::from(event),
        }),
    }))
}

/// Scope and date may come in a JSON body or in the query string.
async fn delete_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Query(query): Query<DeleteEventRequest>,
    body: Option<Json<DeleteEventRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let request = body.map(|Json(b)| b).unwrap_or(query);
    let scope = scope_or_all(request.delete_scope.as_ref())?;
    let occurrence_date = non_empty(request.occurrence_date.as_ref())
        .map(|v| parse_date("occurrence date", v))
        .transpose()?;

    let outcome = state
        .events()
        .apply_delete(&id, &user.id, scope, occurrence_date)
        .await?;

    Ok(Json(match outcome {
        DeleteOutcome::OccurrenceRemoved(exception) => json!({
            "message": "Occurrence deleted successfully",
            "exception": ExceptionResponse::from(exception),
        }),
        DeleteOutcome::SeriesTruncated(event) => json!({
            "message": "Following occurrences deleted successfully",
            "event": EventResponse::from(event),
        }),
        DeleteOutcome::Deleted => json!({ "message": "Event deleted successfully" }),
    }))
}

async fn list_exceptions(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let exceptions = state.events().list_exceptions(&id, &user.id).await?;
    let exceptions: Vec<ExceptionResponse> = exceptions.into_iter().map(Into::into).collect();
    Ok(Json(json!({ "exceptions": exceptions })))
}

async fn restore_occurrence(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((id, exception_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .events()
        .restore_occurrence(&id, &user.id, &exception_id)
        .await?;
    Ok(Json(json!({ "message": "Occurrence restored successfully" })))
}

fn scope_or_all(raw: Option<&String>) -> AppResult<EditScope> {
    non_empty(raw).map_or(Ok(EditScope::All), str::parse::<EditScope>)
}
