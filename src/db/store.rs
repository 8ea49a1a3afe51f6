//! Storage seams used by the services.
//!
//! Every method is scoped by id only; ownership checks happen in the
//! services, which treat another user's record exactly like a missing one.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::db::models::*;
use crate::error::AppResult;
use crate::recurrence::RecurrenceKind;

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn get_event(&self, id: &str) -> AppResult<Option<EventDefinition>>;

    async fn list_events_by_user(&self, user_id: &str) -> AppResult<Vec<EventDefinition>>;

    /// Definitions that may have an occurrence in `[start, end]`: single
    /// events starting in the window and series that started before the
    /// window closes and have not ended before it opens.
    async fn find_events_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<EventDefinition>>;

    async fn create_event(&self, event: &EventDefinition) -> AppResult<()>;

    /// Overwrite `event` if its stored version still equals `event.version`.
    /// Returns the stored definition with the bumped version, or
    /// `AppError::Conflict` when another write got there first.
    async fn update_event(&self, event: &EventDefinition) -> AppResult<EventDefinition>;

    async fn delete_event(&self, id: &str) -> AppResult<()>;

    /// Truncate one series and create its continuation atomically.
    async fn split_series(
        &self,
        truncated: &EventDefinition,
        created: &EventDefinition,
    ) -> AppResult<EventDefinition>;
}

#[async_trait]
pub trait ExceptionStore: Send + Sync {
    /// Insert or replace the exception for `(event_id, original_date)`.
    async fn upsert_exception(&self, exception: &EventException) -> AppResult<EventException>;

    async fn get_exception(&self, id: &str) -> AppResult<Option<EventException>>;

    async fn find_exceptions(&self, event_id: &str) -> AppResult<Vec<EventException>>;

    async fn find_exceptions_in_range(
        &self,
        event_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<EventException>>;

    async fn delete_exception(&self, id: &str) -> AppResult<()>;
}

#[async_trait]
pub trait RoutineStore: Send + Sync {
    async fn get_routine(&self, id: &str) -> AppResult<Option<RoutineDefinition>>;

    async fn list_routines_by_user(
        &self,
        user_id: &str,
        kind: Option<RecurrenceKind>,
    ) -> AppResult<Vec<RoutineDefinition>>;

    async fn create_routine(&self, routine: &RoutineDefinition) -> AppResult<()>;

    async fn update_routine(&self, routine: &RoutineDefinition) -> AppResult<()>;

    async fn delete_routine(&self, id: &str) -> AppResult<()>;
}

#[async_trait]
pub trait CompletionStore: Send + Sync {
    async fn completion_for_date(
        &self,
        routine_id: &str,
        date: NaiveDate,
    ) -> AppResult<Option<CompletionRecord>>;

    /// Store `record` and, when given, the routine's new streak counters in
    /// one transaction. A second record for the same routine and date fails
    /// with `AppError::AlreadyRecordedToday` and changes nothing.
    async fn record_completion(
        &self,
        record: &CompletionRecord,
        streak: Option<StreakCounters>,
    ) -> AppResult<()>;

    /// Most recent records first.
    async fn completion_history(
        &self,
        routine_id: &str,
        limit: i64,
    ) -> AppResult<Vec<CompletionRecord>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn count_users(&self) -> AppResult<i64>;

    async fn find_user_by_id(&self, id: &str) -> AppResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn create_user(&self, user: CreateUser, now: DateTime<Utc>) -> AppResult<User>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get_task(&self, id: &str) -> AppResult<Option<Task>>;

    async fn list_tasks_by_user(&self, user_id: &str) -> AppResult<Vec<Task>>;

    async fn create_task(&self, task: &Task) -> AppResult<()>;

    async fn update_task(&self, task: &Task) -> AppResult<()>;

    async fn delete_task(&self, id: &str) -> AppResult<()>;
}
