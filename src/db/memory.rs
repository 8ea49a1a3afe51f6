//! In-memory store for service tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::db::models::*;
use crate::db::store::*;
use crate::error::{AppError, AppResult};
use crate::recurrence::RecurrenceKind;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    events: Vec<EventDefinition>,
    exceptions: Vec<EventException>,
    routines: Vec<RoutineDefinition>,
    completions: Vec<CompletionRecord>,
    tasks: Vec<Task>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Makes `find_events_in_range` fail, to exercise callers that treat it
    /// as best effort.
    pub fail_range_queries: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_count(&self) -> usize {
        self.tables.lock().unwrap().events.len()
    }

    pub fn exception_count(&self) -> usize {
        self.tables.lock().unwrap().exceptions.len()
    }

    pub fn completion_count(&self) -> usize {
        self.tables.lock().unwrap().completions.len()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn get_event(&self, id: &str) -> AppResult<Option<EventDefinition>> {
        let t = self.tables.lock().unwrap();
        Ok(t.events.iter().find(|e| e.id == id).cloned())
    }

    async fn list_events_by_user(&self, user_id: &str) -> AppResult<Vec<EventDefinition>> {
        let t = self.tables.lock().unwrap();
        Ok(t.events.iter().filter(|e| e.user_id == user_id).cloned().collect())
    }

    async fn find_events_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<EventDefinition>> {
        if self.fail_range_queries.load(Ordering::SeqCst) {
            return Err(AppError::Internal(anyhow::anyhow!("range query disabled")));
        }
        let t = self.tables.lock().unwrap();
        Ok(t.events
            .iter()
            .filter(|e| e.user_id == user_id)
            .filter(|e| {
                if e.is_recurring() {
                    e.start_date <= end && e.rule.until.map_or(true, |u| u >= start.date_naive())
                } else {
                    e.start_date >= start && e.start_date <= end
                }
            })
            .cloned()
            .collect())
    }

    async fn create_event(&self, event: &EventDefinition) -> AppResult<()> {
        let mut t = self.tables.lock().unwrap();
        if t.events.iter().any(|e| e.id == event.id) {
            return Err(AppError::Conflict(format!("duplicate event id {}", event.id)));
        }
        t.events.push(event.clone());
        Ok(())
    }

    async fn update_event(&self, event: &EventDefinition) -> AppResult<EventDefinition> {
        let mut t = self.tables.lock().unwrap();
        match t.events.iter_mut().find(|e| e.id == event.id && e.version == event.version) {
            Some(slot) => {
                *slot = EventDefinition {
                    version: event.version + 1,
                    ..event.clone()
                };
                Ok(slot.clone())
            }
            None => Err(AppError::Conflict(format!(
                "event {} was changed by another request; reload and retry",
                event.id
            ))),
        }
    }

    async fn delete_event(&self, id: &str) -> AppResult<()> {
        let mut t = self.tables.lock().unwrap();
        t.events.retain(|e| e.id != id);
        t.exceptions.retain(|e| e.event_id != id);
        Ok(())
    }

    async fn split_series(
        &self,
        truncated: &EventDefinition,
        created: &EventDefinition,
    ) -> AppResult<EventDefinition> {
        let mut t = self.tables.lock().unwrap();
        if t.events.iter().any(|e| e.id == created.id) {
            return Err(AppError::Conflict(format!("duplicate event id {}", created.id)));
        }
        let slot = t
            .events
            .iter_mut()
            .find(|e| e.id == truncated.id && e.version == truncated.version)
            .ok_or_else(|| AppError::Conflict(format!("event {} was changed", truncated.id)))?;
        *slot = EventDefinition {
            version: truncated.version + 1,
            ..truncated.clone()
        };
        let stored = slot.clone();
        t.events.push(created.clone());
        Ok(stored)
    }
}

#[async_trait]
impl ExceptionStore for MemoryStore {
    async fn upsert_exception(&self, exception: &EventException) -> AppResult<EventException> {
        let mut t = self.tables.lock().unwrap();
        t.exceptions.retain(|e| {
            !(e.event_id == exception.event_id && e.original_date == exception.original_date)
        });
        t.exceptions.push(exception.clone());
        Ok(exception.clone())
    }

    async fn get_exception(&self, id: &str) -> AppResult<Option<EventException>> {
        let t = self.tables.lock().unwrap();
        Ok(t.exceptions.iter().find(|e| e.id == id).cloned())
    }

    async fn find_exceptions(&self, event_id: &str) -> AppResult<Vec<EventException>> {
        let t = self.tables.lock().unwrap();
        let mut out: Vec<_> = t.exceptions.iter().filter(|e| e.event_id == event_id).cloned().collect();
        out.sort_by_key(|e| e.original_date);
        Ok(out)
    }

    async fn find_exceptions_in_range(
        &self,
        event_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<EventException>> {
        let t = self.tables.lock().unwrap();
        Ok(t.exceptions
            .iter()
            .filter(|e| e.event_id == event_id && e.original_date >= start && e.original_date <= end)
            .cloned()
            .collect())
    }

    async fn delete_exception(&self, id: &str) -> AppResult<()> {
        let mut t = self.tables.lock().unwrap();
        t.exceptions.retain(|e| e.id != id);
        Ok(())
    }
}

#[async_trait]
impl RoutineStore for MemoryStore {
    async fn get_routine(&self, id: &str) -> AppResult<Option<RoutineDefinition>> {
        let t = self.tables.lock().unwrap();
        Ok(t.routines.iter().find(|r| r.id == id).cloned())
    }

    async fn list_routines_by_user(
        &self,
        user_id: &str,
        kind: Option<RecurrenceKind>,
    ) -> AppResult<Vec<RoutineDefinition>> {
        let t = self.tables.lock().unwrap();
        Ok(t.routines
            .iter()
            .filter(|r| r.user_id == user_id && kind.map_or(true, |k| r.rule.kind == k))
            .cloned()
            .collect())
    }

    async fn create_routine(&self, routine: &RoutineDefinition) -> AppResult<()> {
        self.tables.lock().unwrap().routines.push(routine.clone());
        Ok(())
    }

    async fn update_routine(&self, routine: &RoutineDefinition) -> AppResult<()> {
        let mut t = self.tables.lock().unwrap();
        if let Some(slot) = t.routines.iter_mut().find(|r| r.id == routine.id) {
            *slot = routine.clone();
        }
        Ok(())
    }

    async fn delete_routine(&self, id: &str) -> AppResult<()> {
        let mut t = self.tables.lock().unwrap();
        t.routines.retain(|r| r.id != id);
        t.completions.retain(|c| c.routine_id != id);
        Ok(())
    }
}

#[async_trait]
impl CompletionStore for MemoryStore {
    async fn completion_for_date(
        &self,
        routine_id: &str,
        date: NaiveDate,
    ) -> AppResult<Option<CompletionRecord>> {
        let t = self.tables.lock().unwrap();
        Ok(t.completions
            .iter()
            .find(|c| c.routine_id == routine_id && c.completed_on == date)
            .cloned())
    }

    async fn record_completion(
        &self,
        record: &CompletionRecord,
        streak: Option<StreakCounters>,
    ) -> AppResult<()> {
        let mut t = self.tables.lock().unwrap();
        if t.completions
            .iter()
            .any(|c| c.routine_id == record.routine_id && c.completed_on == record.completed_on)
        {
            return Err(AppError::AlreadyRecordedToday {
                routine_id: record.routine_id.clone(),
                date: record.completed_on,
            });
        }
        t.completions.push(record.clone());
        if let Some(counters) = streak {
            if let Some(routine) = t.routines.iter_mut().find(|r| r.id == record.routine_id) {
                routine.current_streak = counters.current;
                routine.longest_streak = counters.longest;
                routine.updated_at = record.created_at;
            }
        }
        Ok(())
    }

    async fn completion_history(
        &self,
        routine_id: &str,
        limit: i64,
    ) -> AppResult<Vec<CompletionRecord>> {
        let t = self.tables.lock().unwrap();
        let mut out: Vec<_> = t
            .completions
            .iter()
            .filter(|c| c.routine_id == routine_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.completed_on.cmp(&a.completed_on));
        out.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(out)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn count_users(&self) -> AppResult<i64> {
        Ok(self.tables.lock().unwrap().users.len() as i64)
    }

    async fn find_user_by_id(&self, id: &str) -> AppResult<Option<User>> {
        let t = self.tables.lock().unwrap();
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let t = self.tables.lock().unwrap();
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: CreateUser, now: DateTime<Utc>) -> AppResult<User> {
        let mut t = self.tables.lock().unwrap();
        if t.users.iter().any(|u| u.email == user.email) {
            return Err(AppError::Conflict(format!(
                "a user with email {} already exists",
                user.email
            )));
        }
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: user.email,
            password_hash: user.password_hash,
            name: user.name,
            timezone: "UTC".to_string(),
            created_at: now,
            updated_at: now,
        };
        t.users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn get_task(&self, id: &str) -> AppResult<Option<Task>> {
        let t = self.tables.lock().unwrap();
        Ok(t.tasks.iter().find(|task| task.id == id).cloned())
    }

    async fn list_tasks_by_user(&self, user_id: &str) -> AppResult<Vec<Task>> {
        let t = self.tables.lock().unwrap();
        Ok(t.tasks.iter().filter(|task| task.user_id == user_id).cloned().collect())
    }

    async fn create_task(&self, task: &Task) -> AppResult<()> {
        self.tables.lock().unwrap().tasks.push(task.clone());
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> AppResult<()> {
        let mut t = self.tables.lock().unwrap();
        if let Some(slot) = t.tasks.iter_mut().find(|existing| existing.id == task.id) {
            *slot = task.clone();
        }
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> AppResult<()> {
        self.tables.lock().unwrap().tasks.retain(|task| task.id != id);
        Ok(())
    }
}
