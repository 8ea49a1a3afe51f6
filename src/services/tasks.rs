use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::models::{Task, TaskFields, TaskPriority, TaskStatus, TASK_DOMAINS};
use crate::db::store::TaskStore;
use crate::error::{AppError, AppResult};

/// Deadline buckets offered by the task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFilter {
    /// No deadline at all.
    LongTerm,
    /// Open tasks whose deadline is before the start of today.
    Overdue,
    Today,
    Tomorrow,
    /// Rolling seven days from now.
    NextWeek,
    /// Rolling thirty days from now.
    NextMonth,
}

impl FromStr for TimeFilter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "long_term" => Ok(TimeFilter::LongTerm),
            "overdue" => Ok(TimeFilter::Overdue),
            "today" => Ok(TimeFilter::Today),
            "tomorrow" => Ok(TimeFilter::Tomorrow),
            "next_week" => Ok(TimeFilter::NextWeek),
            "next_month" => Ok(TimeFilter::NextMonth),
            other => Err(AppError::Validation(format!("invalid time filter: {}", other))),
        }
    }
}

impl TimeFilter {
    pub fn matches(&self, task: &Task, now: DateTime<Utc>) -> bool {
        let deadline = match (self, task.deadline) {
            (TimeFilter::LongTerm, deadline) => return deadline.is_none(),
            (_, None) => return false,
            (_, Some(deadline)) => deadline,
        };

        let today_start = now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc();
        let tomorrow_start = today_start + Duration::days(1);

        match self {
            TimeFilter::LongTerm => false,
            TimeFilter::Overdue => task.status == TaskStatus::Todo && deadline < today_start,
            TimeFilter::Today => deadline >= today_start && deadline < tomorrow_start,
            TimeFilter::Tomorrow => {
                deadline >= tomorrow_start && deadline < tomorrow_start + Duration::days(1)
            }
            TimeFilter::NextWeek => deadline > now && deadline < now + Duration::days(7),
            TimeFilter::NextMonth => deadline > now && deadline < now + Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub domain: Option<String>,
    pub status: Option<TaskStatus>,
    pub time: Option<TimeFilter>,
}

/// Partial update. `deadline: Some(None)` clears the deadline.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub priority: Option<TaskPriority>,
    pub deadline: Option<Option<DateTime<Utc>>>,
}

pub struct TaskService<'a, S: ?Sized> {
    store: &'a S,
    clock: &'a dyn Clock,
}

impl<'a, S: TaskStore + ?Sized> TaskService<'a, S> {
    pub fn new(store: &'a S, clock: &'a dyn Clock) -> Self {
        TaskService { store, clock }
    }

    pub async fn list_tasks(&self, user_id: &str, filter: &TaskFilter) -> AppResult<Vec<Task>> {
        let now = self.clock.now();
        let tasks = self.store.list_tasks_by_user(user_id).await?;

        Ok(tasks
            .into_iter()
            .filter(|t| filter.domain.as_ref().map_or(true, |d| &t.domain == d))
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.time.map_or(true, |f| f.matches(t, now)))
            .collect())
    }

    pub async fn get_task(&self, id: &str, user_id: &str) -> AppResult<Task> {
        self.store
            .get_task(id)
            .await?
            .filter(|t| t.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Task not found".to_string()))
    }

    pub async fn create_task(&self, user_id: &str, fields: TaskFields) -> AppResult<Task> {
        let title = fields.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::Validation("title is required".to_string()));
        }
        validate_domain(&fields.domain)?;

        let now = self.clock.now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title,
            description: fields.description,
            domain: fields.domain,
            priority: fields.priority,
            status: TaskStatus::Todo,
            deadline: fields.deadline,
            created_at: now,
            updated_at: now,
        };

        self.store.create_task(&task).await?;
        info!("Created task {} for user {}", task.id, user_id);
        Ok(task)
    }

    pub async fn update_task(&self, id: &str, user_id: &str, patch: TaskPatch) -> AppResult<Task> {
        let mut task = self.get_task(id, user_id).await?;

        if let Some(title) = patch.title.map(|t| t.trim().to_string()) {
            if !title.is_empty() {
                task.title = title;
            }
        }
        if let Some(description) = patch.description {
            task.description = Some(description).filter(|d| !d.is_empty());
        }
        if let Some(domain) = patch.domain {
            validate_domain(&domain)?;
            task.domain = domain;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(deadline) = patch.deadline {
            task.deadline = deadline;
        }
        task.updated_at = self.clock.now();

        self.store.update_task(&task).await?;
        Ok(task)
    }

    pub async fn toggle_status(&self, id: &str, user_id: &str) -> AppResult<Task> {
        let mut task = self.get_task(id, user_id).await?;
        task.status = task.status.toggled();
        task.updated_at = self.clock.now();

        self.store.update_task(&task).await?;
        info!("Task {} is now {}", task.id, task.status.as_str());
        Ok(task)
    }

    pub async fn delete_task(&self, id: &str, user_id: &str) -> AppResult<()> {
        let task = self.get_task(id, user_id).await?;
        self.store.delete_task(&task.id).await
    }
}

fn validate_domain(domain: &str) -> AppResult<()> {
    if TASK_DOMAINS.contains(&domain) {
        Ok(())
    } else {
        Err(AppError::Validation(format!("invalid domain: {}", domain)))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::clock::FixedClock;
    use crate::db::memory::MemoryStore;

    fn fields(title: &str, deadline: Option<DateTime<Utc>>) -> TaskFields {
        TaskFields {
            title: title.to_string(),
            description: None,
            domain: "Work".to_string(),
            priority: TaskPriority::default(),
            deadline,
        }
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn time_filters_bucket_deadlines() {
        let store = MemoryStore::new();
        let clock = FixedClock::on(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        let svc = TaskService::new(&store, &clock);

        svc.create_task("u1", fields("someday", None)).await.unwrap();
        svc.create_task("u1", fields("late", Some(at(8, 9)))).await.unwrap();
        svc.create_task("u1", fields("today", Some(at(10, 18)))).await.unwrap();
        svc.create_task("u1", fields("tomorrow", Some(at(11, 9)))).await.unwrap();
        svc.create_task("u1", fields("in three weeks", Some(at(31, 9)))).await.unwrap();

        let titles = |filter: TimeFilter| {
            let svc = &svc;
            async move {
                let filter = TaskFilter {
                    time: Some(filter),
                    ..Default::default()
                };
                svc.list_tasks("u1", &filter)
                    .await
                    .unwrap()
                    .into_iter()
                    .map(|t| t.title)
                    .collect::<Vec<_>>()
            }
        };

        assert_eq!(titles(TimeFilter::LongTerm).await, vec!["someday"]);
        assert_eq!(titles(TimeFilter::Overdue).await, vec!["late"]);
        assert_eq!(titles(TimeFilter::Today).await, vec!["today"]);
        assert_eq!(titles(TimeFilter::Tomorrow).await, vec!["tomorrow"]);
        assert_eq!(titles(TimeFilter::NextWeek).await, vec!["today", "tomorrow"]);
        assert_eq!(
            titles(TimeFilter::NextMonth).await,
            vec!["today", "tomorrow", "in three weeks"]
        );
    }

    #[tokio::test]
    async fn done_tasks_are_never_overdue() {
        let store = MemoryStore::new();
        let clock = FixedClock::on(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        let svc = TaskService::new(&store, &clock);

        let task = svc.create_task("u1", fields("late", Some(at(1, 9)))).await.unwrap();
        let toggled = svc.toggle_status(&task.id, "u1").await.unwrap();
        assert_eq!(toggled.status, TaskStatus::Done);

        let filter = TaskFilter {
            time: Some(TimeFilter::Overdue),
            ..Default::default()
        };
        assert!(svc.list_tasks("u1", &filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_validates_and_update_patches() {
        let store = MemoryStore::new();
        let clock = FixedClock::on(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        let svc = TaskService::new(&store, &clock);

        let mut bad = fields("x", None);
        bad.domain = "Travel".into();
        assert!(matches!(svc.create_task("u1", bad).await, Err(AppError::Validation(_))));
        assert!(matches!(
            svc.create_task("u1", fields(" ", None)).await,
            Err(AppError::Validation(_))
        ));

        let task = svc.create_task("u1", fields("Write report", Some(at(12, 9)))).await.unwrap();
        assert_eq!(task.priority, TaskPriority::Medium);

        let updated = svc
            .update_task(
                &task.id,
                "u1",
                TaskPatch {
                    priority: Some(TaskPriority::High),
                    deadline: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Write report");
        assert_eq!(updated.priority, TaskPriority::High);
        assert_eq!(updated.deadline, None);

        assert!(matches!(svc.get_task(&task.id, "u2").await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.delete_task(&task.id, "u2").await, Err(AppError::NotFound(_))));
        svc.delete_task(&task.id, "u1").await.unwrap();
    }

    #[test]
    fn unknown_time_filter_is_rejected() {
        assert!("next_year".parse::<TimeFilter>().is_err());
        assert_eq!("next_week".parse::<TimeFilter>().unwrap(), TimeFilter::NextWeek);
    }
}
