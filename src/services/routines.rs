use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime, Weekday};
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::models::{
    CompletionRecord, CompletionStatus, RoutineDefinition, RoutineFields, StreakCounters, TimeType,
};
use crate::db::store::{CompletionStore, RoutineStore};
use crate::error::{AppError, AppResult};
use crate::recurrence::calendar::matches_frequency;
use crate::recurrence::streak::streak_on_completion;
use crate::recurrence::{MonthDay, RecurrenceKind, RecurrenceRule};

pub const DEFAULT_HISTORY_LIMIT: i64 = 30;
pub const MAX_HISTORY_LIMIT: i64 = 365;

/// Partial routine update. `None` leaves the stored value alone.
///
/// Rule parts are read against the effective frequency: when the frequency
/// changes, only the parts sent with the patch survive.
#[derive(Debug, Default)]
pub struct RoutinePatch {
    pub title: Option<String>,
    pub kind: Option<RecurrenceKind>,
    pub weekdays: Option<Vec<Weekday>>,
    pub day_of_month: Option<u32>,
    pub quarterly_day: Option<u32>,
    pub yearly_date: Option<MonthDay>,
    pub is_skippable: Option<bool>,
    pub show_streak: Option<bool>,
    pub time_type: Option<TimeType>,
    pub specific_time: Option<Option<String>>,
}

impl RoutinePatch {
    fn merge_into(self, existing: &RoutineDefinition) -> RoutineFields {
        let base = &existing.rule;
        let kind = self.kind.unwrap_or(base.kind);
        let kept = |value: Option<u32>| if kind == base.kind { value } else { None };

        let (day_of_month, month) = match kind {
            RecurrenceKind::Monthly => (self.day_of_month.or(kept(base.day_of_month)), None),
            RecurrenceKind::Quarterly => (self.quarterly_day.or(kept(base.day_of_month)), None),
            RecurrenceKind::Yearly => match self.yearly_date {
                Some(md) => (Some(md.day), Some(md.month)),
                None => (kept(base.day_of_month), kept(base.month)),
            },
            _ => (None, None),
        };
        let weekdays = match self.weekdays {
            Some(days) => days,
            None if kind == base.kind => base.weekdays.clone(),
            None => Vec::new(),
        };

        RoutineFields {
            title: self.title.unwrap_or_else(|| existing.title.clone()),
            rule: RecurrenceRule {
                kind,
                weekdays,
                day_of_month,
                month,
                until: None,
            },
            is_skippable: self.is_skippable.unwrap_or(existing.is_skippable),
            show_streak: self.show_streak.unwrap_or(existing.show_streak),
            time_type: self.time_type.unwrap_or(existing.time_type),
            specific_time: self
                .specific_time
                .unwrap_or_else(|| existing.specific_time.clone()),
        }
    }
}

pub struct RoutineService<'a, S: ?Sized> {
    store: &'a S,
    clock: &'a dyn Clock,
    lookback_days: u32,
}

impl<'a, S> RoutineService<'a, S>
where
    S: RoutineStore + CompletionStore + ?Sized,
{
    pub fn new(store: &'a S, clock: &'a dyn Clock, lookback_days: u32) -> Self {
        RoutineService {
            store,
            clock,
            lookback_days,
        }
    }

    pub async fn list_routines(
        &self,
        user_id: &str,
        kind: Option<RecurrenceKind>,
    ) -> AppResult<Vec<RoutineDefinition>> {
        self.store.list_routines_by_user(user_id, kind).await
    }

    pub async fn get_routine(&self, id: &str, user_id: &str) -> AppResult<RoutineDefinition> {
        self.store
            .get_routine(id)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Routine not found".to_string()))
    }

    pub async fn create_routine(
        &self,
        user_id: &str,
        fields: RoutineFields,
    ) -> AppResult<RoutineDefinition> {
        let fields = validate_fields(fields)?;
        let now = self.clock.now();

        let routine = RoutineDefinition {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: fields.title,
            rule: fields.rule,
            is_skippable: fields.is_skippable,
            show_streak: fields.show_streak,
            time_type: fields.time_type,
            specific_time: fields.specific_time,
            current_streak: 0,
            longest_streak: 0,
            created_at: now,
            updated_at: now,
        };

        self.store.create_routine(&routine).await?;
        info!("Created routine {} for user {}", routine.id, user_id);
        Ok(routine)
    }

    /// Apply the fields present in `patch` and re-validate the result.
    /// Streak counters are kept.
    pub async fn update_routine(
        &self,
        id: &str,
        user_id: &str,
        patch: RoutinePatch,
    ) -> AppResult<RoutineDefinition> {
        let existing = self.get_routine(id, user_id).await?;
        let fields = validate_fields(patch.merge_into(&existing))?;

        let routine = RoutineDefinition {
            title: fields.title,
            rule: fields.rule,
            is_skippable: fields.is_skippable,
            show_streak: fields.show_streak,
            time_type: fields.time_type,
            specific_time: fields.specific_time,
            updated_at: self.clock.now(),
            ..existing
        };

        self.store.update_routine(&routine).await?;
        info!("Updated routine {}", routine.id);
        Ok(routine)
    }

    pub async fn delete_routine(&self, id: &str, user_id: &str) -> AppResult<()> {
        let routine = self.get_routine(id, user_id).await?;
        self.store.delete_routine(&routine.id).await?;
        info!("Deleted routine {}", routine.id);
        Ok(())
    }

    /// Routines whose frequency schedules them on `date`.
    pub async fn routines_due_on(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> AppResult<Vec<RoutineDefinition>> {
        let routines = self.store.list_routines_by_user(user_id, None).await?;
        Ok(routines
            .into_iter()
            .filter(|r| matches_frequency(&r.rule, date))
            .collect())
    }

    pub async fn todays_routines(&self, user_id: &str) -> AppResult<Vec<RoutineDefinition>> {
        self.routines_due_on(user_id, self.clock.today()).await
    }

    /// Record today's completion and recompute the streak from history.
    pub async fn complete_routine(&self, id: &str, user_id: &str) -> AppResult<RoutineDefinition> {
        let routine = self.get_routine(id, user_id).await?;
        let now = self.clock.now();
        let today = now.date_naive();
        self.ensure_not_recorded(&routine, today).await?;

        let history = self.history_before(&routine.id, today).await?;
        let current = streak_on_completion(
            &routine.rule,
            routine.is_skippable,
            today,
            &history,
            self.lookback_days,
        );
        let counters = StreakCounters {
            current,
            longest: routine.longest_streak.max(current),
        };

        let record =
            CompletionRecord::new(&routine.id, user_id, today, CompletionStatus::Completed, now);
        self.store.record_completion(&record, Some(counters)).await?;

        info!(
            "Completed routine {} on {} (streak {})",
            routine.id, today, counters.current
        );
        Ok(RoutineDefinition {
            current_streak: counters.current,
            longest_streak: counters.longest,
            updated_at: now,
            ..routine
        })
    }

    /// Record today's skip. On a routine that is not skippable the current
    /// streak drops to zero; otherwise the counters are left alone.
    pub async fn skip_routine(&self, id: &str, user_id: &str) -> AppResult<RoutineDefinition> {
        let routine = self.get_routine(id, user_id).await?;
        let now = self.clock.now();
        let today = now.date_naive();
        self.ensure_not_recorded(&routine, today).await?;

        let counters = (!routine.is_skippable).then_some(StreakCounters {
            current: 0,
            longest: routine.longest_streak,
        });

        let record =
            CompletionRecord::new(&routine.id, user_id, today, CompletionStatus::Skipped, now);
        self.store.record_completion(&record, counters).await?;

        info!("Skipped routine {} on {}", routine.id, today);
        Ok(match counters {
            Some(c) => RoutineDefinition {
                current_streak: c.current,
                longest_streak: c.longest,
                updated_at: now,
                ..routine
            },
            None => routine,
        })
    }

    pub async fn history(
        &self,
        id: &str,
        user_id: &str,
        limit: Option<i64>,
    ) -> AppResult<Vec<CompletionRecord>> {
        let routine = self.get_routine(id, user_id).await?;
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.store.completion_history(&routine.id, limit).await
    }

    async fn ensure_not_recorded(&self, routine: &RoutineDefinition, date: NaiveDate) -> AppResult<()> {
        if self
            .store
            .completion_for_date(&routine.id, date)
            .await?
            .is_some()
        {
            debug!("Routine {} already has a record for {}", routine.id, date);
            return Err(AppError::AlreadyRecordedToday {
                routine_id: routine.id.clone(),
                date,
            });
        }
        Ok(())
    }

    /// Statuses of the records inside the lookback window before `date`.
    async fn history_before(
        &self,
        routine_id: &str,
        date: NaiveDate,
    ) -> AppResult<HashMap<NaiveDate, CompletionStatus>> {
        let records = self
            .store
            .completion_history(routine_id, i64::from(self.lookback_days) + 1)
            .await?;
        Ok(records
            .into_iter()
            .filter(|r| r.completed_on < date)
            .map(|r| (r.completed_on, r.status))
            .collect())
    }
}

fn validate_fields(fields: RoutineFields) -> AppResult<RoutineFields> {
    let title = fields.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::Validation("title is required".to_string()));
    }
    if fields.rule.kind == RecurrenceKind::None {
        return Err(AppError::Validation("invalid frequency".to_string()));
    }
    let rule = fields.rule.normalized().until(None);
    rule.validate()?;

    let specific_time = match fields.time_type {
        TimeType::Specific => {
            let value = fields
                .specific_time
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    AppError::Validation(
                        "specificTime is required when timeType is Specific".to_string(),
                    )
                })?;
            NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| {
                AppError::Validation("specificTime must use the HH:MM format".to_string())
            })?;
            Some(value.to_string())
        }
        _ => None,
    };

    Ok(RoutineFields {
        title,
        rule,
        specific_time,
        ..fields
    })
}
