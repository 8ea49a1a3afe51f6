use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{is_unique_violation, SqliteStore};
use crate::db::models::{CompletionRecord, StreakCounters};
use crate::db::store::CompletionStore;
use crate::error::{AppError, AppResult};

// ============================================================================
// Routine Completion Repository
// ============================================================================

fn completion_from_row(row: &SqliteRow) -> AppResult<CompletionRecord> {
    let status: String = row.try_get("status")?;

    Ok(CompletionRecord {
        id: row.try_get("id")?,
        routine_id: row.try_get("routine_id")?,
        user_id: row.try_get("user_id")?,
        completed_on: row.try_get("completed_on")?,
        status: status.parse()?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl CompletionStore for SqliteStore {
    async fn completion_for_date(
        &self,
        routine_id: &str,
        date: NaiveDate,
    ) -> AppResult<Option<CompletionRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, routine_id, user_id, completed_on, status, created_at
            FROM routine_completions
            WHERE routine_id = ? AND completed_on = ?
            "#,
        )
        .bind(routine_id)
        .bind(date)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::Database)?;

        row.as_ref().map(completion_from_row).transpose()
    }

    async fn record_completion(
        &self,
        record: &CompletionRecord,
        streak: Option<StreakCounters>,
    ) -> AppResult<()> {
        let mut tx = self.pool().begin().await.map_err(AppError::Database)?;

        sqlx::query(
            r#"
            INSERT INTO routine_completions (id, routine_id, user_id, completed_on, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.routine_id)
        .bind(&record.user_id)
        .bind(record.completed_on)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::AlreadyRecordedToday {
                    routine_id: record.routine_id.clone(),
                    date: record.completed_on,
                }
            } else {
                AppError::Database(e)
            }
        })?;

        if let Some(counters) = streak {
            sqlx::query(
                r#"
                UPDATE routines
                SET current_streak = ?, longest_streak = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(counters.current)
            .bind(counters.longest)
            .bind(record.created_at)
            .bind(&record.routine_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    async fn completion_history(
        &self,
        routine_id: &str,
        limit: i64,
    ) -> AppResult<Vec<CompletionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, routine_id, user_id, completed_on, status, created_at
            FROM routine_completions
            WHERE routine_id = ?
            ORDER BY completed_on DESC
            LIMIT ?
            "#,
        )
        .bind(routine_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::Database)?;

        rows.iter().map(completion_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::models::{CompletionStatus, RoutineDefinition, TimeType};
    use crate::db::store::RoutineStore;
    use crate::db::testing::{seed_user, test_store};
    use crate::recurrence::RecurrenceRule;

    async fn routine(store: &SqliteStore) -> RoutineDefinition {
        let user = seed_user(store, "a@example.com").await;
        let now = Utc::now();
        let routine = RoutineDefinition {
            id: "r1".into(),
            user_id: user.id,
            title: "Stretch".into(),
            rule: RecurrenceRule::daily(),
            is_skippable: false,
            show_streak: true,
            time_type: TimeType::Am,
            specific_time: None,
            current_streak: 0,
            longest_streak: 0,
            created_at: now,
            updated_at: now,
        };
        store.create_routine(&routine).await.unwrap();
        routine
    }

    #[tokio::test]
    async fn records_completion_and_streak_together() {
        let store = test_store().await;
        let routine = routine(&store).await;
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let record = CompletionRecord::new(
            &routine.id,
            &routine.user_id,
            today,
            CompletionStatus::Completed,
            Utc::now(),
        );

        store
            .record_completion(&record, Some(StreakCounters { current: 4, longest: 9 }))
            .await
            .unwrap();

        let stored = store.completion_for_date(&routine.id, today).await.unwrap().unwrap();
        assert_eq!(stored.status, CompletionStatus::Completed);
        let reloaded = store.get_routine(&routine.id).await.unwrap().unwrap();
        assert_eq!((reloaded.current_streak, reloaded.longest_streak), (4, 9));
    }

    #[tokio::test]
    async fn second_record_on_same_date_is_rejected_without_side_effects() {
        let store = test_store().await;
        let routine = routine(&store).await;
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let first = CompletionRecord::new(
            &routine.id,
            &routine.user_id,
            today,
            CompletionStatus::Completed,
            Utc::now(),
        );
        store
            .record_completion(&first, Some(StreakCounters { current: 1, longest: 1 }))
            .await
            .unwrap();

        let second = CompletionRecord::new(
            &routine.id,
            &routine.user_id,
            today,
            CompletionStatus::Skipped,
            Utc::now(),
        );
        let err = store
            .record_completion(&second, Some(StreakCounters { current: 0, longest: 1 }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyRecordedToday { .. }));

        let reloaded = store.get_routine(&routine.id).await.unwrap().unwrap();
        assert_eq!(reloaded.current_streak, 1);
        let history = store.completion_history(&routine.id, 30).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, CompletionStatus::Completed);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let store = test_store().await;
        let routine = routine(&store).await;
        for day in 1..=5 {
            let record = CompletionRecord::new(
                &routine.id,
                &routine.user_id,
                NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
                CompletionStatus::Completed,
                Utc::now(),
            );
            store.record_completion(&record, None).await.unwrap();
        }

        let history = store.completion_history(&routine.id, 2).await.unwrap();
        let days: Vec<_> = history.iter().map(|r| r.completed_on.to_string()).collect();
        assert_eq!(days, vec!["2024-05-05", "2024-05-04"]);
    }
}
