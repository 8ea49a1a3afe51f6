use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{RuleColumns, SqliteStore};
use crate::db::models::RoutineDefinition;
use crate::db::store::RoutineStore;
use crate::error::{AppError, AppResult};
use crate::recurrence::RecurrenceKind;

// ============================================================================
// Routine Repository
// ============================================================================

const ROUTINE_COLUMNS: &str = r#"
    id, user_id, title, frequency, weekdays, day_of_month, month,
    is_skippable, show_streak, time_type, specific_time,
    current_streak, longest_streak, created_at, updated_at
"#;

pub(crate) fn routine_from_row(row: &SqliteRow) -> AppResult<RoutineDefinition> {
    let frequency: String = row.try_get("frequency")?;
    let rule = RuleColumns::into_rule(
        &frequency,
        row.try_get("weekdays")?,
        row.try_get("day_of_month")?,
        row.try_get("month")?,
        None,
    )?;
    let time_type: String = row.try_get("time_type")?;

    Ok(RoutineDefinition {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        rule,
        is_skippable: row.try_get("is_skippable")?,
        show_streak: row.try_get("show_streak")?,
        time_type: time_type.parse().map_err(|_| {
            AppError::Internal(anyhow::anyhow!("unknown time type in database: {}", time_type))
        })?,
        specific_time: row.try_get("specific_time")?,
        current_streak: row.try_get("current_streak")?,
        longest_streak: row.try_get("longest_streak")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl RoutineStore for SqliteStore {
    async fn get_routine(&self, id: &str) -> AppResult<Option<RoutineDefinition>> {
        let row = sqlx::query(&format!("SELECT {} FROM routines WHERE id = ?", ROUTINE_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::Database)?;

        row.as_ref().map(routine_from_row).transpose()
    }

    async fn list_routines_by_user(
        &self,
        user_id: &str,
        kind: Option<RecurrenceKind>,
    ) -> AppResult<Vec<RoutineDefinition>> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query(&format!(
                    "SELECT {} FROM routines WHERE user_id = ? AND frequency = ? ORDER BY created_at ASC",
                    ROUTINE_COLUMNS
                ))
                .bind(user_id)
                .bind(kind.as_str())
                .fetch_all(self.pool())
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM routines WHERE user_id = ? ORDER BY created_at ASC",
                    ROUTINE_COLUMNS
                ))
                .bind(user_id)
                .fetch_all(self.pool())
                .await
            }
        }
        .map_err(AppError::Database)?;

        rows.iter().map(routine_from_row).collect()
    }

    async fn create_routine(&self, routine: &RoutineDefinition) -> AppResult<()> {
        let rule = RuleColumns::from_rule(&routine.rule)?;

        sqlx::query(
            r#"
            INSERT INTO routines (
                id, user_id, title, frequency, weekdays, day_of_month, month,
                is_skippable, show_streak, time_type, specific_time,
                current_streak, longest_streak, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&routine.id)
        .bind(&routine.user_id)
        .bind(&routine.title)
        .bind(rule.kind)
        .bind(rule.days)
        .bind(rule.day_of_month)
        .bind(rule.month)
        .bind(routine.is_skippable)
        .bind(routine.show_streak)
        .bind(routine.time_type.as_str())
        .bind(&routine.specific_time)
        .bind(routine.current_streak)
        .bind(routine.longest_streak)
        .bind(routine.created_at)
        .bind(routine.updated_at)
        .execute(self.pool())
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    async fn update_routine(&self, routine: &RoutineDefinition) -> AppResult<()> {
        let rule = RuleColumns::from_rule(&routine.rule)?;

        sqlx::query(
            r#"
            UPDATE routines
            SET title = ?, frequency = ?, weekdays = ?, day_of_month = ?, month = ?,
                is_skippable = ?, show_streak = ?, time_type = ?, specific_time = ?,
                current_streak = ?, longest_streak = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&routine.title)
        .bind(rule.kind)
        .bind(rule.days)
        .bind(rule.day_of_month)
        .bind(rule.month)
        .bind(routine.is_skippable)
        .bind(routine.show_streak)
        .bind(routine.time_type.as_str())
        .bind(&routine.specific_time)
        .bind(routine.current_streak)
        .bind(routine.longest_streak)
        .bind(routine.updated_at)
        .bind(&routine.id)
        .execute(self.pool())
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    async fn delete_routine(&self, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM routines WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }
}
