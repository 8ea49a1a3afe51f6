use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite};

use super::{RuleColumns, SqliteStore};
use crate::db::models::EventDefinition;
use crate::db::store::EventStore;
use crate::error::{AppError, AppResult};

// ============================================================================
// Event Repository
// ============================================================================

const EVENT_COLUMNS: &str = r#"
    id, user_id, title, domain, start_date, end_date, all_day,
    recurrence_type, recurrence_days, recurrence_day_of_month, recurrence_month, recurrence_until,
    hide_from_agenda, version, created_at, updated_at
"#;

fn event_from_row(row: &SqliteRow) -> AppResult<EventDefinition> {
    let kind: String = row.try_get("recurrence_type")?;
    let rule = RuleColumns::into_rule(
        &kind,
        row.try_get("recurrence_days")?,
        row.try_get("recurrence_day_of_month")?,
        row.try_get("recurrence_month")?,
        row.try_get("recurrence_until")?,
    )?;

    Ok(EventDefinition {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        domain: row.try_get("domain")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        all_day: row.try_get("all_day")?,
        rule,
        hide_from_agenda: row.try_get("hide_from_agenda")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn insert_event<'e, E>(executor: E, event: &EventDefinition) -> AppResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rule = RuleColumns::from_rule(&event.rule)?;

    sqlx::query(
        r#"
        INSERT INTO events (
            id, user_id, title, domain, start_date, end_date, all_day,
            recurrence_type, recurrence_days, recurrence_day_of_month, recurrence_month, recurrence_until,
            hide_from_agenda, version, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&event.id)
    .bind(&event.user_id)
    .bind(&event.title)
    .bind(&event.domain)
    .bind(event.start_date)
    .bind(event.end_date)
    .bind(event.all_day)
    .bind(rule.kind)
    .bind(rule.days)
    .bind(rule.day_of_month)
    .bind(rule.month)
    .bind(rule.until)
    .bind(event.hide_from_agenda)
    .bind(event.version)
    .bind(event.created_at)
    .bind(event.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

async fn update_event_versioned<'e, E>(
    executor: E,
    event: &EventDefinition,
) -> AppResult<EventDefinition>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rule = RuleColumns::from_rule(&event.rule)?;

    let result = sqlx::query(
        r#"
        UPDATE events
        SET title = ?, domain = ?, start_date = ?, end_date = ?, all_day = ?,
            recurrence_type = ?, recurrence_days = ?, recurrence_day_of_month = ?,
            recurrence_month = ?, recurrence_until = ?,
            hide_from_agenda = ?, version = version + 1, updated_at = ?
        WHERE id = ? AND version = ?
        "#,
    )
    .bind(&event.title)
    .bind(&event.domain)
    .bind(event.start_date)
    .bind(event.end_date)
    .bind(event.all_day)
    .bind(rule.kind)
    .bind(rule.days)
    .bind(rule.day_of_month)
    .bind(rule.month)
    .bind(rule.until)
    .bind(event.hide_from_agenda)
    .bind(event.updated_at)
    .bind(&event.id)
    .bind(event.version)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(format!(
            "event {} was changed by another request; reload and retry",
            event.id
        )));
    }

    Ok(EventDefinition {
        version: event.version + 1,
        ..event.clone()
    })
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn get_event(&self, id: &str) -> AppResult<Option<EventDefinition>> {
        let row = sqlx::query(&format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::Database)?;

        row.as_ref().map(event_from_row).transpose()
    }

    async fn list_events_by_user(&self, user_id: &str) -> AppResult<Vec<EventDefinition>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM events WHERE user_id = ? ORDER BY start_date ASC",
            EVENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::Database)?;

        rows.iter().map(event_from_row).collect()
    }

    async fn find_events_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<EventDefinition>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM events
            WHERE user_id = ?
              AND (
                (recurrence_type = 'none' AND start_date >= ? AND start_date <= ?)
                OR (
                  recurrence_type != 'none'
                  AND start_date <= ?
                  AND (recurrence_until IS NULL OR recurrence_until >= ?)
                )
              )
            ORDER BY start_date ASC
            "#,
            EVENT_COLUMNS
        ))
        .bind(user_id)
        .bind(start)
        .bind(end)
        .bind(end)
        .bind(start.date_naive())
        .fetch_all(self.pool())
        .await
        .map_err(AppError::Database)?;

        rows.iter().map(event_from_row).collect()
    }

    async fn create_event(&self, event: &EventDefinition) -> AppResult<()> {
        insert_event(self.pool(), event).await
    }

    async fn update_event(&self, event: &EventDefinition) -> AppResult<EventDefinition> {
        update_event_versioned(self.pool(), event).await
    }

    async fn delete_event(&self, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }

    async fn split_series(
        &self,
        truncated: &EventDefinition,
        created: &EventDefinition,
    ) -> AppResult<EventDefinition> {
        let mut tx = self.pool().begin().await.map_err(AppError::Database)?;

        let stored = update_event_versioned(&mut *tx, truncated).await?;
        insert_event(&mut *tx, created).await?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(stored)
    }
}
