use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::SqliteStore;
use crate::db::models::{EventException, ExceptionChange, ExceptionOverrides};
use crate::db::store::ExceptionStore;
use crate::error::{AppError, AppResult};

// ============================================================================
// Event Exception Repository
// ============================================================================

const EXCEPTION_COLUMNS: &str = r#"
    id, event_id, user_id, original_date, kind,
    modified_title, modified_start_date, modified_end_date, modified_domain, modified_all_day,
    created_at
"#;

fn exception_from_row(row: &SqliteRow) -> AppResult<EventException> {
    let kind: String = row.try_get("kind")?;
    let change = match kind.as_str() {
        "deleted" => ExceptionChange::Deleted,
        "modified" => ExceptionChange::Modified(ExceptionOverrides {
            title: row.try_get("modified_title")?,
            start_date: row.try_get("modified_start_date")?,
            end_date: row.try_get("modified_end_date")?,
            domain: row.try_get("modified_domain")?,
            all_day: row.try_get("modified_all_day")?,
        }),
        other => {
            return Err(AppError::Internal(anyhow::anyhow!(
                "unknown exception kind in database: {}",
                other
            )))
        }
    };

    Ok(EventException {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        user_id: row.try_get("user_id")?,
        original_date: row.try_get("original_date")?,
        change,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ExceptionStore for SqliteStore {
    async fn upsert_exception(&self, exception: &EventException) -> AppResult<EventException> {
        let empty = ExceptionOverrides::default();
        let overrides = match &exception.change {
            ExceptionChange::Deleted => &empty,
            ExceptionChange::Modified(overrides) => overrides,
        };

        sqlx::query(
            r#"
            INSERT INTO event_exceptions (
                id, event_id, user_id, original_date, kind,
                modified_title, modified_start_date, modified_end_date, modified_domain, modified_all_day,
                created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(event_id, original_date) DO UPDATE SET
                id = excluded.id,
                user_id = excluded.user_id,
                kind = excluded.kind,
                modified_title = excluded.modified_title,
                modified_start_date = excluded.modified_start_date,
                modified_end_date = excluded.modified_end_date,
                modified_domain = excluded.modified_domain,
                modified_all_day = excluded.modified_all_day,
                created_at = excluded.created_at
            "#,
        )
        .bind(&exception.id)
        .bind(&exception.event_id)
        .bind(&exception.user_id)
        .bind(exception.original_date)
        .bind(exception.change.kind())
        .bind(&overrides.title)
        .bind(overrides.start_date)
        .bind(overrides.end_date)
        .bind(&overrides.domain)
        .bind(overrides.all_day)
        .bind(exception.created_at)
        .execute(self.pool())
        .await
        .map_err(AppError::Database)?;

        Ok(exception.clone())
    }

    async fn get_exception(&self, id: &str) -> AppResult<Option<EventException>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM event_exceptions WHERE id = ?",
            EXCEPTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::Database)?;

        row.as_ref().map(exception_from_row).transpose()
    }

    async fn find_exceptions(&self, event_id: &str) -> AppResult<Vec<EventException>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM event_exceptions WHERE event_id = ? ORDER BY original_date ASC",
            EXCEPTION_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::Database)?;

        rows.iter().map(exception_from_row).collect()
    }

    async fn find_exceptions_in_range(
        &self,
        event_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<EventException>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM event_exceptions
            WHERE event_id = ? AND original_date >= ? AND original_date <= ?
            ORDER BY original_date ASC
            "#,
            EXCEPTION_COLUMNS
        ))
        .bind(event_id)
        .bind(start)
        .bind(end)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::Database)?;

        rows.iter().map(exception_from_row).collect()
    }

    async fn delete_exception(&self, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM event_exceptions WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::db::models::EventDefinition;
    use crate::db::store::EventStore;
    use crate::db::testing::{seed_user, test_store};
    use crate::recurrence::RecurrenceRule;

    async fn series(store: &SqliteStore) -> EventDefinition {
        let user = seed_user(store, "a@example.com").await;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let event = EventDefinition {
            id: "series-1".into(),
            user_id: user.id,
            title: "Standup".into(),
            domain: "Work".into(),
            start_date: start,
            end_date: Some(start + Duration::minutes(15)),
            all_day: false,
            rule: RecurrenceRule::daily(),
            hide_from_agenda: false,
            version: 0,
            created_at: start,
            updated_at: start,
        };
        store.create_event(&event).await.unwrap();
        event
    }

    #[tokio::test]
    async fn second_exception_for_a_date_replaces_the_first() {
        let store = test_store().await;
        let event = series(&store).await;
        let date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let now = Utc::now();

        let renamed = EventException::new(
            &event.id,
            &event.user_id,
            date,
            ExceptionChange::Modified(ExceptionOverrides {
                title: Some("Retro".into()),
                ..Default::default()
            }),
            now,
        );
        store.upsert_exception(&renamed).await.unwrap();

        let deleted = EventException::new(&event.id, &event.user_id, date, ExceptionChange::Deleted, now);
        store.upsert_exception(&deleted).await.unwrap();

        let stored = store.find_exceptions(&event.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, deleted.id);
        assert_eq!(stored[0].change, ExceptionChange::Deleted);
    }

    #[tokio::test]
    async fn range_lookup_is_by_original_date() {
        let store = test_store().await;
        let event = series(&store).await;
        let now = Utc::now();
        for day in [2, 10, 20] {
            let date = NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
            let e = EventException::new(&event.id, &event.user_id, date, ExceptionChange::Deleted, now);
            store.upsert_exception(&e).await.unwrap();
        }

        let found = store
            .find_exceptions_in_range(
                &event.id,
                NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 20).unwrap(),
            )
            .await
            .unwrap();
        let dates: Vec<_> = found.iter().map(|e| e.original_date.to_string()).collect();
        assert_eq!(dates, vec!["2024-01-10", "2024-01-20"]);
    }

    #[tokio::test]
    async fn deleting_the_series_removes_its_exceptions() {
        let store = test_store().await;
        let event = series(&store).await;
        let date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let e = EventException::new(&event.id, &event.user_id, date, ExceptionChange::Deleted, Utc::now());
        store.upsert_exception(&e).await.unwrap();

        store.delete_event(&event.id).await.unwrap();
        assert!(store.get_exception(&e.id).await.unwrap().is_none());
    }
}
