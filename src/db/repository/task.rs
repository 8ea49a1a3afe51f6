use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::SqliteStore;
use crate::db::models::Task;
use crate::db::store::TaskStore;
use crate::error::{AppError, AppResult};

// ============================================================================
// Task Repository
// ============================================================================

fn task_from_row(row: &SqliteRow) -> AppResult<Task> {
    let priority: String = row.try_get("priority")?;
    let status: String = row.try_get("status")?;

    Ok(Task {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        domain: row.try_get("domain")?,
        priority: priority.parse()?,
        status: status.parse()?,
        deadline: row.try_get("deadline")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn get_task(&self, id: &str) -> AppResult<Option<Task>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, title, description, domain, priority, status, deadline,
                   created_at, updated_at
            FROM tasks
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::Database)?;

        row.as_ref().map(task_from_row).transpose()
    }

    async fn list_tasks_by_user(&self, user_id: &str) -> AppResult<Vec<Task>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, description, domain, priority, status, deadline,
                   created_at, updated_at
            FROM tasks
            WHERE user_id = ?
            ORDER BY deadline IS NULL, deadline ASC, created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::Database)?;

        rows.iter().map(task_from_row).collect()
    }

    async fn create_task(&self, task: &Task) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, user_id, title, description, domain, priority, status, deadline,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.id)
        .bind(&task.user_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.domain)
        .bind(task.priority.as_str())
        .bind(task.status.as_str())
        .bind(task.deadline)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(self.pool())
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    async fn update_task(&self, task: &Task) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE tasks
            SET title = ?, description = ?, domain = ?, priority = ?, status = ?,
                deadline = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.domain)
        .bind(task.priority.as_str())
        .bind(task.status.as_str())
        .bind(task.deadline)
        .bind(task.updated_at)
        .bind(&task.id)
        .execute(self.pool())
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    async fn delete_task(&self, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }
}
