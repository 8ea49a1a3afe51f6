use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{is_unique_violation, SqliteStore};
use crate::db::models::{CreateUser, User};
use crate::db::store::UserStore;
use crate::error::{AppError, AppResult};

// ============================================================================
// User Repository
// ============================================================================

#[async_trait]
impl UserStore for SqliteStore {
    async fn count_users(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool())
            .await
            .map_err(AppError::Database)?;

        Ok(count)
    }

    async fn find_user_by_id(&self, id: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, name, timezone, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::Database)
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, name, timezone, created_at, updated_at
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::Database)
    }

    async fn create_user(&self, user: CreateUser, now: DateTime<Utc>) -> AppResult<User> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, name, timezone, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'UTC', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("a user with email {} already exists", user.email))
            } else {
                AppError::Database(e)
            }
        })?;

        self.find_user_by_id(&id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to create user")))
    }
}
