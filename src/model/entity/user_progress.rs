use crate::model::repo::{ResourceTyped, optional};
use crate::model::{ModelManager, error::DatabaseResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::prelude::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct UserProgress {
    id: Uuid,
    user_id: Uuid,
    pathway_id: String,
    current_module_id: Option<String>,
    progress_percentage: i32,
    completed_modules: i32,
    total_time_spent_minutes: i32,
    started_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

/// Partial update, `None` keeps the stored value.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct UserProgressUpdate {
    pub current_module_id: Option<String>,
    pub progress_percentage: Option<i32>,
    pub completed_modules: Option<i32>,
    pub total_time_spent_minutes: Option<i32>,
}

/// Progress joined with its pathway, used by the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct PathwayProgressRow {
    pub pathway_id: String,
    pub title: String,
    pub short_title: String,
    pub color: String,
    pub total_modules: i32,
    pub completed_modules: i32,
    pub progress_percentage: i32,
    pub total_time_spent_minutes: i32,
    pub current_module_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ResourceTyped for UserProgress {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::UserProgress
    }
}

impl UserProgress {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn pathway_id(&self) -> &str {
        &self.pathway_id
    }

    pub fn progress_percentage(&self) -> i32 {
        self.progress_percentage
    }

    pub fn completed_modules(&self) -> i32 {
        self.completed_modules
    }

    pub fn total_time_spent_minutes(&self) -> i32 {
        self.total_time_spent_minutes
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub async fn find(
        conn: &mut PgConnection,
        user_id: Uuid,
        pathway_id: &str,
    ) -> DatabaseResult<Option<Self>> {
        let result =
            sqlx::query_as("SELECT * FROM user_progress WHERE user_id = $1 AND pathway_id = $2")
                .bind(user_id)
                .bind(pathway_id)
                .fetch_one(conn)
                .await;
        optional(result)
    }

    /// Returns the progress row, creating it on first access. Touches `last_accessed_at`.
    pub async fn ensure(
        conn: &mut PgConnection,
        user_id: Uuid,
        pathway_id: &str,
    ) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO user_progress (id, user_id, pathway_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, pathway_id) DO UPDATE SET last_accessed_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(pathway_id)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    pub async fn update_fields(
        self,
        conn: &mut PgConnection,
        data: &UserProgressUpdate,
    ) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            UPDATE user_progress
            SET current_module_id = COALESCE($1, current_module_id),
                progress_percentage = COALESCE($2, progress_percentage),
                completed_modules = COALESCE($3, completed_modules),
                total_time_spent_minutes = COALESCE($4, total_time_spent_minutes),
                completed_at = CASE
                    WHEN COALESCE($2, progress_percentage) >= 100 THEN COALESCE(completed_at, now())
                    ELSE completed_at
                END,
                last_accessed_at = now()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(&data.current_module_id)
        .bind(data.progress_percentage)
        .bind(data.completed_modules)
        .bind(data.total_time_spent_minutes)
        .bind(self.id)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    /// Stores the result of a module completion.
    pub async fn record_module_completion(
        self,
        conn: &mut PgConnection,
        module_id: &str,
        completed_modules: i32,
        percentage: i32,
        time_spent_minutes: i32,
    ) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            UPDATE user_progress
            SET current_module_id = $1,
                completed_modules = $2,
                progress_percentage = $3,
                total_time_spent_minutes = total_time_spent_minutes + $4,
                completed_at = CASE WHEN $3 >= 100 THEN COALESCE(completed_at, now()) ELSE completed_at END,
                last_accessed_at = now()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(module_id)
        .bind(completed_modules)
        .bind(percentage)
        .bind(time_spent_minutes)
        .bind(self.id)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    pub async fn list_for_user(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> DatabaseResult<Vec<PathwayProgressRow>> {
        let rows = sqlx::query_as(
            r#"
            SELECT up.pathway_id, p.title, p.short_title, p.color, p.total_modules,
                   up.completed_modules, up.progress_percentage, up.total_time_spent_minutes,
                   up.current_module_id, up.started_at, up.last_accessed_at, up.completed_at
            FROM user_progress up
            JOIN pathways p ON p.id = up.pathway_id
            WHERE up.user_id = $1
            ORDER BY up.last_accessed_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }
}
