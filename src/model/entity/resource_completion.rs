use crate::model::entity::Resource;
use crate::model::repo::{ResourceTyped, optional};
use crate::model::{ModelManager, error::DatabaseResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::prelude::FromRow;
use uuid::Uuid;

/// Statuses a learner may set directly. `submitted` and `reviewed` follow
/// an upload and a staff review.
pub static LEARNER_STATUSES: [&str; 3] = ["not_started", "in_progress", "completed"];

/// Statuses that count a resource as done.
pub static FINISHED_STATUSES: [&str; 3] = ["completed", "submitted", "reviewed"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct ResourceCompletion {
    id: Uuid,
    user_id: Uuid,
    resource_id: String,
    module_id: String,
    pathway_id: String,
    status: String,
    progress_percentage: i32,
    time_spent_minutes: i32,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    last_accessed_at: DateTime<Utc>,
    submission_required: bool,
    submission_count: i32,
    notes: Option<String>,
    #[schema(value_type = Option<Object>)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct ResourceProgressUpdate {
    pub status: Option<String>,
    pub progress_percentage: Option<i32>,
    pub time_spent_minutes: Option<i32>,
    pub notes: Option<String>,
}

impl ResourceTyped for ResourceCompletion {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::ResourceCompletion
    }
}

impl ResourceCompletion {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn progress_percentage(&self) -> i32 {
        self.progress_percentage
    }

    pub fn submission_count(&self) -> i32 {
        self.submission_count
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_finished(&self) -> bool {
        FINISHED_STATUSES.contains(&self.status.as_str())
    }

    pub async fn find(
        mm: &ModelManager,
        user_id: Uuid,
        resource_id: &str,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as(
            "SELECT * FROM resource_completions WHERE user_id = $1 AND resource_id = $2",
        )
        .bind(user_id)
        .bind(resource_id)
        .fetch_one(mm.executor())
        .await;
        optional(result)
    }

    /// Creates the completion as `in_progress`, or touches the existing one.
    pub async fn start(mm: &ModelManager, user_id: Uuid, resource: &Resource) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO resource_completions
                (id, user_id, resource_id, module_id, pathway_id, status, submission_required)
            VALUES ($1, $2, $3, $4, $5, 'in_progress', $6)
            ON CONFLICT (user_id, resource_id) DO UPDATE
            SET status = CASE
                    WHEN resource_completions.status = 'not_started' THEN 'in_progress'
                    ELSE resource_completions.status
                END,
                last_accessed_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(resource.id())
        .bind(resource.module_id())
        .bind(resource.pathway_id())
        .bind(resource.requires_upload())
        .fetch_one(mm.executor())
        .await?;
        Ok(row)
    }

    /// Upserts progress. A finished status forces 100% and stamps `completed_at` once.
    /// Rows already `submitted` or `reviewed` keep their status.
    pub async fn upsert_progress(
        mm: &ModelManager,
        user_id: Uuid,
        resource: &Resource,
        data: &ResourceProgressUpdate,
    ) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO resource_completions
                (id, user_id, resource_id, module_id, pathway_id, status, progress_percentage,
                 time_spent_minutes, notes, submission_required, completed_at)
            VALUES (
                $1, $2, $3, $4, $5,
                COALESCE($6::text, 'in_progress'),
                CASE WHEN $6::text IN ('completed', 'submitted', 'reviewed') THEN 100 ELSE COALESCE($7, 0) END,
                COALESCE($8, 0),
                $9,
                $10,
                CASE WHEN $6::text IN ('completed', 'submitted', 'reviewed') THEN now() END
            )
            ON CONFLICT (user_id, resource_id) DO UPDATE
            SET status = CASE
                    WHEN resource_completions.status IN ('submitted', 'reviewed')
                        THEN resource_completions.status
                    ELSE COALESCE($6::text, resource_completions.status)
                END,
                progress_percentage = CASE
                    WHEN resource_completions.status IN ('submitted', 'reviewed') THEN 100
                    WHEN $6::text IN ('completed', 'submitted', 'reviewed') THEN 100
                    ELSE COALESCE($7, resource_completions.progress_percentage)
                END,
                time_spent_minutes = COALESCE($8, resource_completions.time_spent_minutes),
                notes = COALESCE($9, resource_completions.notes),
                completed_at = CASE
                    WHEN $6::text IN ('completed', 'submitted', 'reviewed')
                        THEN COALESCE(resource_completions.completed_at, now())
                    ELSE resource_completions.completed_at
                END,
                last_accessed_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(resource.id())
        .bind(resource.module_id())
        .bind(resource.pathway_id())
        .bind(&data.status)
        .bind(data.progress_percentage)
        .bind(data.time_spent_minutes)
        .bind(&data.notes)
        .bind(resource.requires_upload())
        .fetch_one(mm.executor())
        .await?;
        Ok(row)
    }

    /// Records an upload: status `submitted`, counter incremented, completion stamped.
    pub async fn mark_submitted(
        conn: &mut PgConnection,
        user_id: Uuid,
        resource: &Resource,
    ) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO resource_completions
                (id, user_id, resource_id, module_id, pathway_id, status, progress_percentage,
                 submission_required, submission_count, completed_at)
            VALUES ($1, $2, $3, $4, $5, 'submitted', 100, TRUE, 1, now())
            ON CONFLICT (user_id, resource_id) DO UPDATE
            SET status = 'submitted',
                progress_percentage = 100,
                submission_required = TRUE,
                submission_count = resource_completions.submission_count + 1,
                completed_at = COALESCE(resource_completions.completed_at, now()),
                last_accessed_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(resource.id())
        .bind(resource.module_id())
        .bind(resource.pathway_id())
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    pub async fn mark_reviewed(
        conn: &mut PgConnection,
        user_id: Uuid,
        resource_id: &str,
    ) -> DatabaseResult<()> {
        sqlx::query(
            r#"
            UPDATE resource_completions
            SET status = 'reviewed', progress_percentage = 100,
                completed_at = COALESCE(completed_at, now()), last_accessed_at = now()
            WHERE user_id = $1 AND resource_id = $2
            "#,
        )
        .bind(user_id)
        .bind(resource_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn list_for_user_in_pathway(
        mm: &ModelManager,
        user_id: Uuid,
        pathway_id: &str,
    ) -> DatabaseResult<Vec<Self>> {
        let rows = sqlx::query_as(
            "SELECT * FROM resource_completions WHERE user_id = $1 AND pathway_id = $2",
        )
        .bind(user_id)
        .bind(pathway_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }

    pub async fn list_for_user_in_module(
        mm: &ModelManager,
        user_id: Uuid,
        module_id: &str,
    ) -> DatabaseResult<Vec<Self>> {
        let rows = sqlx::query_as(
            "SELECT * FROM resource_completions WHERE user_id = $1 AND module_id = $2",
        )
        .bind(user_id)
        .bind(module_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }
}
