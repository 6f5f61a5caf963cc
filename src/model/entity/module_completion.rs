use crate::model::repo::{ResourceTyped, optional};
use crate::model::{ModelManager, error::DatabaseResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::prelude::FromRow;
use uuid::Uuid;

pub static APPROVAL_STATUSES: [&str; 3] = ["pending", "approved", "rejected"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct ModuleCompletion {
    id: Uuid,
    user_id: Uuid,
    pathway_id: String,
    module_id: String,
    completed_at: DateTime<Utc>,
    time_spent_minutes: i32,
    approval_status: String,
    reviewed_by: Option<Uuid>,
    reviewed_at: Option<DateTime<Utc>>,
    review_comments: Option<String>,
}

/// Module completion awaiting instructor review, with the names needed to display it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct PendingModuleCompletionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub user_name: String,
    pub pathway_id: String,
    pub pathway_title: String,
    pub module_id: String,
    pub module_title: String,
    pub completed_at: DateTime<Utc>,
    pub time_spent_minutes: i32,
}

impl ResourceTyped for ModuleCompletion {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::ModuleCompletion
    }
}

impl ModuleCompletion {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn pathway_id(&self) -> &str {
        &self.pathway_id
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn time_spent_minutes(&self) -> i32 {
        self.time_spent_minutes
    }

    pub fn approval_status(&self) -> &str {
        &self.approval_status
    }

    pub fn review_comments(&self) -> Option<&str> {
        self.review_comments.as_deref()
    }

    /// Inserts the completion once. The second value is `false` when the row already existed,
    /// in which case the stored row is returned unchanged.
    pub async fn insert_if_absent(
        conn: &mut PgConnection,
        user_id: Uuid,
        pathway_id: &str,
        module_id: &str,
        time_spent_minutes: i32,
    ) -> DatabaseResult<(Self, bool)> {
        let inserted: Option<Self> = sqlx::query_as(
            r#"
            INSERT INTO module_completions (id, user_id, pathway_id, module_id, time_spent_minutes)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, module_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(pathway_id)
        .bind(module_id)
        .bind(time_spent_minutes)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(row) = inserted {
            return Ok((row, true));
        }

        let existing =
            sqlx::query_as("SELECT * FROM module_completions WHERE user_id = $1 AND module_id = $2")
                .bind(user_id)
                .bind(module_id)
                .fetch_one(conn)
                .await?;
        Ok((existing, false))
    }

    pub async fn count_in_pathway(
        conn: &mut PgConnection,
        user_id: Uuid,
        pathway_id: &str,
    ) -> DatabaseResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM module_completions WHERE user_id = $1 AND pathway_id = $2",
        )
        .bind(user_id)
        .bind(pathway_id)
        .fetch_one(conn)
        .await?;
        Ok(count)
    }

    pub async fn list_for_user(
        mm: &ModelManager,
        user_id: Uuid,
        pathway_id: Option<&str>,
    ) -> DatabaseResult<Vec<Self>> {
        let rows = sqlx::query_as(
            r#"
            SELECT * FROM module_completions
            WHERE user_id = $1 AND ($2::text IS NULL OR pathway_id = $2)
            ORDER BY completed_at DESC
            "#,
        )
        .bind(user_id)
        .bind(pathway_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }

    pub async fn find_by_id(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM module_completions WHERE id = $1")
            .bind(id)
            .fetch_one(mm.executor())
            .await;
        optional(result)
    }

    pub async fn list_pending(
        mm: &ModelManager,
        pathway_id: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<PendingModuleCompletionRow>> {
        let rows = sqlx::query_as(
            r#"
            SELECT mc.id, mc.user_id, u.email AS user_email, u.full_name AS user_name,
                   mc.pathway_id, p.title AS pathway_title, mc.module_id, m.title AS module_title,
                   mc.completed_at, mc.time_spent_minutes
            FROM module_completions mc
            JOIN users u ON u.id = mc.user_id
            JOIN modules m ON m.id = mc.module_id
            JOIN pathways p ON p.id = mc.pathway_id
            WHERE mc.approval_status = 'pending' AND ($1::text IS NULL OR mc.pathway_id = $1)
            ORDER BY mc.completed_at ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(pathway_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }

    pub async fn review(
        self,
        mm: &ModelManager,
        reviewer: Uuid,
        approval_status: &str,
        review_comments: Option<&str>,
    ) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            UPDATE module_completions
            SET approval_status = $1, review_comments = $2, reviewed_by = $3, reviewed_at = now()
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(approval_status)
        .bind(review_comments)
        .bind(reviewer)
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;
        Ok(row)
    }
}
