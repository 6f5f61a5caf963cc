use crate::model::access::HasOwner;
use crate::model::repo::{ResourceTyped, optional};
use crate::model::{ModelManager, error::DatabaseResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::prelude::FromRow;
use uuid::Uuid;

pub static REVIEW_STATUSES: [&str; 2] = ["approved", "rejected"];
pub static GRADES: [&str; 2] = ["pass", "fail"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Submission {
    id: Uuid,
    user_id: Uuid,
    resource_id: String,
    resource_completion_id: Uuid,
    file_name: String,
    file_size_bytes: i64,
    file_type: String,
    storage_bucket: String,
    storage_path: String,
    storage_url: String,
    submission_status: String,
    upload_ip: Option<String>,
    reviewed_by: Option<Uuid>,
    reviewed_at: Option<DateTime<Utc>>,
    review_comments: Option<String>,
    grade: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<Object>)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct SubmissionCreate {
    pub user_id: Uuid,
    pub resource_id: String,
    pub resource_completion_id: Uuid,
    pub file_name: String,
    pub file_size_bytes: i64,
    pub file_type: String,
    pub storage_bucket: String,
    pub storage_path: String,
    pub storage_url: String,
    pub upload_ip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct PendingSubmissionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub user_name: String,
    pub resource_id: String,
    pub resource_title: String,
    pub module_id: String,
    pub module_title: String,
    pub pathway_id: String,
    pub pathway_title: String,
    pub file_name: String,
    pub file_size_bytes: i64,
    pub file_type: String,
    pub submission_status: String,
    pub grade: Option<String>,
    pub review_comments: Option<String>,
    pub created_at: DateTime<Utc>,
    pub hours_waiting: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct SubmissionStats {
    pub total_pending: i64,
    pub uploaded_today: i64,
    pub avg_wait_hours: f64,
}

impl ResourceTyped for Submission {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Submission
    }
}

const PENDING_SELECT: &str = r#"
    SELECT s.id, s.user_id, u.email AS user_email, u.full_name AS user_name,
           s.resource_id, r.title AS resource_title, r.module_id, m.title AS module_title,
           r.pathway_id, p.title AS pathway_title,
           s.file_name, s.file_size_bytes, s.file_type, s.submission_status, s.grade,
           s.review_comments, s.created_at,
           (EXTRACT(EPOCH FROM (now() - s.created_at)) / 3600.0)::float8 AS hours_waiting
    FROM resource_submissions s
    JOIN users u ON u.id = s.user_id
    JOIN resources r ON r.id = s.resource_id
    JOIN modules m ON m.id = r.module_id
    JOIN pathways p ON p.id = r.pathway_id
"#;

impl Submission {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    pub fn storage_path(&self) -> &str {
        &self.storage_path
    }

    pub fn submission_status(&self) -> &str {
        &self.submission_status
    }

    pub fn grade(&self) -> Option<&str> {
        self.grade.as_deref()
    }

    pub fn review_comments(&self) -> Option<&str> {
        self.review_comments.as_deref()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub async fn create(conn: &mut PgConnection, data: SubmissionCreate) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO resource_submissions (
                id, user_id, resource_id, resource_completion_id, file_name, file_size_bytes,
                file_type, storage_bucket, storage_path, storage_url, submission_status, upload_ip
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'uploaded', $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.user_id)
        .bind(&data.resource_id)
        .bind(data.resource_completion_id)
        .bind(&data.file_name)
        .bind(data.file_size_bytes)
        .bind(&data.file_type)
        .bind(&data.storage_bucket)
        .bind(&data.storage_path)
        .bind(&data.storage_url)
        .bind(&data.upload_ip)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    pub async fn find_by_id(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM resource_submissions WHERE id = $1")
            .bind(id)
            .fetch_one(mm.executor())
            .await;
        optional(result)
    }

    pub async fn has_live(mm: &ModelManager, user_id: Uuid, resource_id: &str) -> DatabaseResult<bool> {
        let exists = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM resource_submissions
                WHERE user_id = $1 AND resource_id = $2 AND deleted_at IS NULL
            )
            "#,
        )
        .bind(user_id)
        .bind(resource_id)
        .fetch_one(mm.executor())
        .await?;
        Ok(exists)
    }

    pub async fn list_for_user_resource(
        mm: &ModelManager,
        user_id: Uuid,
        resource_id: &str,
    ) -> DatabaseResult<Vec<Self>> {
        let rows = sqlx::query_as(
            r#"
            SELECT * FROM resource_submissions
            WHERE user_id = $1 AND resource_id = $2 AND deleted_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(resource_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }

    pub async fn list_for_user_in_pathway(
        mm: &ModelManager,
        user_id: Uuid,
        pathway_id: &str,
    ) -> DatabaseResult<Vec<Self>> {
        let rows = sqlx::query_as(
            r#"
            SELECT s.* FROM resource_submissions s
            JOIN resources r ON r.id = s.resource_id
            WHERE s.user_id = $1 AND r.pathway_id = $2 AND s.deleted_at IS NULL
            ORDER BY s.created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(pathway_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }

    pub async fn soft_delete(self, mm: &ModelManager) -> DatabaseResult<()> {
        sqlx::query(
            "UPDATE resource_submissions SET deleted_at = now(), updated_at = now() WHERE id = $1",
        )
        .bind(self.id)
        .execute(mm.executor())
        .await?;
        Ok(())
    }

    pub async fn review(
        self,
        conn: &mut PgConnection,
        reviewer: Uuid,
        status: &str,
        grade: &str,
        comments: Option<&str>,
    ) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            UPDATE resource_submissions
            SET submission_status = $1, grade = $2, review_comments = $3,
                reviewed_by = $4, reviewed_at = now(), updated_at = now()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(grade)
        .bind(comments)
        .bind(reviewer)
        .bind(self.id)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    /// Unreviewed uploads, oldest first.
    pub async fn list_pending(
        mm: &ModelManager,
        pathway_id: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<PendingSubmissionRow>> {
        let query = format!(
            r#"{PENDING_SELECT}
            WHERE s.submission_status = 'uploaded'
              AND s.reviewed_at IS NULL
              AND s.deleted_at IS NULL
              AND ($1::text IS NULL OR r.pathway_id = $1)
            ORDER BY s.created_at ASC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query_as(&query)
            .bind(pathway_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(mm.executor())
            .await?;
        Ok(rows)
    }

    /// Dashboard listing: uploaded first, then rejected, then the rest, oldest first within each.
    pub async fn list_for_dashboard(mm: &ModelManager) -> DatabaseResult<Vec<PendingSubmissionRow>> {
        let query = format!(
            r#"{PENDING_SELECT}
            WHERE s.deleted_at IS NULL
            ORDER BY
                CASE s.submission_status WHEN 'uploaded' THEN 0 WHEN 'rejected' THEN 1 ELSE 2 END,
                s.created_at ASC
            LIMIT 100
            "#
        );
        let rows = sqlx::query_as(&query).fetch_all(mm.executor()).await?;
        Ok(rows)
    }

    pub async fn stats(mm: &ModelManager) -> DatabaseResult<SubmissionStats> {
        let stats = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE submission_status = 'uploaded' AND reviewed_at IS NULL)
                    AS total_pending,
                COUNT(*) FILTER (WHERE created_at::date = CURRENT_DATE) AS uploaded_today,
                COALESCE(
                    AVG(EXTRACT(EPOCH FROM (now() - created_at)) / 3600.0)
                        FILTER (WHERE submission_status = 'uploaded' AND reviewed_at IS NULL),
                    0
                )::float8 AS avg_wait_hours
            FROM resource_submissions
            WHERE deleted_at IS NULL
            "#,
        )
        .fetch_one(mm.executor())
        .await?;
        Ok(stats)
    }
}

impl HasOwner for Submission {
    fn owner_id(&self) -> Uuid {
        self.user_id
    }
}
