use crate::model::repo::{ResourceTyped, optional};
use crate::model::{ModelManager, error::DatabaseResult, repo::CrudRepository};
use crate::web::AuthenticatedUser;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

pub static RESOURCE_TYPES: [&str; 5] = ["video", "article", "exercise", "project", "quiz"];

/// A learning item inside a module. Items with `requires_upload` need a file submission.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Resource {
    id: String,
    module_id: String,
    pathway_id: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    resource_type: String,
    title: String,
    description: Option<String>,
    order_index: i32,
    duration_minutes: Option<i32>,
    requires_upload: bool,
    accepted_file_types: Option<Vec<String>>,
    max_file_size_mb: i32,
    allow_resubmission: bool,
    url: Option<String>,
    #[schema(value_type = Option<Object>)]
    metadata: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ResourceCreate {
    pub id: String,
    pub module_id: String,
    pub pathway_id: String,
    pub resource_type: String,
    pub title: String,
    pub description: Option<String>,
    pub order_index: i32,
    pub duration_minutes: Option<i32>,
    pub requires_upload: bool,
    pub accepted_file_types: Option<Vec<String>>,
    pub max_file_size_mb: i32,
    pub allow_resubmission: bool,
    pub url: Option<String>,
}

impl ResourceTyped for Resource {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Resource
    }
}

impl Resource {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn pathway_id(&self) -> &str {
        &self.pathway_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn requires_upload(&self) -> bool {
        self.requires_upload
    }

    pub fn accepted_file_types(&self) -> &[String] {
        self.accepted_file_types.as_deref().unwrap_or_default()
    }

    pub fn max_file_size_mb(&self) -> i32 {
        self.max_file_size_mb
    }

    pub fn allow_resubmission(&self) -> bool {
        self.allow_resubmission
    }
}

#[async_trait::async_trait]
impl CrudRepository<Resource, ResourceCreate, String> for Resource {
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: ResourceCreate,
    ) -> DatabaseResult<Self> {
        let resource = sqlx::query_as(
            r#"
            INSERT INTO resources (
                id, module_id, pathway_id, type, title, description, order_index,
                duration_minutes, requires_upload, accepted_file_types, max_file_size_mb,
                allow_resubmission, url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(&data.id)
        .bind(&data.module_id)
        .bind(&data.pathway_id)
        .bind(&data.resource_type)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.order_index)
        .bind(data.duration_minutes)
        .bind(data.requires_upload)
        .bind(&data.accepted_file_types)
        .bind(data.max_file_size_mb)
        .bind(data.allow_resubmission)
        .bind(&data.url)
        .fetch_one(mm.executor())
        .await?;
        Ok(resource)
    }

    async fn update(
        self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: ResourceCreate,
    ) -> DatabaseResult<Self> {
        let resource = sqlx::query_as(
            r#"
            UPDATE resources
            SET type = $1, title = $2, description = $3, order_index = $4, duration_minutes = $5,
                requires_upload = $6, accepted_file_types = $7, max_file_size_mb = $8,
                allow_resubmission = $9, url = $10, updated_at = now()
            WHERE id = $11
            RETURNING *
            "#,
        )
        .bind(&data.resource_type)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.order_index)
        .bind(data.duration_minutes)
        .bind(data.requires_upload)
        .bind(&data.accepted_file_types)
        .bind(data.max_file_size_mb)
        .bind(data.allow_resubmission)
        .bind(&data.url)
        .bind(&self.id)
        .fetch_one(mm.executor())
        .await?;
        Ok(resource)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM resources WHERE id = $1")
            .bind(&self.id)
            .execute(mm.executor())
            .await?;
        Ok(())
    }

    async fn find_by_id(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        id: String,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM resources WHERE id = $1")
            .bind(id)
            .fetch_one(mm.executor())
            .await;
        optional(result)
    }

    async fn list(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            "SELECT * FROM resources ORDER BY module_id, order_index LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resources")
            .fetch_one(mm.executor())
            .await?;
        Ok(result)
    }
}


impl Resource {
    pub async fn list_by_module(mm: &ModelManager, module_id: &str) -> DatabaseResult<Vec<Self>> {
        let result =
            sqlx::query_as("SELECT * FROM resources WHERE module_id = $1 ORDER BY order_index")
                .bind(module_id)
                .fetch_all(mm.executor())
                .await?;
        Ok(result)
    }

    pub async fn list_by_pathway(mm: &ModelManager, pathway_id: &str) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            r#"
            SELECT r.* FROM resources r
            JOIN modules m ON m.id = r.module_id
            WHERE r.pathway_id = $1
            ORDER BY m.order_index, r.order_index
            "#,
        )
        .bind(pathway_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    /// Ids of the module's resources the user has not finished. A resource is finished when its
    /// completion is completed/submitted/reviewed and, for upload resources, a live submission exists.
    pub async fn incomplete_in_module(
        mm: &ModelManager,
        user_id: uuid::Uuid,
        module_id: &str,
    ) -> DatabaseResult<Vec<String>> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT r.id FROM resources r
            LEFT JOIN resource_completions rc
              ON rc.resource_id = r.id AND rc.user_id = $1
            WHERE r.module_id = $2
              AND (
                rc.id IS NULL
                OR rc.status NOT IN ('completed', 'submitted', 'reviewed')
                OR (
                  r.requires_upload AND NOT EXISTS (
                    SELECT 1 FROM resource_submissions s
                    WHERE s.resource_id = r.id AND s.user_id = $1 AND s.deleted_at IS NULL
                  )
                )
              )
            ORDER BY r.order_index
            "#,
        )
        .bind(user_id)
        .bind(module_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(ids)
    }
}
