use crate::model::entity::Pathway;
use crate::model::repo::{ResourceTyped, optional};
use crate::model::{ModelManager, error::DatabaseResult, repo::CrudRepository};
use crate::web::AuthenticatedUser;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Module {
    id: String,
    pathway_id: String,
    title: String,
    description: Option<String>,
    order_index: i32,
    duration_minutes: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ModuleCreate {
    pub id: String,
    pub pathway_id: String,
    pub title: String,
    pub description: Option<String>,
    pub order_index: i32,
    pub duration_minutes: Option<i32>,
}

impl ResourceTyped for Module {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Module
    }
}

impl Module {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pathway_id(&self) -> &str {
        &self.pathway_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn order_index(&self) -> i32 {
        self.order_index
    }
}

#[async_trait::async_trait]
impl CrudRepository<Module, ModuleCreate, String> for Module {
    /// Also refreshes the owning pathway's `total_modules`.
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: ModuleCreate,
    ) -> DatabaseResult<Self> {
        let module: Module = sqlx::query_as(
            r#"
            INSERT INTO modules (id, pathway_id, title, description, order_index, duration_minutes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&data.id)
        .bind(&data.pathway_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.order_index)
        .bind(data.duration_minutes)
        .fetch_one(mm.executor())
        .await?;

        Pathway::refresh_total_modules(mm, &module.pathway_id).await?;
        Ok(module)
    }

    async fn update(
        self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: ModuleCreate,
    ) -> DatabaseResult<Self> {
        let module = sqlx::query_as(
            r#"
            UPDATE modules
            SET title = $1, description = $2, order_index = $3, duration_minutes = $4, updated_at = now()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.order_index)
        .bind(data.duration_minutes)
        .bind(&self.id)
        .fetch_one(mm.executor())
        .await?;
        Ok(module)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM modules WHERE id = $1")
            .bind(&self.id)
            .execute(mm.executor())
            .await?;
        Pathway::refresh_total_modules(mm, &self.pathway_id).await?;
        Ok(())
    }

    async fn find_by_id(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        id: String,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM modules WHERE id = $1")
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
            "SELECT * FROM modules ORDER BY pathway_id, order_index LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM modules")
            .fetch_one(mm.executor())
            .await?;
        Ok(result)
    }
}


impl Module {
    pub async fn list_by_pathway(mm: &ModelManager, pathway_id: &str) -> DatabaseResult<Vec<Self>> {
        let result =
            sqlx::query_as("SELECT * FROM modules WHERE pathway_id = $1 ORDER BY order_index")
                .bind(pathway_id)
                .fetch_all(mm.executor())
                .await?;
        Ok(result)
    }

    /// Modules of the pathway the user has not completed yet, in order.
    pub async fn next_incomplete(
        mm: &ModelManager,
        user_id: uuid::Uuid,
        pathway_id: &str,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as(
            r#"
            SELECT m.* FROM modules m
            WHERE m.pathway_id = $1
              AND NOT EXISTS (
                SELECT 1 FROM module_completions mc
                WHERE mc.module_id = m.id AND mc.user_id = $2
              )
            ORDER BY m.order_index
            LIMIT 1
            "#,
        )
        .bind(pathway_id)
        .bind(user_id)
        .fetch_one(mm.executor())
        .await;
        optional(result)
    }
}
