use crate::model::repo::{ResourceTyped, optional};
use crate::model::{ModelManager, error::DatabaseResult, repo::CrudRepository};
use crate::web::AuthenticatedUser;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Pathway {
    id: String,
    slug: String,
    title: String,
    short_title: String,
    instructor: String,
    color: String,
    total_modules: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct PathwayCreate {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub short_title: String,
    pub instructor: String,
    pub color: String,
}

impl ResourceTyped for Pathway {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Pathway
    }
}

impl Pathway {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn total_modules(&self) -> i32 {
        self.total_modules
    }
}

#[async_trait::async_trait]
impl CrudRepository<Pathway, PathwayCreate, String> for Pathway {
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: PathwayCreate,
    ) -> DatabaseResult<Self> {
        let pathway = sqlx::query_as(
            r#"
            INSERT INTO pathways (id, slug, title, short_title, instructor, color)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&data.id)
        .bind(&data.slug)
        .bind(&data.title)
        .bind(&data.short_title)
        .bind(&data.instructor)
        .bind(&data.color)
        .fetch_one(mm.executor())
        .await?;
        Ok(pathway)
    }

    async fn update(
        self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: PathwayCreate,
    ) -> DatabaseResult<Self> {
        let pathway = sqlx::query_as(
            r#"
            UPDATE pathways
            SET slug = $1, title = $2, short_title = $3, instructor = $4, color = $5, updated_at = now()
            WHERE id = $6
            RETURNING *
            "#,
        )
        .bind(&data.slug)
        .bind(&data.title)
        .bind(&data.short_title)
        .bind(&data.instructor)
        .bind(&data.color)
        .bind(&self.id)
        .fetch_one(mm.executor())
        .await?;
        Ok(pathway)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM pathways WHERE id = $1")
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
        let result = sqlx::query_as("SELECT * FROM pathways WHERE id = $1")
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
        let result = sqlx::query_as("SELECT * FROM pathways ORDER BY title LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(mm.executor())
            .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pathways")
            .fetch_one(mm.executor())
            .await?;
        Ok(result)
    }
}


impl Pathway {
    pub async fn list_all(mm: &ModelManager) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as("SELECT * FROM pathways ORDER BY title")
            .fetch_all(mm.executor())
            .await?;
        Ok(result)
    }

    /// Recomputes `total_modules` from the modules table.
    pub async fn refresh_total_modules(mm: &ModelManager, id: &str) -> DatabaseResult<i32> {
        let total: i32 = sqlx::query_scalar(
            r#"
            UPDATE pathways
            SET total_modules = (SELECT COUNT(*) FROM modules WHERE pathway_id = $1), updated_at = now()
            WHERE id = $1
            RETURNING total_modules
            "#,
        )
        .bind(id)
        .fetch_one(mm.executor())
        .await?;
        Ok(total)
    }

    pub async fn refresh_all_totals(mm: &ModelManager) -> DatabaseResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE pathways p
            SET total_modules = (SELECT COUNT(*) FROM modules m WHERE m.pathway_id = p.id), updated_at = now()
            "#,
        )
        .execute(mm.executor())
        .await?;
        Ok(result.rows_affected())
    }
}
