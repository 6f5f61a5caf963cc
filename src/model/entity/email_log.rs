use crate::model::repo::{ResourceTyped, optional};
use crate::model::{ModelManager, error::DatabaseResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::prelude::FromRow;
use uuid::Uuid;

/// Audit row for every outgoing notification.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EmailLog {
    id: Uuid,
    recipient_email: String,
    recipient_user_id: Option<Uuid>,
    email_type: String,
    subject: String,
    template_name: Option<String>,
    status: String,
    sent_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    retry_count: i32,
    context_data: Option<serde_json::Value>,
    module_id: Option<String>,
    pathway_id: Option<String>,
    resource_submission_id: Option<Uuid>,
    module_completion_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Optional links from a log row to the records that triggered it.
#[derive(Debug, Clone, Default)]
pub struct EmailLinks {
    pub recipient_user_id: Option<Uuid>,
    pub module_id: Option<String>,
    pub pathway_id: Option<String>,
    pub resource_submission_id: Option<Uuid>,
    pub module_completion_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct EmailLogCreate<'a> {
    pub recipient_email: &'a str,
    pub email_type: &'a str,
    pub subject: &'a str,
    pub template_name: &'a str,
    pub context_data: serde_json::Value,
    pub links: &'a EmailLinks,
}

impl ResourceTyped for EmailLog {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::EmailLog
    }
}

impl EmailLog {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn retry_count(&self) -> i32 {
        self.retry_count
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub async fn create_pending(mm: &ModelManager, data: EmailLogCreate<'_>) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO email_logs (
                id, recipient_email, recipient_user_id, email_type, subject, template_name,
                status, context_data, module_id, pathway_id, resource_submission_id,
                module_completion_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.recipient_email)
        .bind(data.links.recipient_user_id)
        .bind(data.email_type)
        .bind(data.subject)
        .bind(data.template_name)
        .bind(&data.context_data)
        .bind(&data.links.module_id)
        .bind(&data.links.pathway_id)
        .bind(data.links.resource_submission_id)
        .bind(data.links.module_completion_id)
        .fetch_one(mm.executor())
        .await?;
        Ok(row)
    }

    pub async fn mark_sent(mm: &ModelManager, id: Uuid) -> DatabaseResult<()> {
        sqlx::query(
            "UPDATE email_logs SET status = 'sent', sent_at = now(), updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(mm.executor())
        .await?;
        Ok(())
    }

    pub async fn mark_failed(mm: &ModelManager, id: Uuid, error: &str) -> DatabaseResult<()> {
        sqlx::query(
            r#"
            UPDATE email_logs
            SET status = 'failed', failed_at = now(), error_message = $1,
                retry_count = retry_count + 1, updated_at = now()
            WHERE id = $2
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(mm.executor())
        .await?;
        Ok(())
    }

    pub async fn find_by_id(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM email_logs WHERE id = $1")
            .bind(id)
            .fetch_one(mm.executor())
            .await;
        optional(result)
    }
}
