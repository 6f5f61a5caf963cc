use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::{
    ModelManager, ResourceType,
    error::DatabaseResult,
    repo::{ResourceTyped, optional},
};

/// Persisted refresh token. Only the sha-256 hash of the raw token is stored.
#[derive(Debug, Serialize, FromRow)]
pub struct RefreshToken {
    id: Uuid,
    user_id: Uuid,
    #[serde(skip)]
    token_hash: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

#[derive(Debug)]
pub struct RefreshTokenCreate<'a> {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

impl ResourceTyped for RefreshToken {
    fn get_resource_type() -> ResourceType {
        ResourceType::RefreshToken
    }
}

impl RefreshToken {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }

    pub async fn store(mm: &ModelManager, data: RefreshTokenCreate<'_>) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.user_id)
        .bind(&data.token_hash)
        .bind(data.expires_at)
        .bind(data.ip_address)
        .bind(data.user_agent)
        .fetch_one(mm.executor())
        .await?;
        Ok(row)
    }

    pub async fn find_by_hash(mm: &ModelManager, token_hash: &str) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM refresh_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_one(mm.executor())
            .await;
        optional(result)
    }

    /// Revokes the row unless it was already revoked. Returns whether this call revoked it,
    /// so two concurrent refreshes with the same token cannot both succeed.
    pub async fn revoke(&self, mm: &ModelManager) -> DatabaseResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = now() WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(self.id)
        .execute(mm.executor())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn revoke_for_user(
        mm: &ModelManager,
        user_id: Uuid,
        token_hash: &str,
    ) -> DatabaseResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked_at = now()
            WHERE user_id = $1 AND token_hash = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .execute(mm.executor())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn revoke_all_for_user(mm: &ModelManager, user_id: Uuid) -> DatabaseResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = now() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(mm.executor())
        .await?;
        Ok(result.rows_affected())
    }
}
