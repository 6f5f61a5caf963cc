use chrono::{DateTime, Utc};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::{
    ModelManager, ResourceType,
    entity::UserEntity,
    error::DatabaseResult,
    repo::{ResourceTyped, optional},
};

#[derive(Debug, FromRow)]
pub struct OAuthAccount {
    id: Uuid,
    user_id: Uuid,
    provider: String,
    provider_account_id: String,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Provider tokens as returned by the token endpoint.
#[derive(Debug, Clone)]
pub struct ProviderTokens<'a> {
    pub access_token: &'a str,
    pub refresh_token: Option<&'a str>,
    pub expires_at: DateTime<Utc>,
}

impl ResourceTyped for OAuthAccount {
    fn get_resource_type() -> ResourceType {
        ResourceType::OAuthAccount
    }
}

impl OAuthAccount {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub async fn find_user(
        mm: &ModelManager,
        provider: &str,
        provider_account_id: &str,
    ) -> DatabaseResult<Option<UserEntity>> {
        let result = sqlx::query_as(
            r#"
            SELECT u.* FROM users u
            JOIN oauth_accounts oa ON oa.user_id = u.id
            WHERE oa.provider = $1 AND oa.provider_account_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_account_id)
        .fetch_one(mm.executor())
        .await;
        optional(result)
    }

    /// Links the account, or refreshes the stored provider tokens when already linked.
    pub async fn link(
        mm: &ModelManager,
        user_id: Uuid,
        provider: &str,
        provider_account_id: &str,
        tokens: ProviderTokens<'_>,
    ) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO oauth_accounts
                (id, user_id, provider, provider_account_id, access_token, refresh_token, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (provider, provider_account_id) DO UPDATE
            SET access_token = EXCLUDED.access_token,
                refresh_token = COALESCE(EXCLUDED.refresh_token, oauth_accounts.refresh_token),
                expires_at = EXCLUDED.expires_at,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(provider)
        .bind(provider_account_id)
        .bind(tokens.access_token)
        .bind(tokens.refresh_token)
        .bind(tokens.expires_at)
        .fetch_one(mm.executor())
        .await?;
        Ok(row)
    }
}
