use crate::auth::lockout::{FailedAttempt, LockoutPolicy};
use crate::impl_paginatable_for;
use crate::model::access::HasOwner;
use crate::model::repo::{ResourceTyped, optional};
use crate::web::AuthenticatedUser;
use crate::web::UserRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::{ModelManager, error::DatabaseResult, repo::CrudRepository};

pub static ACCOUNT_ACTIVE: &str = "active";
pub static ACCOUNT_DELETED: &str = "deleted";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct UserEntity {
    id: Uuid,
    email: String,
    full_name: String,
    #[serde(skip)]
    password_hash: Option<String>,
    role: String,
    email_verified: bool,
    account_status: String,
    #[serde(skip)]
    failed_login_attempts: i32,
    #[serde(skip)]
    locked_until: Option<DateTime<Utc>>,
    last_login: Option<DateTime<Utc>>,
    onboarding_completed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct UserEntityCreateUpdate {
    pub email: String,
    pub full_name: String,
    pub password_hash: Option<String>,
    pub role: String,
    pub email_verified: bool,
}

impl UserEntityCreateUpdate {
    pub fn with_password(email: &str, full_name: &str, password_hash: String) -> Self {
        Self {
            email: email.to_string(),
            full_name: full_name.to_string(),
            password_hash: Some(password_hash),
            role: UserRole::User.to_string(),
            email_verified: false,
        }
    }

    /// Accounts created through an identity provider have no local password.
    pub fn oauth(email: &str, full_name: &str) -> Self {
        Self {
            email: email.to_string(),
            full_name: full_name.to_string(),
            password_hash: None,
            role: UserRole::User.to_string(),
            email_verified: true,
        }
    }

    pub fn role(mut self, role: UserRole) -> Self {
        self.role = role.to_string();
        self
    }
}

impl ResourceTyped for UserEntity {
    fn get_resource_type() -> crate::model::repo::ResourceType {
        crate::model::repo::ResourceType::User
    }
}

impl UserEntity {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }

    pub fn role(&self) -> UserRole {
        UserRole::from(self.role.as_str())
    }

    pub fn email_verified(&self) -> bool {
        self.email_verified
    }

    pub fn account_status(&self) -> &str {
        &self.account_status
    }

    pub fn is_active(&self) -> bool {
        self.account_status == ACCOUNT_ACTIVE
    }

    pub fn failed_login_attempts(&self) -> i32 {
        self.failed_login_attempts
    }

    pub fn locked_until(&self) -> Option<DateTime<Utc>> {
        self.locked_until
    }

    pub fn last_login(&self) -> Option<DateTime<Utc>> {
        self.last_login
    }
}

#[async_trait::async_trait]
impl CrudRepository<UserEntity, UserEntityCreateUpdate, Uuid> for UserEntity {
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: UserEntityCreateUpdate,
    ) -> DatabaseResult<Self> {
        let user = sqlx::query_as(
            r#"
            INSERT INTO users (id, email, full_name, password_hash, role, email_verified, account_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.email.trim().to_lowercase())
        .bind(data.full_name.trim())
        .bind(&data.password_hash)
        .bind(&data.role)
        .bind(data.email_verified)
        .bind(ACCOUNT_ACTIVE)
        .fetch_one(mm.executor())
        .await?;

        Ok(user)
    }

    async fn update(
        self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: UserEntityCreateUpdate,
    ) -> DatabaseResult<Self> {
        let user = sqlx::query_as(
            r#"
            UPDATE users SET full_name = $1, role = $2, email_verified = $3, updated_at = now()
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(data.full_name.trim())
        .bind(&data.role)
        .bind(data.email_verified)
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;

        Ok(user)
    }

    /// Accounts are never removed: the row is marked `deleted` and every open
    /// session is revoked, so progress and submissions stay on record.
    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        let mut tx = mm.begin().await?;
        sqlx::query(
            "UPDATE users SET account_status = $1, updated_at = now() WHERE id = $2",
        )
        .bind(ACCOUNT_DELETED)
        .bind(self.id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = now() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(self.id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM users WHERE id = $1")
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
        let result = sqlx::query_as("SELECT * FROM users ORDER BY created_at LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(mm.executor())
            .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(mm.executor())
            .await?;

        Ok(result)
    }
}

impl_paginatable_for!(UserEntity, UserEntityCreateUpdate, Uuid);

impl HasOwner for UserEntity {
    fn owner_id(&self) -> Uuid {
        self.id
    }
}

impl UserEntity {
    pub async fn find_by_email(mm: &ModelManager, email: &str) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(email.trim().to_lowercase())
            .fetch_one(mm.executor())
            .await;
        optional(result)
    }

    /// Users that receive staff notifications.
    pub async fn list_staff_emails(mm: &ModelManager) -> DatabaseResult<Vec<String>> {
        let emails = sqlx::query_scalar(
            "SELECT email FROM users WHERE role IN ('admin', 'instructor') AND account_status = 'active'",
        )
        .fetch_all(mm.executor())
        .await?;
        Ok(emails)
    }

    /// Counts one failed login in a single statement so concurrent guesses
    /// can't overwrite each other, and locks the account at the threshold.
    pub async fn record_failed_login(
        &mut self,
        mm: &ModelManager,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> DatabaseResult<FailedAttempt> {
        let (attempts, locked_until): (i32, Option<DateTime<Utc>>) = sqlx::query_as(
            r#"
            UPDATE users
            SET failed_login_attempts = failed_login_attempts + 1,
                locked_until = CASE
                    WHEN failed_login_attempts + 1 >= $1 THEN $2
                    ELSE locked_until
                END,
                updated_at = now()
            WHERE id = $3
            RETURNING failed_login_attempts, locked_until
            "#,
        )
        .bind(policy.max_attempts())
        .bind(policy.lock_until(now))
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;

        self.failed_login_attempts = attempts;
        self.locked_until = locked_until;
        Ok(FailedAttempt {
            attempts,
            locked_until: (attempts >= policy.max_attempts()).then_some(locked_until).flatten(),
        })
    }

    /// Clears the lockout counters and stamps `last_login`.
    pub async fn record_login(&mut self, mm: &ModelManager) -> DatabaseResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = 0, locked_until = NULL, last_login = $1, updated_at = now()
            WHERE id = $2
            "#,
        )
        .bind(now)
        .bind(self.id)
        .execute(mm.executor())
        .await?;

        self.failed_login_attempts = 0;
        self.locked_until = None;
        self.last_login = Some(now);
        Ok(())
    }

    pub async fn set_password_hash(&mut self, mm: &ModelManager, hash: String) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2")
            .bind(&hash)
            .bind(self.id)
            .execute(mm.executor())
            .await?;

        self.password_hash = Some(hash);
        Ok(())
    }
}
