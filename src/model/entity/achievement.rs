use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::prelude::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: Option<String>,
    pub category: String,
    pub requirement_type: String,
    pub requirement_value: Option<i32>,
}

/// Catalog entry with the user's earned flag.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct AchievementStatusRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: Option<String>,
    pub category: String,
    pub requirement_type: String,
    pub requirement_value: Option<i32>,
    pub earned: bool,
    pub earned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct EarnedAchievementRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: Option<String>,
    pub category: String,
    pub earned_at: DateTime<Utc>,
}

/// Counters the achievement rules are evaluated against.
#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct UserStats {
    pub modules_completed: i64,
    pub pathways_completed: i64,
    pub pathways_started: i64,
    pub total_time_minutes: i64,
    pub current_streak: i64,
}

impl ResourceTyped for Achievement {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Achievement
    }
}

impl Achievement {
    pub async fn list_all(conn: &mut PgConnection) -> DatabaseResult<Vec<Self>> {
        let rows = sqlx::query_as(
            r#"
            SELECT id, name, description, icon, category, requirement_type, requirement_value
            FROM achievements ORDER BY category, requirement_value NULLS FIRST, id
            "#,
        )
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    pub async fn earned_ids(conn: &mut PgConnection, user_id: Uuid) -> DatabaseResult<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT achievement_id FROM user_achievements WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(conn)
            .await?;
        Ok(ids)
    }

    /// Idempotent, returns `true` only when the award is new.
    pub async fn award(
        conn: &mut PgConnection,
        user_id: Uuid,
        achievement_id: &str,
    ) -> DatabaseResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_achievements (id, user_id, achievement_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, achievement_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(achievement_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn list_with_status(
        mm: &ModelManager,
        user_id: Uuid,
    ) -> DatabaseResult<Vec<AchievementStatusRow>> {
        let rows = sqlx::query_as(
            r#"
            SELECT a.id, a.name, a.description, a.icon, a.category, a.requirement_type,
                   a.requirement_value, (ua.id IS NOT NULL) AS earned, ua.earned_at
            FROM achievements a
            LEFT JOIN user_achievements ua ON ua.achievement_id = a.id AND ua.user_id = $1
            ORDER BY a.category, a.requirement_value NULLS FIRST, a.id
            "#,
        )
        .bind(user_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }

    /// Earned achievements, newest first.
    pub async fn list_earned(
        conn: &mut PgConnection,
        user_id: Uuid,
        limit: Option<i64>,
    ) -> DatabaseResult<Vec<EarnedAchievementRow>> {
        let rows = sqlx::query_as(
            r#"
            SELECT a.id, a.name, a.description, a.icon, a.category, ua.earned_at
            FROM user_achievements ua
            JOIN achievements a ON a.id = ua.achievement_id
            WHERE ua.user_id = $1
            ORDER BY ua.earned_at DESC, a.id
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }
}

impl UserStats {
    pub async fn load(conn: &mut PgConnection, user_id: Uuid) -> DatabaseResult<Self> {
        let stats = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM module_completions WHERE user_id = $1) AS modules_completed,
                (SELECT COUNT(*) FROM user_progress
                    WHERE user_id = $1 AND progress_percentage >= 100) AS pathways_completed,
                (SELECT COUNT(*) FROM user_progress WHERE user_id = $1) AS pathways_started,
                (SELECT COALESCE(SUM(total_time_spent_minutes), 0) FROM user_progress
                    WHERE user_id = $1)::bigint AS total_time_minutes,
                COALESCE(
                    (SELECT current_streak FROM learning_streaks WHERE user_id = $1), 0
                )::bigint AS current_streak
            "#,
        )
        .bind(user_id)
        .fetch_one(conn)
        .await?;
        Ok(stats)
    }
}
