use crate::model::repo::{ResourceTyped, optional};
use crate::model::error::DatabaseResult;
use crate::progress::streak::StreakState;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::prelude::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct LearningStreak {
    id: Uuid,
    user_id: Uuid,
    current_streak: i32,
    longest_streak: i32,
    last_activity_date: Option<NaiveDate>,
    updated_at: DateTime<Utc>,
}

impl ResourceTyped for LearningStreak {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Streak
    }
}

impl LearningStreak {
    pub fn state(&self) -> StreakState {
        StreakState {
            current: self.current_streak,
            longest: self.longest_streak,
            last_activity_date: self.last_activity_date,
        }
    }

    pub async fn find(conn: &mut PgConnection, user_id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM learning_streaks WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(conn)
            .await;
        optional(result)
    }

    pub async fn save(
        conn: &mut PgConnection,
        user_id: Uuid,
        state: &StreakState,
    ) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO learning_streaks (id, user_id, current_streak, longest_streak, last_activity_date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE
            SET current_streak = EXCLUDED.current_streak,
                longest_streak = EXCLUDED.longest_streak,
                last_activity_date = EXCLUDED.last_activity_date,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(state.current)
        .bind(state.longest)
        .bind(state.last_activity_date)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }
}
