//! The completion cascade: module completion, pathway percentage, streak, achievements.
//!
//! Every write of one cascade happens inside a single transaction.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::model::entity::{
    Achievement, LearningStreak, Module, ModuleCompletion, Pathway, Resource, UserProgress,
    UserProgressUpdate, UserStats,
};
use crate::model::{CrudRepository, ModelManager};
use crate::progress::achievements::newly_earned;
use crate::progress::error::{ProgressError, ProgressResult};
use crate::progress::streak::{self, StreakState};
use crate::web::AuthenticatedUser;

/// `floor(completed / total * 100)` clamped to `0..=100`; zero for an empty pathway.
pub fn completion_percentage(completed: i64, total: i64) -> i32 {
    if total <= 0 {
        return 0;
    }
    let pct = completed.max(0).saturating_mul(100) / total;
    pct.clamp(0, 100) as i32
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ModuleCompletionOutcome {
    pub completion: ModuleCompletion,
    /// `false` when the module had been completed before; nothing else changed then.
    pub newly_completed: bool,
    pub progress: UserProgress,
    pub streak: StreakState,
    pub new_achievements: Vec<String>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ProgressChange {
    pub progress: UserProgress,
    pub new_achievements: Vec<String>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ProgressSummary {
    pub total_pathways: i64,
    pub pathways_started: i64,
    pub pathways_completed: i64,
    pub modules_completed: i64,
    pub total_time_minutes: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub achievements_earned: i64,
}

#[tracing::instrument(skip(mm))]
pub async fn complete_module(
    mm: &ModelManager,
    user_id: Uuid,
    pathway_id: &str,
    module_id: &str,
    time_spent_minutes: i32,
) -> ProgressResult<ModuleCompletionOutcome> {
    let system = AuthenticatedUser::admin();
    let module = Module::find_by_id(mm, &system, module_id.to_string())
        .await?
        .ok_or_else(|| ProgressError::ModuleNotFound(module_id.to_string()))?;

    if module.pathway_id() != pathway_id {
        return Err(ProgressError::ModuleNotInPathway {
            module_id: module_id.to_string(),
            pathway_id: pathway_id.to_string(),
        });
    }

    let pathway = Pathway::find_by_id(mm, &system, pathway_id.to_string())
        .await?
        .ok_or_else(|| ProgressError::PathwayNotFound(pathway_id.to_string()))?;

    let incomplete = Resource::incomplete_in_module(mm, user_id, module_id).await?;
    if !incomplete.is_empty() {
        return Err(ProgressError::IncompleteResources(incomplete));
    }

    let mut tx = mm.begin().await?;

    let (completion, created) = ModuleCompletion::insert_if_absent(
        &mut tx,
        user_id,
        pathway_id,
        module_id,
        time_spent_minutes.max(0),
    )
    .await?;

    let mut progress = UserProgress::ensure(&mut tx, user_id, pathway_id).await?;
    if created {
        let completed = ModuleCompletion::count_in_pathway(&mut tx, user_id, pathway_id).await?;
        let percentage = completion_percentage(completed, i64::from(pathway.total_modules()));
        progress = progress
            .record_module_completion(
                &mut tx,
                module_id,
                completed as i32,
                percentage,
                time_spent_minutes.max(0),
            )
            .await?;
    }

    let streak = touch_streak(&mut tx, user_id, Utc::now().date_naive()).await?;
    let new_achievements = evaluate_achievements(&mut tx, user_id).await?;

    tx.commit().await?;

    tracing::info!(
        "user {} completed module {} ({}%), new achievements: {:?}",
        user_id,
        module_id,
        progress.progress_percentage(),
        new_achievements
    );

    Ok(ModuleCompletionOutcome {
        completion,
        newly_completed: created,
        progress,
        streak,
        new_achievements,
    })
}

/// Creates the progress row if needed and counts the visit towards the streak.
#[tracing::instrument(skip(mm))]
pub async fn start_pathway(
    mm: &ModelManager,
    user_id: Uuid,
    pathway_id: &str,
) -> ProgressResult<ProgressChange> {
    let system = AuthenticatedUser::admin();
    Pathway::find_by_id(mm, &system, pathway_id.to_string())
        .await?
        .ok_or_else(|| ProgressError::PathwayNotFound(pathway_id.to_string()))?;

    let mut tx = mm.begin().await?;
    let progress = UserProgress::ensure(&mut tx, user_id, pathway_id).await?;
    touch_streak(&mut tx, user_id, Utc::now().date_naive()).await?;
    let new_achievements = evaluate_achievements(&mut tx, user_id).await?;
    tx.commit().await?;

    Ok(ProgressChange {
        progress,
        new_achievements,
    })
}

/// Partial update of a progress row. Reaching 100% stamps `completed_at` and re-checks achievements.
#[tracing::instrument(skip(mm, data))]
pub async fn update_progress(
    mm: &ModelManager,
    user_id: Uuid,
    pathway_id: &str,
    data: &UserProgressUpdate,
) -> ProgressResult<ProgressChange> {
    let system = AuthenticatedUser::admin();
    Pathway::find_by_id(mm, &system, pathway_id.to_string())
        .await?
        .ok_or_else(|| ProgressError::PathwayNotFound(pathway_id.to_string()))?;

    let mut tx = mm.begin().await?;
    let progress = UserProgress::ensure(&mut tx, user_id, pathway_id).await?;
    let progress = progress.update_fields(&mut tx, data).await?;

    let new_achievements = if progress.progress_percentage() >= 100 {
        evaluate_achievements(&mut tx, user_id).await?
    } else {
        Vec::new()
    };
    tx.commit().await?;

    Ok(ProgressChange {
        progress,
        new_achievements,
    })
}

pub async fn touch_streak(
    conn: &mut PgConnection,
    user_id: Uuid,
    today: NaiveDate,
) -> ProgressResult<StreakState> {
    let previous = LearningStreak::find(conn, user_id).await?.map(|s| s.state());
    let next = streak::advance(previous.as_ref(), today);
    if previous.as_ref() != Some(&next) {
        LearningStreak::save(conn, user_id, &next).await?;
    }
    Ok(next)
}

/// Awards every achievement the user now qualifies for. Returns only the new ones.
pub async fn evaluate_achievements(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> ProgressResult<Vec<String>> {
    let catalog = Achievement::list_all(conn).await?;
    let earned = Achievement::earned_ids(conn, user_id).await?;
    let stats = UserStats::load(conn, user_id).await?;

    let mut awarded = Vec::new();
    for id in newly_earned(&catalog, &earned, &stats) {
        if Achievement::award(conn, user_id, id).await? {
            awarded.push(id.to_string());
        }
    }
    Ok(awarded)
}

pub async fn summary(mm: &ModelManager, user_id: Uuid) -> ProgressResult<ProgressSummary> {
    let mut conn = mm.executor().acquire().await?;
    let stats = UserStats::load(&mut conn, user_id).await?;
    let longest = LearningStreak::find(&mut conn, user_id)
        .await?
        .map(|s| s.state().longest)
        .unwrap_or(0);

    let (total_pathways, achievements_earned): (i64, i64) = sqlx::query_as(
        r#"
        SELECT (SELECT COUNT(*) FROM pathways),
               (SELECT COUNT(*) FROM user_achievements WHERE user_id = $1)
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(ProgressSummary {
        total_pathways,
        pathways_started: stats.pathways_started,
        pathways_completed: stats.pathways_completed,
        modules_completed: stats.modules_completed,
        total_time_minutes: stats.total_time_minutes,
        current_streak: stats.current_streak,
        longest_streak: i64::from(longest),
        achievements_earned,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn percentage_floors() {
        assert_eq!(completion_percentage(1, 3), 33);
        assert_eq!(completion_percentage(2, 3), 66);
        assert_eq!(completion_percentage(3, 3), 100);
    }

    #[test]
    fn percentage_is_clamped() {
        assert_eq!(completion_percentage(5, 3), 100);
        assert_eq!(completion_percentage(-1, 3), 0);
    }

    #[test]
    fn empty_pathway_is_zero() {
        assert_eq!(completion_percentage(0, 0), 0);
        assert_eq!(completion_percentage(4, 0), 0);
    }
}
