use serde::{Deserialize, Serialize};

use crate::{
    model::entity::{EarnedAchievementRow, Module, Pathway, PathwayProgressRow, UserProgress},
    progress::{streak::StreakState, tracker::ProgressSummary},
};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct StartPathwayRequest {
    pub pathway_id: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CompleteModuleRequest {
    pub module_id: String,
    pub pathway_id: String,
    #[serde(default)]
    pub time_spent_minutes: i32,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct CompletionsQuery {
    pub pathway_id: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ModuleStatus {
    #[serde(flatten)]
    pub module: Module,
    pub completed: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PathwayDetailResponse {
    pub pathway: Pathway,
    pub progress: UserProgress,
    pub modules: Vec<ModuleStatus>,
    pub next_module: Option<Module>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DashboardResponse {
    pub pathways: Vec<PathwayProgressRow>,
    pub summary: ProgressSummary,
    pub recent_achievements: Vec<EarnedAchievementRow>,
    pub streak: StreakState,
}
