use crate::model::entity::{Achievement, UserStats};

/// Custom achievement awarded once the user has started any pathway.
pub static PATHWAY_STARTER: &str = "pathway-starter";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    ModulesCompleted(i64),
    PathwaysCompleted(i64),
    StreakDays(i64),
    TimeSpent(i64),
    PathwayStarter,
    /// Unknown custom rules, or threshold rules without a value, are never met.
    Unsupported,
}

impl Requirement {
    pub fn of(achievement: &Achievement) -> Self {
        if achievement.requirement_type == "custom" {
            return if achievement.id == PATHWAY_STARTER {
                Self::PathwayStarter
            } else {
                Self::Unsupported
            };
        }

        let Some(value) = achievement.requirement_value.map(i64::from) else {
            return Self::Unsupported;
        };
        match achievement.requirement_type.as_str() {
            "modules_completed" => Self::ModulesCompleted(value),
            "pathways_completed" => Self::PathwaysCompleted(value),
            "streak_days" => Self::StreakDays(value),
            "time_spent" => Self::TimeSpent(value),
            _ => Self::Unsupported,
        }
    }

    pub fn is_met(&self, stats: &UserStats) -> bool {
        match *self {
            Self::ModulesCompleted(v) => stats.modules_completed >= v,
            Self::PathwaysCompleted(v) => stats.pathways_completed >= v,
            Self::StreakDays(v) => stats.current_streak >= v,
            Self::TimeSpent(v) => stats.total_time_minutes >= v,
            Self::PathwayStarter => stats.pathways_started >= 1,
            Self::Unsupported => false,
        }
    }
}

/// Ids from `catalog` that `stats` qualifies for and that are not in `earned` yet.
pub fn newly_earned<'a>(
    catalog: &'a [Achievement],
    earned: &[String],
    stats: &UserStats,
) -> Vec<&'a str> {
    catalog
        .iter()
        .filter(|a| !earned.iter().any(|e| e == &a.id))
        .filter(|a| Requirement::of(a).is_met(stats))
        .map(|a| a.id.as_str())
        .collect()
}
