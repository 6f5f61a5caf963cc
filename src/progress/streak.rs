//! Daily learning streak arithmetic.

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize, utoipa::ToSchema)]
pub struct StreakState {
    pub current: i32,
    pub longest: i32,
    pub last_activity_date: Option<NaiveDate>,
}

/// Advances a streak for activity on `today`.
///
/// Same day keeps the counters, the next day extends the streak, anything else (a gap,
/// no previous activity, or a date in the future) restarts it at one.
pub fn advance(previous: Option<&StreakState>, today: NaiveDate) -> StreakState {
    let Some(prev) = previous else {
        return StreakState {
            current: 1,
            longest: 1,
            last_activity_date: Some(today),
        };
    };

    let current = match prev.last_activity_date.map(|last| (today - last).num_days()) {
        Some(0) => prev.current.max(1),
        Some(1) => prev.current + 1,
        _ => 1,
    };

    StreakState {
        current,
        longest: prev.longest.max(current),
        last_activity_date: Some(today),
    }
}
