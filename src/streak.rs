//! Consecutive-day streak computation.
//!
//! Streaks are recomputed from the full set of distinct activity dates on
//! every request; activity can be backfilled out of order, so no
//! incremental counter is trusted as authoritative.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Derived streak summary. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreakState {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_active_date: Option<NaiveDate>,
    pub total_active_days: u32,
}

/// Compute current and longest streaks over deduplicated activity dates.
///
/// The current streak tolerates a missing entry for `today` itself (the
/// check may run before the day's first activity), but breaks as soon as
/// two consecutive days are missing.
pub fn compute_streaks(dates: &BTreeSet<NaiveDate>, today: NaiveDate) -> StreakState {
    if dates.is_empty() {
        return StreakState::default();
    }

    let one_day = Duration::days(1);

    let mut current_streak = 0u32;
    let mut expected = today;
    for &date in dates.iter().rev() {
        if date == expected || date == expected - one_day {
            current_streak += 1;
            expected = date - one_day;
        } else {
            break;
        }
    }

    let mut longest_streak = 1u32;
    let mut run = 1u32;
    let mut prev: Option<NaiveDate> = None;
    for &date in dates.iter() {
        if let Some(p) = prev {
            if date - p == one_day {
                run += 1;
            } else {
                run = 1;
            }
        }
        longest_streak = longest_streak.max(run);
        prev = Some(date);
    }

    StreakState {
        current_streak,
        longest_streak,
        last_active_date: dates.iter().next_back().copied(),
        total_active_days: dates.len() as u32,
    }
}
