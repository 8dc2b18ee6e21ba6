//! Engagement signals: streaks, dashboard summary and the daily insight.
//!
//! Activity is the union of observation uploads and affect logs, collapsed
//! to distinct calendar days before any streak math.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::store::{AffectStore, ObservationStore};
use crate::streak::{compute_streaks, StreakState};
use crate::types::Observation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Improvement,
    Reminder,
    Motivation,
    Tip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyInsight {
    pub text: String,
    pub kind: InsightKind,
}

/// Home-screen summary for one subject.
#[derive(Debug, Clone, Serialize)]
pub struct EngagementSnapshot {
    pub streak: StreakState,
    pub observations_last_7_days: u32,
    pub affect_logs_last_7_days: u32,
    pub mean_affect_last_7_days: Option<f64>,
    pub daily_insight: DailyInsight,
}

/// Distinct calendar dates with any activity, up to and including `until`.
pub async fn activity_dates(
    observations: &dyn ObservationStore,
    affect: &dyn AffectStore,
    subject_id: Uuid,
    until: DateTime<Utc>,
) -> Result<BTreeSet<NaiveDate>, EngineError> {
    let from = DateTime::<Utc>::MIN_UTC;

    let (obs, samples) = tokio::try_join!(
        observations.get_observations(subject_id, from, until),
        affect.get_samples(subject_id, from, until),
    )
    .map_err(|e| EngineError::Store(e.to_string()))?;

    let mut dates: BTreeSet<NaiveDate> =
        obs.iter().map(|o| o.captured_at.date_naive()).collect();
    dates.extend(samples.iter().map(|s| s.logged_at.date_naive()));
    Ok(dates)
}

/// Recompute the streak state from the full activity history.
pub async fn streak_state(
    observations: &dyn ObservationStore,
    affect: &dyn AffectStore,
    subject_id: Uuid,
    now: DateTime<Utc>,
) -> Result<StreakState, EngineError> {
    let dates = activity_dates(observations, affect, subject_id, now).await?;
    let state = compute_streaks(&dates, now.date_naive());
    debug!(
        %subject_id,
        current = state.current_streak,
        longest = state.longest_streak,
        "recomputed streaks"
    );
    Ok(state)
}

const TIPS: &[&str] = &[
    "Consistency is key! Try to check in daily for best results.",
    "Remember: progress takes time. You're doing great!",
    "Your skin tells a story. Keep tracking to see the full picture.",
    "Small steps every day lead to big changes over time.",
];

/// Pick the day's insight from recent data. Deterministic for a given
/// (observations, affect mean, date) so the same day shows the same text.
pub fn daily_insight(
    recent_observations: &[Observation],
    mean_affect: Option<f64>,
    today: NaiveDate,
) -> DailyInsight {
    if recent_observations.len() >= 2 {
        let mut ordered: Vec<&Observation> = recent_observations.iter().collect();
        ordered.sort_by_key(|o| o.captured_at);
        let first = ordered[0];
        let last = ordered[ordered.len() - 1];
        let delta = (last.confidence - first.confidence) * 100.0;

        if delta > 5.0 {
            return DailyInsight {
                text: format!("Your skin improved {delta:.1}% this week! Keep it up!"),
                kind: InsightKind::Improvement,
            };
        }
        if delta < -5.0 {
            return DailyInsight {
                text: "Let's adjust your routine. Try logging your mood to find triggers."
                    .to_string(),
                kind: InsightKind::Reminder,
            };
        }
    }

    if mean_affect.is_some_and(|avg| avg > 70.0) {
        return DailyInsight {
            text: "You're in a great headspace this week! Your positivity shows.".to_string(),
            kind: InsightKind::Motivation,
        };
    }

    let tip = TIPS[today.ordinal0() as usize % TIPS.len()];
    DailyInsight {
        text: tip.to_string(),
        kind: InsightKind::Tip,
    }
}

/// Assemble the full engagement snapshot for the home screen.
pub async fn snapshot(
    observations: &dyn ObservationStore,
    affect: &dyn AffectStore,
    subject_id: Uuid,
    now: DateTime<Utc>,
) -> Result<EngagementSnapshot, EngineError> {
    let week_ago = now - Duration::days(7);

    let (recent_obs, recent_samples) = tokio::try_join!(
        observations.get_observations(subject_id, week_ago, now),
        affect.get_samples(subject_id, week_ago, now),
    )
    .map_err(|e| EngineError::Store(e.to_string()))?;

    let mean_affect = if recent_samples.is_empty() {
        None
    } else {
        Some(
            recent_samples.iter().map(|s| s.overall_score).sum::<f64>()
                / recent_samples.len() as f64,
        )
    };

    let streak = streak_state(observations, affect, subject_id, now).await?;
    let daily_insight = daily_insight(&recent_obs, mean_affect, now.date_naive());

    Ok(EngagementSnapshot {
        streak,
        observations_last_7_days: recent_obs.len() as u32,
        affect_logs_last_7_days: recent_samples.len() as u32,
        mean_affect_last_7_days: mean_affect,
        daily_insight,
    })
}
