//! Multi-week improvement rollup.
//!
//! Recomputed from observations on every request; the weekly report cache
//! is the only persisted aggregate, so the tracker stays read-only.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::advice::{advise, MedicalAdvice};
use crate::compare::ComparisonOracle;
use crate::errors::EngineError;
use crate::metrics::WeeklyMetrics;
use crate::store::ObservationStore;
use crate::trend::{compare_weeks, Trend};
use crate::week::WeekWindow;

/// One tracked week inside the rollup.
#[derive(Debug, Clone, Serialize)]
pub struct WeeklyProgress {
    pub week: WeekWindow,
    pub dominant_label: String,
    pub mean_confidence: f64,
    pub observation_count: u32,
    pub improvement_percentage: Option<f64>,
    pub trend: Trend,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImprovementTracker {
    pub subject_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Weeks that actually had data.
    pub total_weeks: u32,
    pub overall_improvement: Option<f64>,
    pub overall_trend: Trend,
    pub current_condition: Option<String>,
    pub weekly_progress: Vec<WeeklyProgress>,
    pub best_week: Option<WeekWindow>,
    pub worst_week: Option<WeekWindow>,
    pub advice: MedicalAdvice,
}

/// Walk the last `weeks` calendar weeks and compare each against its
/// immediate predecessor. Empty weeks are skipped in the output but still
/// break the predecessor chain (a data week following an empty week has no
/// improvement figure).
pub async fn improvement_tracker(
    store: &dyn ObservationStore,
    comparison: Option<&dyn ComparisonOracle>,
    subject_id: Uuid,
    weeks: u32,
    today: NaiveDate,
) -> Result<ImprovementTracker, EngineError> {
    let period_start = today - Duration::weeks(i64::from(weeks));
    let mut weekly_progress = Vec::new();
    let mut improvements: Vec<Option<f64>> = Vec::new();

    let mut cursor = period_start;
    let mut previous: Option<WeeklyMetrics> = None;
    while cursor <= today {
        let week = WeekWindow::containing(cursor);
        let current = WeeklyMetrics::for_week(store, subject_id, week)
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?;

        if let Some(ref metrics) = current {
            let trend = compare_weeks(comparison, Some(metrics), previous.as_ref()).await?;
            weekly_progress.push(WeeklyProgress {
                week,
                dominant_label: metrics.dominant_label.clone(),
                mean_confidence: metrics.mean_confidence,
                observation_count: metrics.observation_count,
                improvement_percentage: trend.improvement_percentage,
                trend: trend.trend,
            });
            improvements.push(trend.improvement_percentage);
        }

        previous = current;
        cursor = week.end + Duration::days(1);
    }

    let known: Vec<f64> = improvements.iter().copied().flatten().collect();
    let overall_improvement = if known.is_empty() {
        None
    } else {
        Some(known.iter().sum::<f64>() / known.len() as f64)
    };
    let overall_trend = overall_improvement.map(Trend::classify).unwrap_or(Trend::Unknown);

    let with_improvement = |selector: fn(&f64, &f64) -> bool| {
        let mut chosen: Option<(&WeeklyProgress, f64)> = None;
        for progress in &weekly_progress {
            if let Some(value) = progress.improvement_percentage {
                let replace = match chosen {
                    None => true,
                    Some((_, best)) => selector(&value, &best),
                };
                if replace {
                    chosen = Some((progress, value));
                }
            }
        }
        chosen.map(|(p, _)| p.week)
    };
    let best_week = with_improvement(|candidate, best| candidate > best);
    let worst_week = with_improvement(|candidate, best| candidate < best);

    let advice = advise(&improvements);

    debug!(
        %subject_id,
        weeks_with_data = weekly_progress.len(),
        ?overall_trend,
        "assembled improvement tracker"
    );

    Ok(ImprovementTracker {
        subject_id,
        period_start,
        period_end: today,
        total_weeks: weekly_progress.len() as u32,
        overall_improvement,
        overall_trend,
        current_condition: weekly_progress.last().map(|p| p.dominant_label.clone()),
        weekly_progress,
        best_week,
        worst_week,
        advice,
    })
}
