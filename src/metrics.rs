//! Per-week aggregation of observations and the versioned metrics schema
//! embedded in persisted reports.

use std::collections::BTreeSet;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::store::{ObservationStore, StoreError};
use crate::trend::Trend;
use crate::types::{Observation, ObservationRef};
use crate::week::WeekWindow;

/// Summary statistics for one subject-week. Always reproducible from the
/// observation set; cached only as part of a persisted report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyMetrics {
    pub week: WeekWindow,
    pub dominant_label: String,
    pub mean_confidence: f64,
    pub observation_count: u32,
    pub first_observation: ObservationRef,
    pub last_observation: ObservationRef,
}

impl WeeklyMetrics {
    /// Aggregate a week's observations. Returns `None` for an empty week
    /// ("no data" is not an error; callers must check before proceeding).
    ///
    /// The dominant label is the most frequent one; ties are broken by
    /// which label was first encountered in chronological order, so the
    /// result is deterministic for any given observation set.
    pub fn from_observations(week: WeekWindow, observations: &[Observation]) -> Option<Self> {
        if observations.is_empty() {
            return None;
        }

        let mut ordered: Vec<&Observation> = observations.iter().collect();
        ordered.sort_by_key(|o| o.captured_at);

        let mut counts: HashMap<&str, (u32, usize)> = HashMap::new();
        for (index, obs) in ordered.iter().enumerate() {
            let entry = counts.entry(obs.label.as_str()).or_insert((0, index));
            entry.0 += 1;
        }

        let mut dominant: Option<(&str, u32, usize)> = None;
        for (&label, &(count, first_seen)) in &counts {
            let better = match dominant {
                None => true,
                Some((_, best_count, best_first)) => {
                    count > best_count || (count == best_count && first_seen < best_first)
                }
            };
            if better {
                dominant = Some((label, count, first_seen));
            }
        }
        let (dominant_label, _, _) = dominant?;

        let mean_confidence =
            ordered.iter().map(|o| o.confidence).sum::<f64>() / ordered.len() as f64;

        let first = *ordered.first()?;
        let last = *ordered.last()?;

        Some(Self {
            week,
            dominant_label: dominant_label.to_string(),
            mean_confidence,
            observation_count: ordered.len() as u32,
            first_observation: ObservationRef::from(first),
            last_observation: ObservationRef::from(last),
        })
    }

    /// Fetch and aggregate one subject-week from the store.
    pub async fn for_week(
        store: &dyn ObservationStore,
        subject_id: Uuid,
        week: WeekWindow,
    ) -> Result<Option<Self>, StoreError> {
        let observations = store
            .get_observations(subject_id, week.start_datetime(), week.end_datetime())
            .await?;
        debug!(
            %subject_id,
            week_start = %week.start,
            count = observations.len(),
            "aggregated weekly observations"
        );
        Ok(Self::from_observations(week, &observations))
    }
}

/// Distinct calendar dates with at least one observation.
pub fn days_tracked(observations: &[Observation]) -> u32 {
    observations
        .iter()
        .map(|o| o.captured_at.date_naive())
        .collect::<BTreeSet<_>>()
        .len() as u32
}

/// Minimum distinct tracked days for a week to count as consistent.
pub const CONSISTENT_TRACKING_THRESHOLD: u32 = 3;

pub const METRICS_SCHEMA_VERSION: u32 = 2;

/// Versioned structured metrics embedded in a persisted report:
/// the week's aggregation merged with its trend result.
///
/// Older rows carry earlier key spellings; [`ReportMetrics::upgrade`]
/// normalizes any stored shape to this one without losing populated values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetrics {
    pub schema_version: u32,
    pub dominant_label: Option<String>,
    pub average_severity: Option<f64>,
    pub average_confidence: f64,
    pub improvement_vs_last_week: Option<f64>,
    pub trend: Trend,
    pub total_observations: u32,
    pub days_tracked: u32,
    pub consistent_tracking: bool,
}

impl ReportMetrics {
    /// Normalize a stored metrics value to the current schema.
    ///
    /// Legacy spellings (`primary_condition`, `improvement_percentage`,
    /// `total_images`, `total_images_uploaded`, `severity_trend`,
    /// `average_severity_score`) are read when the current key is absent.
    /// Unknown keys are dropped; populated values are never discarded.
    pub fn upgrade(value: &Value) -> Self {
        if value
            .get("schema_version")
            .and_then(Value::as_u64)
            .is_some_and(|v| v == u64::from(METRICS_SCHEMA_VERSION))
        {
            if let Ok(current) = serde_json::from_value::<Self>(value.clone()) {
                return current;
            }
        }

        let string_field = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| value.get(*k).and_then(Value::as_str))
                .map(str::to_string)
        };
        let float_field = |keys: &[&str]| keys.iter().find_map(|k| value.get(*k).and_then(Value::as_f64));
        let count_field = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| value.get(*k).and_then(Value::as_u64))
                .map(|v| v as u32)
        };

        let improvement = float_field(&["improvement_vs_last_week", "improvement_percentage"]);
        let trend = string_field(&["trend", "severity_trend"])
            .and_then(|label| Trend::from_label(&label))
            .or_else(|| improvement.map(Trend::classify))
            .unwrap_or(Trend::Unknown);

        Self {
            schema_version: METRICS_SCHEMA_VERSION,
            dominant_label: string_field(&["dominant_label", "primary_condition"]),
            average_severity: float_field(&["average_severity", "average_severity_score"]),
            average_confidence: float_field(&["average_confidence"]).unwrap_or(0.0),
            improvement_vs_last_week: improvement,
            trend,
            total_observations: count_field(&[
                "total_observations",
                "total_images_uploaded",
                "total_images",
            ])
            .unwrap_or(0),
            days_tracked: count_field(&["days_tracked"]).unwrap_or(0),
            consistent_tracking: value
                .get("consistent_tracking")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}
