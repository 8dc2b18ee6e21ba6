//! Week-over-week trend comparison.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::compare::ComparisonOracle;
use crate::errors::EngineError;
use crate::metrics::WeeklyMetrics;

/// Three-way trend label plus the two degenerate outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Worsening,
    InsufficientData,
    Unknown,
}

impl Trend {
    /// Classification thresholds: strictly above +10 improves, strictly
    /// below -10 worsens, everything else (both boundaries included) is stable.
    pub fn classify(improvement_percentage: f64) -> Self {
        if improvement_percentage > 10.0 {
            Trend::Improving
        } else if improvement_percentage < -10.0 {
            Trend::Worsening
        } else {
            Trend::Stable
        }
    }

    /// Parse a stored trend label; used when normalizing older report rows.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "improving" => Some(Trend::Improving),
            "stable" => Some(Trend::Stable),
            "worsening" => Some(Trend::Worsening),
            "insufficient_data" => Some(Trend::InsufficientData),
            "unknown" => Some(Trend::Unknown),
            _ => None,
        }
    }
}

/// Derived, ephemeral comparison outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub improvement_percentage: Option<f64>,
    pub trend: Trend,
}

impl TrendResult {
    pub const INSUFFICIENT_DATA: Self = Self {
        improvement_percentage: None,
        trend: Trend::InsufficientData,
    };
}

/// Compare two weeks of aggregated metrics.
///
/// The comparison oracle is preferred when configured; any oracle failure
/// is logged and downgraded to the local confidence-ratio estimate rather
/// than propagated. Only malformed inputs produce an error.
pub async fn compare_weeks(
    oracle: Option<&dyn ComparisonOracle>,
    current: Option<&WeeklyMetrics>,
    previous: Option<&WeeklyMetrics>,
) -> Result<TrendResult, EngineError> {
    let (current, previous) = match (current, previous) {
        (Some(c), Some(p)) => (c, p),
        _ => return Ok(TrendResult::INSUFFICIENT_DATA),
    };

    if current.mean_confidence < 0.0 || previous.mean_confidence < 0.0 {
        return Err(EngineError::Validation(
            "mean confidence cannot be negative".to_string(),
        ));
    }

    if let Some(oracle) = oracle {
        match oracle
            .compare(&previous.last_observation, &current.last_observation)
            .await
        {
            Ok(comparison) => {
                return Ok(TrendResult {
                    improvement_percentage: Some(comparison.improvement_percentage),
                    trend: Trend::classify(comparison.improvement_percentage),
                });
            }
            Err(err) => {
                warn!(error = %err, "comparison oracle failed, falling back to local estimate");
            }
        }
    }

    if previous.mean_confidence == 0.0 {
        return Ok(TrendResult {
            improvement_percentage: None,
            trend: Trend::Unknown,
        });
    }

    let improvement =
        (current.mean_confidence - previous.mean_confidence) / previous.mean_confidence * 100.0;
    Ok(TrendResult {
        improvement_percentage: Some(improvement),
        trend: Trend::classify(improvement),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::ComparisonResult;
    use crate::errors::OracleError;
    use crate::types::ObservationRef;
    use crate::week::WeekWindow;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn metrics(mean_confidence: f64) -> WeeklyMetrics {
        let week = WeekWindow::containing(NaiveDate::from_ymd_opt(2024, 6, 12).unwrap());
        let obs_ref = ObservationRef {
            id: Uuid::new_v4(),
            image_ref: Some("obs/latest.jpg".to_string()),
        };
        WeeklyMetrics {
            week,
            dominant_label: "eczema".to_string(),
            mean_confidence,
            observation_count: 3,
            first_observation: obs_ref.clone(),
            last_observation: obs_ref,
        }
    }

    struct FixedOracle(f64);

    #[async_trait]
    impl ComparisonOracle for FixedOracle {
        async fn compare(
            &self,
            _before: &ObservationRef,
            _after: &ObservationRef,
        ) -> Result<ComparisonResult, OracleError> {
            Ok(ComparisonResult {
                improvement_detected: self.0 > 0.0,
                improvement_percentage: self.0,
                severity_change: None,
                affected_area_change: None,
                detailed_analysis: None,
            })
        }
    }

    struct BrokenOracle;

    #[async_trait]
    impl ComparisonOracle for BrokenOracle {
        async fn compare(
            &self,
            _before: &ObservationRef,
            _after: &ObservationRef,
        ) -> Result<ComparisonResult, OracleError> {
            Err(OracleError::Unavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn boundaries_are_strict_for_improving_and_worsening() {
        assert_eq!(Trend::classify(10.0), Trend::Stable);
        assert_eq!(Trend::classify(-10.0), Trend::Stable);
        assert_eq!(Trend::classify(10.01), Trend::Improving);
        assert_eq!(Trend::classify(-10.01), Trend::Worsening);
    }

    #[tokio::test]
    async fn missing_either_week_is_insufficient_data() {
        let current = metrics(0.8);
        let result = compare_weeks(None, Some(&current), None).await.unwrap();
        assert_eq!(result, TrendResult::INSUFFICIENT_DATA);

        let result = compare_weeks(None, None, None).await.unwrap();
        assert_eq!(result.trend, Trend::InsufficientData);
        assert!(result.improvement_percentage.is_none());
    }

    #[tokio::test]
    async fn zero_previous_confidence_is_unknown_not_a_division_error() {
        let current = metrics(0.8);
        let previous = metrics(0.0);
        let result = compare_weeks(None, Some(&current), Some(&previous))
            .await
            .unwrap();
        assert_eq!(result.trend, Trend::Unknown);
        assert!(result.improvement_percentage.is_none());
    }

    #[tokio::test]
    async fn local_estimate_uses_the_confidence_ratio() {
        let current = metrics(0.66);
        let previous = metrics(0.6);
        let result = compare_weeks(None, Some(&current), Some(&previous))
            .await
            .unwrap();
        let improvement = result.improvement_percentage.unwrap();
        assert!((improvement - 10.0).abs() < 1e-9);
        assert_eq!(result.trend, Trend::Stable);
    }

    #[tokio::test]
    async fn oracle_result_wins_when_available() {
        let current = metrics(0.5);
        let previous = metrics(0.5);
        let oracle = FixedOracle(35.2);
        let result = compare_weeks(Some(&oracle), Some(&current), Some(&previous))
            .await
            .unwrap();
        assert_eq!(result.improvement_percentage, Some(35.2));
        assert_eq!(result.trend, Trend::Improving);
    }

    #[tokio::test]
    async fn oracle_failure_degrades_to_the_local_estimate() {
        let current = metrics(0.9);
        let previous = metrics(0.6);
        let result = compare_weeks(Some(&BrokenOracle), Some(&current), Some(&previous))
            .await
            .unwrap();
        let improvement = result.improvement_percentage.unwrap();
        assert!((improvement - 50.0).abs() < 1e-9);
        assert_eq!(result.trend, Trend::Improving);
    }

    #[tokio::test]
    async fn negative_confidence_is_rejected() {
        let current = metrics(-0.1);
        let previous = metrics(0.5);
        let err = compare_weeks(None, Some(&current), Some(&previous))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
