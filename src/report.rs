//! Report cache and orchestration.
//!
//! For each (subject, week_start) key a report is either served from the
//! store (with its embedded metrics normalized on read) or generated by
//! gathering the week's observations, comparing against the previous week
//! and invoking the narrative oracle. The persisted row is written exactly
//! once, at the very end, so a cancelled generation leaves nothing behind.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::compare::{ComparisonOracle, VisionComparisonClient};
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::metrics::{
    days_tracked, ReportMetrics, WeeklyMetrics, CONSISTENT_TRACKING_THRESHOLD,
    METRICS_SCHEMA_VERSION,
};
use crate::narrative::{LlmNarrativeClient, NarrativeOracle, WeekContext};
use crate::render::render_html;
use crate::store::{ObservationStore, ReportStore, StoreError};
use crate::trend::compare_weeks;
use crate::types::WeeklyReport;
use crate::week::WeekWindow;

type ReportKey = (Uuid, NaiveDate);

fn store_err(err: StoreError) -> EngineError {
    EngineError::Store(err.to_string())
}

/// Top-level engine. Constructed once at process start with its
/// collaborators injected; shared by reference into request handlers.
pub struct ReportEngine {
    observations: Arc<dyn ObservationStore>,
    reports: Arc<dyn ReportStore>,
    narrative: Option<Arc<dyn NarrativeOracle>>,
    comparison: Option<Arc<dyn ComparisonOracle>>,
    /// Per-key generation locks; a stalled oracle call for one key must
    /// not block any other key.
    in_flight: Mutex<HashMap<ReportKey, Arc<Mutex<()>>>>,
}

impl ReportEngine {
    pub fn new(observations: Arc<dyn ObservationStore>, reports: Arc<dyn ReportStore>) -> Self {
        Self {
            observations,
            reports,
            narrative: None,
            comparison: None,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_narrative_oracle(mut self, oracle: Arc<dyn NarrativeOracle>) -> Self {
        self.narrative = Some(oracle);
        self
    }

    pub fn with_comparison_oracle(mut self, oracle: Arc<dyn ComparisonOracle>) -> Self {
        self.comparison = Some(oracle);
        self
    }

    /// Build an engine with HTTP oracle clients taken from configuration.
    pub fn from_config(
        config: &EngineConfig,
        observations: Arc<dyn ObservationStore>,
        reports: Arc<dyn ReportStore>,
    ) -> Result<Self, EngineError> {
        let mut engine = Self::new(observations, reports);

        if let Some(url) = &config.narrative_base_url {
            let client = LlmNarrativeClient::new(
                url,
                config.narrative_api_key.as_deref().unwrap_or(""),
                &config.narrative_model,
                config.oracle_timeout(),
            )?;
            engine = engine.with_narrative_oracle(Arc::new(client));
        }

        if let Some(url) = &config.comparison_base_url {
            let client = VisionComparisonClient::new(
                url,
                config.comparison_api_key.as_deref().unwrap_or(""),
                &config.comparison_model,
                config.oracle_timeout(),
            )?;
            engine = engine.with_comparison_oracle(Arc::new(client));
        }

        Ok(engine)
    }

    /// Get or generate the report for the week containing `week_start`.
    ///
    /// The key is canonicalized to the Monday of its week, so callers
    /// passing any day of the week hit the same cache entry. Concurrent
    /// requests for one key collapse to a single generation.
    pub async fn weekly_report(
        &self,
        subject_id: Uuid,
        week_start: NaiveDate,
        force_regenerate: bool,
    ) -> Result<WeeklyReport, EngineError> {
        let week = WeekWindow::containing(week_start);
        let key = (subject_id, week.start);

        let lock = {
            let mut map = self.in_flight.lock().await;
            map.entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;

        let result = self.get_or_generate(subject_id, week, force_regenerate).await;

        let mut map = self.in_flight.lock().await;
        if map.get(&key).map(|l| Arc::strong_count(l) <= 2).unwrap_or(false) {
            map.remove(&key);
        }
        drop(map);

        result
    }

    async fn get_or_generate(
        &self,
        subject_id: Uuid,
        week: WeekWindow,
        force_regenerate: bool,
    ) -> Result<WeeklyReport, EngineError> {
        if !force_regenerate {
            if let Some(report) = self.find_migrated(subject_id, week.start).await? {
                debug!(%subject_id, week_start = %week.start, "serving cached weekly report");
                return Ok(report);
            }
        }
        self.generate(subject_id, week, force_regenerate).await
    }

    /// Cache lookup with read-time metrics migration. Never calls an oracle.
    async fn find_migrated(
        &self,
        subject_id: Uuid,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyReport>, EngineError> {
        let Some(mut report) = self
            .reports
            .find(subject_id, week_start)
            .await
            .map_err(store_err)?
        else {
            return Ok(None);
        };

        let upgraded = ReportMetrics::upgrade(&report.metrics);
        let normalized = serde_json::to_value(&upgraded)
            .map_err(|e| EngineError::Store(format!("failed to serialize metrics: {e}")))?;
        if normalized != report.metrics {
            debug!(report_id = %report.id, "normalizing stored report metrics");
            self.reports
                .update_metrics(report.id, upgraded)
                .await
                .map_err(store_err)?;
            report.metrics = normalized;
        }

        Ok(Some(report))
    }

    async fn generate(
        &self,
        subject_id: Uuid,
        week: WeekWindow,
        force_regenerate: bool,
    ) -> Result<WeeklyReport, EngineError> {
        let narrative_oracle = self.narrative.as_ref().ok_or_else(|| {
            EngineError::ServiceUnavailable("narrative oracle not configured".to_string())
        })?;

        let observations = self
            .observations
            .get_observations(subject_id, week.start_datetime(), week.end_datetime())
            .await
            .map_err(store_err)?;

        let current =
            WeeklyMetrics::from_observations(week, &observations).ok_or(EngineError::NoData)?;

        let days = days_tracked(&observations);
        let consistent_tracking = days >= CONSISTENT_TRACKING_THRESHOLD;

        let previous =
            WeeklyMetrics::for_week(self.observations.as_ref(), subject_id, week.previous())
                .await
                .map_err(store_err)?;

        let trend =
            compare_weeks(self.comparison.as_deref(), Some(&current), previous.as_ref()).await?;

        let context =
            WeekContext::assemble(week, &observations, &current, previous.as_ref(), &trend, days);
        let narrative = narrative_oracle
            .generate_report(&context)
            .await
            .map_err(EngineError::from)?;

        let metrics = ReportMetrics {
            schema_version: METRICS_SCHEMA_VERSION,
            dominant_label: Some(current.dominant_label.clone()),
            average_severity: None,
            average_confidence: current.mean_confidence,
            improvement_vs_last_week: trend.improvement_percentage,
            trend: trend.trend,
            total_observations: current.observation_count,
            days_tracked: days,
            consistent_tracking,
        };

        let rendered_html = render_html(&week, &narrative, &metrics);
        let metrics_value = serde_json::to_value(&metrics)
            .map_err(|e| EngineError::Store(format!("failed to serialize metrics: {e}")))?;

        let report = WeeklyReport {
            id: Uuid::new_v4(),
            subject_id,
            week,
            narrative,
            metrics: metrics_value,
            rendered_html,
            created_at: Utc::now(),
        };

        // Single write at the very end: a cancelled generation persists nothing.
        if force_regenerate {
            self.reports.replace(report.clone()).await.map_err(store_err)?;
            info!(%subject_id, week_start = %week.start, "weekly report regenerated");
            return Ok(report);
        }

        match self.reports.insert(report.clone()).await {
            Ok(()) => {
                info!(%subject_id, week_start = %week.start, "weekly report generated");
                Ok(report)
            }
            Err(StoreError::Conflict) => {
                warn!(
                    %subject_id,
                    week_start = %week.start,
                    "concurrent generation won the insert race, re-reading"
                );
                self.find_migrated(subject_id, week.start).await?.ok_or_else(|| {
                    EngineError::Store("report vanished after insert conflict".to_string())
                })
            }
            Err(err) => Err(store_err(err)),
        }
    }
}
