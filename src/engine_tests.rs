//! Orchestrator-level tests exercising the report engine end to end
//! against the in-memory stores and mock oracles.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use crate::errors::{EngineError, OracleError};
    use crate::metrics::{ReportMetrics, METRICS_SCHEMA_VERSION};
    use crate::narrative::{NarrativeOracle, WeekContext};
    use crate::report::ReportEngine;
    use crate::store::{MemoryStore, ReportStore, StoreError};
    use crate::trend::Trend;
    use crate::types::{NarrativeReport, Observation, WeeklyReport};
    use crate::week::WeekWindow;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }

    struct CountingNarrative {
        calls: AtomicU32,
    }

    impl CountingNarrative {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
            })
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NarrativeOracle for CountingNarrative {
        async fn generate_report(
            &self,
            context: &WeekContext,
        ) -> Result<NarrativeReport, OracleError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(NarrativeReport {
                title: format!("Report #{call}"),
                summary: format!("{} observations reviewed.", context.total_observations),
                insights: vec![],
                recommendations: vec![],
                next_steps: "Keep tracking daily.".to_string(),
            })
        }
    }

    fn ts(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    async fn seed(store: &MemoryStore, subject: Uuid, at: DateTime<Utc>, label: &str, confidence: f64) {
        store
            .add_observation(Observation {
                id: Uuid::new_v4(),
                subject_id: subject,
                captured_at: at,
                label: label.to_string(),
                confidence,
                image_ref: None,
            })
            .await;
    }

    fn engine(store: &Arc<MemoryStore>, narrative: &Arc<CountingNarrative>) -> ReportEngine {
        ReportEngine::new(store.clone(), store.clone()).with_narrative_oracle(narrative.clone())
    }

    /// Mon/Wed/Fri uploads with mixed labels produce the expected metrics.
    #[tokio::test]
    async fn week_with_three_tracked_days_aggregates_correctly() {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let narrative = CountingNarrative::new();
        let subject = Uuid::new_v4();

        seed(&store, subject, ts(2024, 6, 10, 9), "eczema", 0.6).await;
        seed(&store, subject, ts(2024, 6, 12, 9), "eczema", 0.7).await;
        seed(&store, subject, ts(2024, 6, 14, 9), "psoriasis", 0.8).await;

        let engine = engine(&store, &narrative);
        // Request by an arbitrary mid-week date; the key canonicalizes to Monday.
        let report = engine
            .weekly_report(subject, NaiveDate::from_ymd_opt(2024, 6, 12).unwrap(), false)
            .await
            .unwrap();

        assert_eq!(report.week.start, NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());

        let metrics: ReportMetrics = serde_json::from_value(report.metrics.clone()).unwrap();
        assert_eq!(metrics.dominant_label.as_deref(), Some("eczema"));
        assert!((metrics.average_confidence - 0.7).abs() < 1e-9);
        assert_eq!(metrics.total_observations, 3);
        assert_eq!(metrics.days_tracked, 3);
        assert!(metrics.consistent_tracking);
        // No prior-week data: insufficient regardless of this week's richness.
        assert_eq!(metrics.trend, Trend::InsufficientData);
        assert!(metrics.improvement_vs_last_week.is_none());

        assert!(report.rendered_html.contains("Report #1"));
    }

    /// A second non-forced request serves the cached row byte for byte and
    /// never touches the oracle again.
    #[tokio::test]
    async fn repeated_requests_are_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let narrative = CountingNarrative::new();
        let subject = Uuid::new_v4();
        seed(&store, subject, ts(2024, 6, 10, 9), "eczema", 0.6).await;

        let engine = engine(&store, &narrative);
        let week_start = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();

        let first = engine.weekly_report(subject, week_start, false).await.unwrap();
        let second = engine.weekly_report(subject, week_start, false).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(
            serde_json::to_string(&first.metrics).unwrap(),
            serde_json::to_string(&second.metrics).unwrap()
        );
        assert_eq!(narrative.call_count(), 1);
        assert_eq!(store.report_count().await, 1);
    }

    #[tokio::test]
    async fn force_regeneration_replaces_the_cached_row() {
        let store = Arc::new(MemoryStore::new());
        let narrative = CountingNarrative::new();
        let subject = Uuid::new_v4();
        seed(&store, subject, ts(2024, 6, 10, 9), "eczema", 0.6).await;

        let engine = engine(&store, &narrative);
        let week_start = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();

        let first = engine.weekly_report(subject, week_start, false).await.unwrap();
        let regenerated = engine.weekly_report(subject, week_start, true).await.unwrap();

        assert_ne!(first.id, regenerated.id);
        assert_eq!(regenerated.narrative.title, "Report #2");
        assert_eq!(narrative.call_count(), 2);
        assert_eq!(store.report_count().await, 1);

        // The replacement is now the cached row.
        let cached = engine.weekly_report(subject, week_start, false).await.unwrap();
        assert_eq!(cached.id, regenerated.id);
    }

    #[tokio::test]
    async fn missing_narrative_oracle_is_service_unavailable() {
        let store = Arc::new(MemoryStore::new());
        let subject = Uuid::new_v4();
        seed(&store, subject, ts(2024, 6, 10, 9), "eczema", 0.6).await;

        let engine = ReportEngine::new(store.clone(), store.clone());
        let err = engine
            .weekly_report(subject, NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn empty_week_is_no_data_not_a_report() {
        let store = Arc::new(MemoryStore::new());
        let narrative = CountingNarrative::new();
        let engine = engine(&store, &narrative);

        let err = engine
            .weekly_report(Uuid::new_v4(), NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoData));
        assert_eq!(narrative.call_count(), 0);
    }

    #[tokio::test]
    async fn prior_week_data_feeds_the_local_trend_estimate() {
        let store = Arc::new(MemoryStore::new());
        let narrative = CountingNarrative::new();
        let subject = Uuid::new_v4();

        // Previous week mean 0.6; current week mean 0.66 -> +10%, stable.
        seed(&store, subject, ts(2024, 6, 4, 9), "eczema", 0.6).await;
        seed(&store, subject, ts(2024, 6, 11, 9), "eczema", 0.66).await;

        let engine = engine(&store, &narrative);
        let report = engine
            .weekly_report(subject, NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(), false)
            .await
            .unwrap();

        let metrics: ReportMetrics = serde_json::from_value(report.metrics.clone()).unwrap();
        let improvement = metrics.improvement_vs_last_week.unwrap();
        assert!((improvement - 10.0).abs() < 1e-9);
        assert_eq!(metrics.trend, Trend::Stable);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_requests_for_one_key_collapse_to_a_single_generation() {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let narrative = CountingNarrative::new();
        let subject = Uuid::new_v4();
        seed(&store, subject, ts(2024, 6, 10, 9), "eczema", 0.6).await;

        let engine = Arc::new(engine(&store, &narrative));
        let week_start = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();

        let a = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.weekly_report(subject, week_start, false).await })
        };
        let b = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.weekly_report(subject, week_start, false).await })
        };

        let first = a.await.unwrap().unwrap();
        let second = b.await.unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(narrative.call_count(), 1);
        assert_eq!(store.report_count().await, 1);
    }

    /// A row persisted under an earlier metrics schema is normalized when
    /// served from cache, without any oracle involvement.
    #[tokio::test]
    async fn cached_legacy_metrics_are_migrated_on_read() {
        let store = Arc::new(MemoryStore::new());
        let narrative = CountingNarrative::new();
        let subject = Uuid::new_v4();
        let week = WeekWindow::containing(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());

        let legacy = WeeklyReport {
            id: Uuid::new_v4(),
            subject_id: subject,
            week,
            narrative: NarrativeReport {
                title: "Older report".to_string(),
                summary: "Stored before the schema change.".to_string(),
                insights: vec![],
                recommendations: vec![],
                next_steps: String::new(),
            },
            metrics: serde_json::json!({
                "primary_condition": "eczema",
                "average_confidence": 0.72,
                "improvement_percentage": 14.5,
                "severity_trend": "improving",
                "total_images": 5
            }),
            rendered_html: "<html></html>".to_string(),
            created_at: Utc::now(),
        };
        store.replace(legacy.clone()).await.unwrap();

        let engine = engine(&store, &narrative);
        let served = engine.weekly_report(subject, week.start, false).await.unwrap();

        assert_eq!(served.id, legacy.id);
        let metrics: ReportMetrics = serde_json::from_value(served.metrics.clone()).unwrap();
        assert_eq!(metrics.schema_version, METRICS_SCHEMA_VERSION);
        assert_eq!(metrics.dominant_label.as_deref(), Some("eczema"));
        assert_eq!(metrics.improvement_vs_last_week, Some(14.5));
        assert_eq!(metrics.total_observations, 5);
        assert_eq!(narrative.call_count(), 0);

        // The normalized shape was written back to the store.
        let stored = store.find(subject, week.start).await.unwrap().unwrap();
        assert_eq!(stored.metrics, served.metrics);
    }

    /// Report store that loses the insert race exactly once: the first
    /// lookup misses, the insert hits the uniqueness constraint, and the
    /// winner's row is visible on re-read.
    struct RacyReportStore {
        winner: WeeklyReport,
        raced: Mutex<bool>,
    }

    #[async_trait]
    impl ReportStore for RacyReportStore {
        async fn find(
            &self,
            _subject_id: Uuid,
            _week_start: NaiveDate,
        ) -> Result<Option<WeeklyReport>, StoreError> {
            if *self.raced.lock().await {
                Ok(Some(self.winner.clone()))
            } else {
                Ok(None)
            }
        }

        async fn insert(&self, _report: WeeklyReport) -> Result<(), StoreError> {
            *self.raced.lock().await = true;
            Err(StoreError::Conflict)
        }

        async fn replace(&self, _report: WeeklyReport) -> Result<(), StoreError> {
            Ok(())
        }

        async fn update_metrics(&self, _id: Uuid, _metrics: ReportMetrics) -> Result<(), StoreError> {
            Err(StoreError::Backend("unexpected metrics update".to_string()))
        }
    }

    #[tokio::test]
    async fn an_insert_conflict_resolves_by_re_reading_the_winner() {
        let observations = Arc::new(MemoryStore::new());
        let narrative = CountingNarrative::new();
        let subject = Uuid::new_v4();
        seed(&observations, subject, ts(2024, 6, 10, 9), "eczema", 0.6).await;

        let week = WeekWindow::containing(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
        let winner_metrics = ReportMetrics {
            schema_version: METRICS_SCHEMA_VERSION,
            dominant_label: Some("eczema".to_string()),
            average_severity: None,
            average_confidence: 0.6,
            improvement_vs_last_week: None,
            trend: Trend::InsufficientData,
            total_observations: 1,
            days_tracked: 1,
            consistent_tracking: false,
        };
        let winner = WeeklyReport {
            id: Uuid::new_v4(),
            subject_id: subject,
            week,
            narrative: NarrativeReport {
                title: "Winner".to_string(),
                summary: "Generated by the concurrent request.".to_string(),
                insights: vec![],
                recommendations: vec![],
                next_steps: String::new(),
            },
            metrics: serde_json::to_value(&winner_metrics).unwrap(),
            rendered_html: String::new(),
            created_at: Utc::now(),
        };

        let reports = Arc::new(RacyReportStore {
            winner: winner.clone(),
            raced: Mutex::new(false),
        });

        let engine = ReportEngine::new(observations.clone(), reports)
            .with_narrative_oracle(narrative.clone());

        let served = engine.weekly_report(subject, week.start, false).await.unwrap();
        assert_eq!(served.id, winner.id);
        assert_eq!(served.narrative.title, "Winner");
        assert_eq!(narrative.call_count(), 1);
    }
}
