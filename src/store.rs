//! Store seams for observations, affect samples and weekly reports.
//!
//! The engine treats persistence as an external collaborator: it only
//! depends on these traits. An in-memory implementation ships for tests
//! and embedding harnesses.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::metrics::ReportMetrics;
use crate::types::{AffectSample, Observation, WeeklyReport};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A report row already exists for the (subject, week_start) key.
    /// Consumed by the orchestrator's re-read; never surfaced to callers.
    #[error("report already exists for this subject and week")]
    Conflict,

    #[error("storage failure: {0}")]
    Backend(String),
}

/// Read access to classified observations. Authoritative and read-only
/// from the engine's perspective.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Observations for a subject within [from, to], ordered by `captured_at` ascending.
    async fn get_observations(
        &self,
        subject_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Observation>, StoreError>;

    async fn get_observations_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Observation>, StoreError>;
}

/// Read/write access to affect samples.
#[async_trait]
pub trait AffectStore: Send + Sync {
    /// Samples for a subject within [from, to], ordered by `logged_at` ascending.
    async fn get_samples(
        &self,
        subject_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AffectSample>, StoreError>;

    async fn insert_sample(&self, sample: AffectSample) -> Result<(), StoreError>;
}

/// Weekly-report persistence keyed by (subject_id, week_start) with a
/// uniqueness constraint on that key.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn find(
        &self,
        subject_id: Uuid,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyReport>, StoreError>;

    /// Insert a new row; fails with [`StoreError::Conflict`] when a row
    /// for the same key already exists.
    async fn insert(&self, report: WeeklyReport) -> Result<(), StoreError>;

    /// Insert or overwrite the row for the report's key (force-regeneration).
    async fn replace(&self, report: WeeklyReport) -> Result<(), StoreError>;

    /// Persist normalized metrics for an existing row (migration-on-read).
    async fn update_metrics(&self, id: Uuid, metrics: ReportMetrics) -> Result<(), StoreError>;
}

#[derive(Default)]
struct MemoryState {
    observations: Vec<Observation>,
    samples: Vec<AffectSample>,
    reports: HashMap<(Uuid, NaiveDate), WeeklyReport>,
}

/// In-memory store backing all three seams.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_observation(&self, observation: Observation) {
        let mut state = self.state.lock().await;
        state.observations.push(observation);
    }

    pub async fn report_count(&self) -> usize {
        self.state.lock().await.reports.len()
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn get_observations(
        &self,
        subject_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Observation>, StoreError> {
        let state = self.state.lock().await;
        let mut result: Vec<Observation> = state
            .observations
            .iter()
            .filter(|o| o.subject_id == subject_id && o.captured_at >= from && o.captured_at <= to)
            .cloned()
            .collect();
        result.sort_by_key(|o| o.captured_at);
        Ok(result)
    }

    async fn get_observations_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Observation>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .observations
            .iter()
            .filter(|o| ids.contains(&o.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AffectStore for MemoryStore {
    async fn get_samples(
        &self,
        subject_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AffectSample>, StoreError> {
        let state = self.state.lock().await;
        let mut result: Vec<AffectSample> = state
            .samples
            .iter()
            .filter(|s| s.subject_id == subject_id && s.logged_at >= from && s.logged_at <= to)
            .cloned()
            .collect();
        result.sort_by_key(|s| s.logged_at);
        Ok(result)
    }

    async fn insert_sample(&self, sample: AffectSample) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.samples.push(sample);
        Ok(())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn find(
        &self,
        subject_id: Uuid,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyReport>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.reports.get(&(subject_id, week_start)).cloned())
    }

    async fn insert(&self, report: WeeklyReport) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let key = (report.subject_id, report.week.start);
        if state.reports.contains_key(&key) {
            return Err(StoreError::Conflict);
        }
        state.reports.insert(key, report);
        Ok(())
    }

    async fn replace(&self, report: WeeklyReport) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let key = (report.subject_id, report.week.start);
        state.reports.insert(key, report);
        Ok(())
    }

    async fn update_metrics(&self, id: Uuid, metrics: ReportMetrics) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let report = state
            .reports
            .values_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::Backend(format!("no report with id {id}")))?;
        report.metrics = serde_json::to_value(&metrics)
            .map_err(|e| StoreError::Backend(format!("failed to serialize metrics: {e}")))?;
        Ok(())
    }
}
