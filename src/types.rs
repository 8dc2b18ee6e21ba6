//! Domain records shared across the engine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::week::WeekWindow;

/// One classified skin-image record. Produced by the external classifier,
/// consumed read-only by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub captured_at: DateTime<Utc>,
    /// Condition label assigned by the classifier (e.g. "eczema").
    pub label: String,
    /// Classifier confidence in [0, 1].
    pub confidence: f64,
    /// Storage reference to the underlying image, when available.
    /// Used by the comparison oracle; never dereferenced by the engine itself.
    pub image_ref: Option<String>,
}

/// Lightweight handle to an observation kept inside computed metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRef {
    pub id: Uuid,
    pub image_ref: Option<String>,
}

impl From<&Observation> for ObservationRef {
    fn from(obs: &Observation) -> Self {
        Self {
            id: obs.id,
            image_ref: obs.image_ref.clone(),
        }
    }
}

/// One derived emotional-state record plus its input dimensions.
/// `overall_score` is always produced by the affect scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffectSample {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub logged_at: DateTime<Utc>,
    pub stress: f64,
    pub anxiety: f64,
    pub sadness: f64,
    pub energy: f64,
    pub overall_score: f64,
}

/// Severity framing for a single report insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightSeverity {
    Positive,
    Neutral,
    Negative,
}

/// Single key insight inside a narrative report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub title: String,
    pub description: String,
    pub severity: InsightSeverity,
}

/// Priority of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Action recommendation inside a narrative report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// "treatment", "lifestyle" or "monitoring".
    pub category: String,
    pub action: String,
    pub priority: Priority,
    pub reasoning: String,
}

/// Narrative payload returned by the narrative oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeReport {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub insights: Vec<Insight>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub next_steps: String,
}

/// Persisted weekly report. At most one non-deleted row exists per
/// (subject_id, week.start); force-regeneration replaces the prior row.
///
/// `metrics` is stored as raw JSON, mirroring how older rows may carry a
/// previous schema shape; it is normalized on read (see
/// [`crate::metrics::ReportMetrics::upgrade`]) and never mutated otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub week: WeekWindow,
    pub narrative: NarrativeReport,
    pub metrics: serde_json::Value,
    pub rendered_html: String,
    pub created_at: DateTime<Utc>,
}

impl WeeklyReport {
    pub fn week_start(&self) -> NaiveDate {
        self.week.start
    }
}
