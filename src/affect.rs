//! Affect scoring.
//!
//! Maps noisy per-dimension emotional signals onto one bounded overall
//! score with a fixed, auditable linear model. The weights are part of the
//! engine contract and must not drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::AffectSample;

/// Neutral fallback for an invalid or non-numeric signal.
pub const NEUTRAL_SIGNAL: f64 = 50.0;

/// Raw per-dimension signals, already clamped to [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffectSignals {
    pub stress: f64,
    pub anxiety: f64,
    pub sadness: f64,
    pub energy: f64,
    /// Optional self-reported mood signal; absent callers contribute 0.
    pub raw_mood: f64,
}

impl AffectSignals {
    pub fn new(stress: f64, anxiety: f64, sadness: f64, energy: f64) -> Self {
        Self {
            stress: safe_score(stress),
            anxiety: safe_score(anxiety),
            sadness: safe_score(sadness),
            energy: safe_score(energy),
            raw_mood: 0.0,
        }
    }

    pub fn with_raw_mood(mut self, raw_mood: f64) -> Self {
        self.raw_mood = safe_score(raw_mood);
        self
    }

    /// Build signals from an emotion-inference JSON payload.
    ///
    /// The upstream model is free-form: keys may be missing or non-numeric.
    /// Each dimension falls back to the neutral midpoint; the optional
    /// `mood` key contributes 0 when absent.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let dim = |key: &str| {
            value
                .get(key)
                .and_then(serde_json::Value::as_f64)
                .map(safe_score)
                .unwrap_or(NEUTRAL_SIGNAL)
        };
        let raw_mood = value
            .get("mood")
            .and_then(serde_json::Value::as_f64)
            .map(safe_score)
            .unwrap_or(0.0);

        Self {
            stress: dim("stress"),
            anxiety: dim("anxiety"),
            sadness: dim("sadness"),
            energy: dim("energy"),
            raw_mood,
        }
    }
}

/// Clamp a raw signal to [0, 100]; NaN and infinities collapse to neutral.
pub fn safe_score(value: f64) -> f64 {
    if !value.is_finite() {
        return NEUTRAL_SIGNAL;
    }
    value.clamp(0.0, 100.0)
}

/// The fixed linear model. Always returns a value in [0, 100].
pub fn overall_score(signals: &AffectSignals) -> f64 {
    let negative = 0.4 * signals.stress + 0.3 * signals.anxiety + 0.3 * signals.sadness;
    let overall = 100.0 - negative + 0.5 * signals.energy + 0.2 * signals.raw_mood;
    overall.clamp(0.0, 100.0)
}

/// Build a persistable sample; this is the only path that sets `overall_score`.
pub fn derive_sample(subject_id: Uuid, logged_at: DateTime<Utc>, signals: &AffectSignals) -> AffectSample {
    AffectSample {
        id: Uuid::new_v4(),
        subject_id,
        logged_at,
        stress: signals.stress,
        anxiety: signals.anxiety,
        sadness: signals.sadness,
        energy: signals.energy,
        overall_score: overall_score(signals),
    }
}

/// Discrete affect band, used to drive report tone and prompt selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffectState {
    SevereLow,
    Low,
    ModerateLow,
    Neutral,
    ModerateHigh,
    High,
}

impl AffectState {
    pub fn from_score(score: f64) -> Self {
        if score < 20.0 {
            AffectState::SevereLow
        } else if score < 40.0 {
            AffectState::Low
        } else if score < 60.0 {
            AffectState::ModerateLow
        } else if score < 70.0 {
            AffectState::Neutral
        } else if score < 85.0 {
            AffectState::ModerateHigh
        } else {
            AffectState::High
        }
    }
}
