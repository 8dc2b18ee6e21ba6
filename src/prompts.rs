//! Conversational prompt selection.
//!
//! The subject's rolling affect state picks the system prompt a voice or
//! chat agent should open with. Profiles are a static table; only the
//! band selection is data-driven.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::affect::AffectState;
use crate::errors::EngineError;
use crate::store::AffectStore;

/// Days of affect history feeding prompt selection.
const AFFECT_WINDOW_DAYS: i64 = 7;

/// Assumed score for subjects with no recent affect data.
const NO_DATA_SCORE: f64 = 65.0;

#[derive(Debug, Serialize)]
pub struct PromptProfile {
    pub name: &'static str,
    pub system_prompt: &'static str,
    pub suggested_duration: &'static str,
    pub follow_up_recommended: bool,
}

static SEVERE_LOW: PromptProfile = PromptProfile {
    name: "Crisis Support",
    system_prompt: "You are a compassionate mental health support assistant speaking with \
someone in significant distress about their skin condition. Provide immediate validation, \
speak slowly in short sentences, focus on grounding techniques, and acknowledge their pain \
without toxic positivity. If they express self-harm or severe crisis, gently point them to \
the 988 crisis line. You support, you do not replace, professional care.",
    suggested_duration: "10-15 minutes",
    follow_up_recommended: true,
};

static LOW: PromptProfile = PromptProfile {
    name: "Emotional Support",
    system_prompt: "You are a warm, empathetic support assistant helping someone struggling \
with the emotional weight of a visible skin condition. Listen, validate, reflect their \
feelings back, and gently explore coping strategies and self-compassion practices. \
Celebrate small wins; never minimize.",
    suggested_duration: "15-20 minutes",
    follow_up_recommended: true,
};

static MODERATE_LOW: PromptProfile = PromptProfile {
    name: "Gentle Encouragement",
    system_prompt: "You are a supportive assistant helping someone navigate day-to-day life \
with a skin condition. Keep a warm, slightly upbeat tone. Ask about the week, identify \
triggers and stressors, reinforce treatment adherence, and share practical stress-reduction \
and sleep-hygiene techniques.",
    suggested_duration: "10-15 minutes",
    follow_up_recommended: false,
};

static NEUTRAL: PromptProfile = PromptProfile {
    name: "Balanced Check-in",
    system_prompt: "You are a friendly assistant doing a routine weekly check-in about skin \
health and overall wellbeing. Keep the conversation natural: ask how the skin has been, \
whether anything triggered flare-ups, how they are feeling emotionally, and answer \
treatment questions. Watch for dips in mood or adherence.",
    suggested_duration: "8-12 minutes",
    follow_up_recommended: false,
};

static MODERATE_HIGH: PromptProfile = PromptProfile {
    name: "Positive Reinforcement",
    system_prompt: "You are an encouraging assistant celebrating visible progress with a skin \
condition. Be genuinely celebratory and forward-looking: acknowledge what is working, plan \
for maintenance, and prepare them for possible setbacks with realistic optimism.",
    suggested_duration: "10-15 minutes",
    follow_up_recommended: false,
};

static HIGH: PromptProfile = PromptProfile {
    name: "Celebration & Maintenance",
    system_prompt: "You are an enthusiastic assistant marking major progress on a skin health \
journey. Celebrate the achievement, reflect on lessons learned, build a sustainable \
maintenance routine, and encourage long-term confidence and independence.",
    suggested_duration: "12-18 minutes",
    follow_up_recommended: false,
};

pub fn profile_for(state: AffectState) -> &'static PromptProfile {
    match state {
        AffectState::SevereLow => &SEVERE_LOW,
        AffectState::Low => &LOW,
        AffectState::ModerateLow => &MODERATE_LOW,
        AffectState::Neutral => &NEUTRAL,
        AffectState::ModerateHigh => &MODERATE_HIGH,
        AffectState::High => &HIGH,
    }
}

#[derive(Debug, Serialize)]
pub struct PromptSelection {
    pub affect_state: AffectState,
    pub mean_score: f64,
    pub profile: &'static PromptProfile,
}

/// Pick the prompt profile for a subject from their recent affect history.
/// Subjects with no samples in the window get the neutral profile.
pub async fn select_prompt(
    store: &dyn AffectStore,
    subject_id: Uuid,
    now: DateTime<Utc>,
) -> Result<PromptSelection, EngineError> {
    let from = now - Duration::days(AFFECT_WINDOW_DAYS);
    let samples = store
        .get_samples(subject_id, from, now)
        .await
        .map_err(|e| EngineError::Store(e.to_string()))?;

    let mean_score = if samples.is_empty() {
        NO_DATA_SCORE
    } else {
        samples.iter().map(|s| s.overall_score).sum::<f64>() / samples.len() as f64
    };

    let affect_state = AffectState::from_score(mean_score);
    debug!(%subject_id, mean_score, ?affect_state, "selected conversational prompt");

    Ok(PromptSelection {
        affect_state,
        mean_score,
        profile: profile_for(affect_state),
    })
}
