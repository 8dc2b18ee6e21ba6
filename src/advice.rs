//! Medical-advice tier selection from recent improvement history.

use serde::{Deserialize, Serialize};

/// How many recent weekly improvement values feed the advisory.
const ADVICE_HISTORY_WEEKS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalAdvice {
    pub advice_text: String,
    pub needs_doctor_visit: bool,
    pub urgency_level: UrgencyLevel,
    pub reasoning: String,
}

/// Deterministic tier table over the average of the most recent (at most
/// four) non-null improvement percentages. No values at all averages as 0.
///
/// Boundary semantics are part of the contract: +20 is still "mild",
/// 0 is already "plateau", -10 is already "worsening".
pub fn advise(recent_improvements: &[Option<f64>]) -> MedicalAdvice {
    let tail_start = recent_improvements
        .len()
        .saturating_sub(ADVICE_HISTORY_WEEKS);
    let values: Vec<f64> = recent_improvements[tail_start..]
        .iter()
        .copied()
        .flatten()
        .collect();

    let avg = if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    };

    if avg > 20.0 {
        MedicalAdvice {
            advice_text: "Great progress! Your condition is improving significantly. Continue \
                          your current treatment plan and maintain good skin care habits."
                .to_string(),
            needs_doctor_visit: false,
            urgency_level: UrgencyLevel::Low,
            reasoning: format!("Average improvement of {avg:.1}% over recent weeks"),
        }
    } else if avg > 0.0 {
        MedicalAdvice {
            advice_text: "Your condition is showing mild improvement. Continue with your current \
                          routine and consider a follow-up appointment if progress slows."
                .to_string(),
            needs_doctor_visit: false,
            urgency_level: UrgencyLevel::Low,
            reasoning: format!("Steady improvement of {avg:.1}%"),
        }
    } else if avg > -10.0 {
        MedicalAdvice {
            advice_text: "Your condition appears stable. If you're not seeing the improvement \
                          you'd like, consult with a dermatologist to adjust your treatment plan."
                .to_string(),
            needs_doctor_visit: true,
            urgency_level: UrgencyLevel::Medium,
            reasoning: "Little to no improvement observed".to_string(),
        }
    } else {
        MedicalAdvice {
            advice_text: "Your condition appears to be worsening. We strongly recommend \
                          scheduling an appointment with a dermatologist as soon as possible."
                .to_string(),
            needs_doctor_visit: true,
            urgency_level: UrgencyLevel::High,
            reasoning: format!("Condition worsening by {:.1}%", avg.abs()),
        }
    }
}
