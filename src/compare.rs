//! Comparison oracle: vision-model comparison of two observations.
//!
//! Optional collaborator. Every failure here is reported as an
//! [`OracleError`] and the trend comparator degrades to its local
//! estimate; nothing in this module is load-bearing for report generation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{EngineError, OracleError};
use crate::narrative::{extract_json_from_response, validate_base_url};
use crate::types::ObservationRef;

/// Outcome of a two-image comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    #[serde(default)]
    pub improvement_detected: bool,
    /// Negative when the condition worsened.
    pub improvement_percentage: f64,
    #[serde(default)]
    pub severity_change: Option<String>,
    #[serde(default)]
    pub affected_area_change: Option<String>,
    #[serde(default)]
    pub detailed_analysis: Option<String>,
}

#[async_trait]
pub trait ComparisonOracle: Send + Sync {
    /// Compare the earlier observation against the later one.
    async fn compare(
        &self,
        before: &ObservationRef,
        after: &ObservationRef,
    ) -> Result<ComparisonResult, OracleError>;
}

const COMPARE_PROMPT: &str = "You are a dermatology assistant comparing two skin condition \
images taken over time. IMAGE 1 is the earlier photo, IMAGE 2 the recent one.\n\
Respond ONLY with JSON:\n\
{\"improvement_detected\": true, \"improvement_percentage\": 0.0, \
\"severity_change\": \"moderate -> mild\", \"affected_area_change\": \"15% -> 9.5%\", \
\"detailed_analysis\": \"...\"}\n\
improvement_percentage is 0-100, negative if worsened.";

/// Comparison client backed by an OpenAI-compatible vision endpoint.
#[derive(Debug)]
pub struct VisionComparisonClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl VisionComparisonClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, EngineError> {
        let base_url = validate_base_url(base_url)?;

        let client = reqwest::Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Validation(format!("failed to create HTTP client: {e}")))?;

        info!("comparison client created for {}", base_url);

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl ComparisonOracle for VisionComparisonClient {
    async fn compare(
        &self,
        before: &ObservationRef,
        after: &ObservationRef,
    ) -> Result<ComparisonResult, OracleError> {
        let before_ref = before.image_ref.as_deref().ok_or_else(|| {
            OracleError::Unavailable("earlier observation has no image reference".to_string())
        })?;
        let after_ref = after.image_ref.as_deref().ok_or_else(|| {
            OracleError::Unavailable("later observation has no image reference".to_string())
        })?;

        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(before = %before.id, after = %after.id, "requesting image comparison");

        let request = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": COMPARE_PROMPT},
                    {"type": "image_url", "image_url": {"url": before_ref, "detail": "high"}},
                    {"type": "image_url", "image_url": {"url": after_ref, "detail": "high"}},
                ],
            }],
            "max_tokens": 800,
            "temperature": 0.3,
        });

        let mut builder = self.client.post(&url).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await.map_err(|e| {
            OracleError::Unavailable(format!("comparison oracle unreachable: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(OracleError::Unavailable(format!(
                "comparison oracle returned {status}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(format!("unparseable completion payload: {e}")))?;

        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| OracleError::Malformed("no response choices returned".to_string()))?;

        let json = extract_json_from_response(content);
        serde_json::from_str::<ComparisonResult>(&json)
            .map_err(|e| OracleError::Malformed(format!("comparison JSON does not conform: {e}")))
    }
}
