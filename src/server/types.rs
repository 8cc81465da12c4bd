//! Request and response bodies for the analysis API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::pipeline::PredictionResult;

/// `POST /analyze` body
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub audio_url: Option<String>,
}

impl AnalyzeRequest {
    /// Non-empty audio URL, if present
    pub fn audio_url(&self) -> Option<&str> {
        self.audio_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// `POST /analyze` success body
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub emotion: String,
    /// Probability of the top class, 0..1
    pub confidence: f32,
    pub emotion_scores: BTreeMap<String, f32>,
}

impl From<PredictionResult> for AnalyzeResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            emotion: result.label,
            confidence: result.confidence,
            emotion_scores: result.scores,
        }
    }
}

/// Error body for every non-2xx response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// `GET /health` body
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub model_loaded: bool,
    pub timestamp: String,
}
