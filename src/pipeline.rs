//! Single-shot analysis: normalize, extract, classify, map sentiment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::audio::{load_wav, Normalizer};
use crate::classifier::ClassifierArtifact;
use crate::config::SAMPLE_RATE;
use crate::error::Result;
use crate::features::{FeatureExtractor, FeatureType};
use crate::sentiment::Sentiment;

/// Outcome of one pipeline invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: String,
    pub sentiment: Sentiment,
    pub confidence: f32,
    pub scores: BTreeMap<String, f32>,
}

/// Report printed by `analyze --json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub file: String,
    pub emotion: String,
    pub sentiment: Sentiment,
    pub confidence: f32,
    pub emotion_scores: BTreeMap<String, f32>,
    /// Seconds
    pub processing_time: f64,
}

impl FileAnalysis {
    pub fn new(file: &Path, result: PredictionResult, processing_time: f64) -> Self {
        Self {
            file: file.display().to_string(),
            emotion: result.label,
            sentiment: result.sentiment,
            confidence: result.confidence,
            emotion_scores: result.scores,
            processing_time,
        }
    }
}

/// Runs the four analysis stages against a shared classifier artifact
pub struct Analyzer {
    artifact: Arc<ClassifierArtifact>,
    extractor: FeatureExtractor,
    normalizer: Normalizer,
    feature_type: FeatureType,
}

impl Analyzer {
    pub fn new(artifact: Arc<ClassifierArtifact>, feature_type: FeatureType, top_db: f32) -> Self {
        Self {
            artifact,
            extractor: FeatureExtractor::new(),
            normalizer: Normalizer::new(top_db),
            feature_type,
        }
    }

    pub fn artifact(&self) -> &Arc<ClassifierArtifact> {
        &self.artifact
    }

    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    /// Decode and analyze a WAV file
    pub fn analyze_file(&self, path: &Path) -> Result<PredictionResult> {
        let audio = load_wav(path)?;
        debug!(
            "Loaded {:?}: {:.2}s at {} Hz",
            path,
            audio.duration_secs(),
            audio.sample_rate
        );
        self.analyze_samples(&audio.samples, audio.sample_rate)
    }

    /// Analyze mono samples at any sample rate
    pub fn analyze_samples(&self, samples: &[f32], sample_rate: u32) -> Result<PredictionResult> {
        let start = Instant::now();

        let normalized = self.normalizer.normalize(samples, sample_rate)?;
        let features = self.extractor.extract(&normalized, self.feature_type)?;
        let classification = self.artifact.classify(&features)?;
        let sentiment = Sentiment::from_label(&classification.label);

        debug!(
            "{} features {}x{} -> {} ({}) in {:?}",
            self.feature_type,
            features.rows(),
            features.frames(),
            classification.label,
            sentiment,
            start.elapsed()
        );

        Ok(PredictionResult {
            label: classification.label,
            sentiment,
            confidence: classification.confidence,
            scores: classification.scores,
        })
    }

    /// Analyze one 16 kHz window from the capture engine
    pub fn analyze_window(&self, window: &[f32]) -> Result<PredictionResult> {
        self.analyze_samples(window, SAMPLE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_analysis_json_fields() {
        let result = PredictionResult {
            label: "03_happy".to_string(),
            sentiment: Sentiment::Positive,
            confidence: 0.75,
            scores: BTreeMap::from([("03_happy".to_string(), 0.75), ("04_sad".to_string(), 0.25)]),
        };

        let report = FileAnalysis::new(Path::new("clip.wav"), result, 0.5);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["file"], "clip.wav");
        assert_eq!(json["emotion"], "03_happy");
        assert_eq!(json["sentiment"], "positive");
        assert_eq!(json["emotion_scores"]["04_sad"], 0.25);
        assert_eq!(json["processing_time"], 0.5);
    }
}
