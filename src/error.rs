//! Error taxonomy shared by the analysis pipeline, capture engine and server.

use thiserror::Error;

/// Errors that can occur while turning audio into a sentiment prediction
#[derive(Debug, Error)]
pub enum SentimentError {
    /// Source audio could not be read, decoded or fetched
    #[error("Failed to load audio: {0}")]
    Load(String),

    /// No model or label encoder was found and none was specified
    #[error("Model artifact not found: {0}")]
    ArtifactMissing(String),

    /// A model or encoder file exists but could not be loaded
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    /// Capture device could not be opened or failed while streaming
    #[error("Audio device error: {0}")]
    Device(String),

    /// Feature tensor does not match the classifier's input shape
    #[error("Feature shape mismatch: expected {expected}, got {actual}")]
    FeatureShape { expected: String, actual: String },

    /// Feature extraction or inference failed
    #[error("Analysis failed: {0}")]
    Analysis(String),
}

pub type Result<T> = std::result::Result<T, SentimentError>;

impl SentimentError {
    /// Whether the error was caused by the input audio rather than the service
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Load(_))
    }
}

impl From<hound::Error> for SentimentError {
    fn from(e: hound::Error) -> Self {
        SentimentError::Load(e.to_string())
    }
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for SentimentError {
    fn from(e: ort::Error) -> Self {
        SentimentError::Analysis(e.to_string())
    }
}
