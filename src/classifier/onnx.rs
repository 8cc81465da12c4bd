//! ONNX Runtime backed emotion model.

#[cfg(feature = "onnx")]
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::{Value, ValueType},
};
#[cfg(feature = "onnx")]
use std::sync::Mutex;
use std::path::Path;

use super::EmotionModel;
use crate::error::{Result, SentimentError};

/// Emotion classifier exported to ONNX
#[cfg(feature = "onnx")]
pub struct OnnxEmotionModel {
    session: Mutex<Session>,
    input_shape: Vec<Option<usize>>,
}

#[cfg(feature = "onnx")]
impl OnnxEmotionModel {
    pub fn load(model_path: &Path, n_threads: usize) -> Result<Self> {
        if !model_path.exists() {
            return Err(SentimentError::ArtifactMissing(format!(
                "Model not found at {:?}",
                model_path
            )));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| SentimentError::ModelLoad(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| SentimentError::ModelLoad(e.to_string()))?
            .with_intra_threads(n_threads.max(1))
            .map_err(|e: ort::Error| SentimentError::ModelLoad(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e: ort::Error| SentimentError::ModelLoad(e.to_string()))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| SentimentError::ModelLoad("Model declares no inputs".to_string()))?;

        // Negative dimensions are dynamic (batch, usually)
        let input_shape = match &input.input_type {
            ValueType::Tensor { shape: dimensions, .. } => dimensions
                .iter()
                .map(|&d| usize::try_from(d).ok().filter(|&d| d > 0))
                .collect(),
            other => {
                return Err(SentimentError::ModelLoad(format!(
                    "Unsupported model input type: {:?}",
                    other
                )))
            }
        };

        tracing::debug!("Model input '{}' shape {:?}", input.name, input_shape);

        Ok(Self {
            session: Mutex::new(session),
            input_shape,
        })
    }
}

#[cfg(feature = "onnx")]
impl EmotionModel for OnnxEmotionModel {
    fn input_shape(&self) -> Vec<Option<usize>> {
        self.input_shape.clone()
    }

    fn predict(&self, input: &[f32], shape: &[usize]) -> Result<Vec<f32>> {
        let input_tensor = Value::from_array((shape.to_vec(), input.to_vec()))
            .map_err(|e: ort::Error| SentimentError::Analysis(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| SentimentError::Analysis("Model session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e: ort::Error| SentimentError::Analysis(e.to_string()))?;

        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| SentimentError::Analysis("No output from model".to_string()))?;

        let output_tensor = output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e: ort::Error| SentimentError::Analysis(e.to_string()))?;

        Ok(output_tensor.1.iter().copied().collect())
    }
}

// Stub implementation when feature is not enabled
#[cfg(not(feature = "onnx"))]
pub struct OnnxEmotionModel;

#[cfg(not(feature = "onnx"))]
impl OnnxEmotionModel {
    pub fn load(_model_path: &Path, _n_threads: usize) -> Result<Self> {
        Err(SentimentError::ModelLoad(
            "onnx feature not enabled".to_string(),
        ))
    }
}

#[cfg(not(feature = "onnx"))]
impl EmotionModel for OnnxEmotionModel {
    fn input_shape(&self) -> Vec<Option<usize>> {
        Vec::new()
    }

    fn predict(&self, _input: &[f32], _shape: &[usize]) -> Result<Vec<f32>> {
        Err(SentimentError::Analysis(
            "onnx feature not enabled".to_string(),
        ))
    }
}
