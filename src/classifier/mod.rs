//! Classifier adapter around a trained emotion model and its label encoder.
//!
//! The model is an opaque tensor-in / probability-vector-out function behind
//! the [`EmotionModel`] trait. [`ClassifierArtifact`] pairs it with the
//! [`LabelEncoder`], shapes feature tensors for it, and decodes the arg-max.

pub mod onnx;
pub mod repository;

pub use onnx::OnnxEmotionModel;
pub use repository::{resolve_artifacts, ArtifactPaths, ArtifactRepository, ModelDirectory};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, SentimentError};
use crate::features::FeatureTensor;

/// Trained emotion model: fixed-shape tensor in, class probabilities out
pub trait EmotionModel: Send + Sync {
    /// Declared input shape; `None` marks a dynamic dimension
    fn input_shape(&self) -> Vec<Option<usize>>;

    /// Run a forward pass over row-major `input` of the given `shape`
    fn predict(&self, input: &[f32], shape: &[usize]) -> Result<Vec<f32>>;
}

/// Bidirectional mapping between class index and class name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

/// Accepted on-disk encoder layouts
#[derive(Deserialize)]
#[serde(untagged)]
enum EncoderFile {
    Classes(Vec<String>),
    Object { classes: Vec<String> },
}

impl LabelEncoder {
    pub fn new(classes: Vec<String>) -> Self {
        Self { classes }
    }

    /// Load from a JSON list of class names or `{"classes": [...]}`
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SentimentError::ArtifactMissing(format!(
                "Label encoder not found at {:?}",
                path
            )));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| SentimentError::ModelLoad(format!("{:?}: {}", path, e)))?;
        let parsed: EncoderFile = serde_json::from_str(&content)
            .map_err(|e| SentimentError::ModelLoad(format!("Invalid label encoder {:?}: {}", path, e)))?;

        let classes = match parsed {
            EncoderFile::Classes(classes) | EncoderFile::Object { classes } => classes,
        };
        if classes.is_empty() {
            return Err(SentimentError::ModelLoad(format!(
                "Label encoder {:?} has no classes",
                path
            )));
        }

        Ok(Self { classes })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| SentimentError::Analysis(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| SentimentError::Analysis(format!("Failed to write {:?}: {}", path, e)))
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class index for a label
    pub fn transform(&self, label: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == label)
    }

    /// Class label for an index
    pub fn inverse_transform(&self, index: usize) -> Result<&str> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| {
                SentimentError::Analysis(format!(
                    "Class index {} out of range for {} classes",
                    index,
                    self.classes.len()
                ))
            })
    }
}

/// How a feature grid is laid out for the model input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLayout {
    /// `[1, rows, frames, 1]` for convolutional models
    Grid,
    /// `[1, frames, rows]` for sequence models
    Sequence,
}

impl InputLayout {
    /// Layout implied by the model's declared input rank
    pub fn for_rank(rank: usize) -> Option<Self> {
        match rank {
            4 => Some(Self::Grid),
            3 => Some(Self::Sequence),
            _ => None,
        }
    }

    pub fn shape(&self, tensor: &FeatureTensor) -> Vec<usize> {
        match self {
            Self::Grid => vec![1, tensor.rows(), tensor.frames(), 1],
            Self::Sequence => vec![1, tensor.frames(), tensor.rows()],
        }
    }

    pub fn data(&self, tensor: &FeatureTensor) -> Vec<f32> {
        match self {
            Self::Grid => tensor.to_row_major(),
            Self::Sequence => tensor.to_frame_major(),
        }
    }
}

/// Top label plus the full class distribution
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    pub class_index: usize,
    pub confidence: f32,
    pub scores: BTreeMap<String, f32>,
}

/// Loaded model and label encoder, shared read-only by all analysis calls
pub struct ClassifierArtifact {
    model: Box<dyn EmotionModel>,
    encoder: LabelEncoder,
}

impl ClassifierArtifact {
    pub fn new(model: Box<dyn EmotionModel>, encoder: LabelEncoder) -> Self {
        Self { model, encoder }
    }

    /// Load an ONNX model and JSON label encoder from disk
    pub fn load(paths: &ArtifactPaths, n_threads: usize) -> Result<Self> {
        let encoder = LabelEncoder::load(&paths.encoder)?;
        let model = OnnxEmotionModel::load(&paths.model, n_threads)?;

        info!("Model loaded from {:?}", paths.model);
        info!("Label encoder loaded from {:?}", paths.encoder);
        info!("Available classes: {:?}", encoder.classes());

        Ok(Self::new(Box::new(model), encoder))
    }

    pub fn encoder(&self) -> &LabelEncoder {
        &self.encoder
    }

    /// Input layout for this model, from its declared rank
    pub fn layout(&self) -> Result<InputLayout> {
        let declared = self.model.input_shape();
        InputLayout::for_rank(declared.len()).ok_or_else(|| SentimentError::FeatureShape {
            expected: format_declared(&declared),
            actual: "rank 3 or rank 4 input".to_string(),
        })
    }

    /// Classify one feature tensor
    pub fn classify(&self, tensor: &FeatureTensor) -> Result<Classification> {
        let layout = self.layout()?;
        let shape = layout.shape(tensor);
        self.check_shape(&shape)?;

        let probabilities = self.model.predict(&layout.data(tensor), &shape)?;

        if probabilities.len() != self.encoder.len() {
            return Err(SentimentError::Analysis(format!(
                "Model produced {} scores for {} classes",
                probabilities.len(),
                self.encoder.len()
            )));
        }

        let (class_index, confidence) = argmax(&probabilities).ok_or_else(|| {
            SentimentError::Analysis("Model produced no finite scores".to_string())
        })?;
        let label = self.encoder.inverse_transform(class_index)?.to_string();

        let scores = self
            .encoder
            .classes()
            .iter()
            .cloned()
            .zip(probabilities.iter().copied())
            .collect();

        debug!("Predicted {} ({:.3})", label, confidence);

        Ok(Classification {
            label,
            class_index,
            confidence,
            scores,
        })
    }

    fn check_shape(&self, actual: &[usize]) -> Result<()> {
        let declared = self.model.input_shape();
        let matches = declared.len() == actual.len()
            && declared
                .iter()
                .zip(actual)
                .all(|(expected, &got)| expected.map_or(true, |e| e == got));

        if matches {
            Ok(())
        } else {
            Err(SentimentError::FeatureShape {
                expected: format_declared(&declared),
                actual: format!("{:?}", actual),
            })
        }
    }
}

/// Index and value of the largest finite score
fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
}

fn format_declared(shape: &[Option<usize>]) -> String {
    let dims: Vec<String> = shape
        .iter()
        .map(|d| d.map_or_else(|| "?".to_string(), |d| d.to_string()))
        .collect();
    format!("[{}]", dims.join(", "))
}
