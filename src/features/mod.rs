//! Feature extraction: MFCC, mel spectrogram, or both stacked.
//!
//! All features are computed per clip with no state carried between calls,
//! so one [`FeatureExtractor`] can be shared across threads.

pub mod mel;

use ndarray::{s, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

use crate::config::{HOP_LENGTH, N_FFT, N_MELS, N_MFCC, SAMPLE_RATE};
use crate::error::{Result, SentimentError};
use mel::{power_to_db, DbReference, MelSpectrogram};

/// Which features to feed the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FeatureType {
    /// Z-scored MFCCs (n_mfcc rows)
    Mfcc,
    /// MFCCs without per-coefficient scaling, as the HTTP models were trained on
    #[serde(rename = "mfcc-raw", alias = "mfcc_raw")]
    #[value(name = "mfcc-raw")]
    MfccRaw,
    /// Mel spectrogram in dB relative to the clip peak (128 rows)
    Melspec,
    /// MFCCs stacked over the first n_mfcc mel rows
    Combined,
}

impl Default for FeatureType {
    fn default() -> Self {
        Self::Mfcc
    }
}

impl std::fmt::Display for FeatureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Mfcc => "mfcc",
            Self::MfccRaw => "mfcc-raw",
            Self::Melspec => "melspec",
            Self::Combined => "combined",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for FeatureType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mfcc" => Ok(Self::Mfcc),
            "mfcc-raw" | "mfcc_raw" => Ok(Self::MfccRaw),
            "melspec" => Ok(Self::Melspec),
            "combined" => Ok(Self::Combined),
            _ => Err(format!("Unknown feature type: {}", s)),
        }
    }
}

/// Coefficient-by-frame feature grid
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
    data: Array2<f32>,
}

impl FeatureTensor {
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Coefficient (row) count
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Time frame (column) count
    pub fn frames(&self) -> usize {
        self.data.ncols()
    }

    pub fn view(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn into_inner(self) -> Array2<f32> {
        self.data
    }

    /// Row-major values (coefficient-major)
    pub fn to_row_major(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    /// Frame-major values, i.e. the transposed grid
    pub fn to_frame_major(&self) -> Vec<f32> {
        self.data.t().iter().copied().collect()
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

/// Computes feature tensors from normalized 16kHz clips
pub struct FeatureExtractor {
    mel: MelSpectrogram,
    /// n_mfcc x n_mels orthonormal DCT-II basis
    dct: Array2<f32>,
    n_mfcc: usize,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::with_params(N_MFCC, N_MELS)
    }

    pub fn with_params(n_mfcc: usize, n_mels: usize) -> Self {
        Self {
            mel: MelSpectrogram::new(SAMPLE_RATE, N_FFT, HOP_LENGTH, n_mels),
            dct: dct_basis(n_mfcc, n_mels),
            n_mfcc,
        }
    }

    pub fn n_mfcc(&self) -> usize {
        self.n_mfcc
    }

    /// Rows produced for the given feature type
    pub fn rows_for(&self, feature_type: FeatureType) -> usize {
        match feature_type {
            FeatureType::Mfcc | FeatureType::MfccRaw => self.n_mfcc,
            FeatureType::Melspec => self.mel.n_mels(),
            FeatureType::Combined => self.n_mfcc * 2,
        }
    }

    pub fn extract(&self, audio: &[f32], feature_type: FeatureType) -> Result<FeatureTensor> {
        let mel_power = self.mel.compute(audio)?;

        let data = match feature_type {
            FeatureType::Mfcc => self.mfcc(&mel_power),
            FeatureType::MfccRaw => self.raw_mfcc(&mel_power),
            FeatureType::Melspec => power_to_db(&mel_power, DbReference::Max),
            FeatureType::Combined => {
                if self.n_mfcc > mel_power.nrows() {
                    return Err(SentimentError::Analysis(format!(
                        "Cannot stack {} mel rows from a {}-band spectrogram",
                        self.n_mfcc,
                        mel_power.nrows()
                    )));
                }
                let mfcc = self.mfcc(&mel_power);
                let mel_db = power_to_db(&mel_power, DbReference::Max);
                ndarray::concatenate(
                    Axis(0),
                    &[mfcc.view(), mel_db.slice(s![..self.n_mfcc, ..])],
                )
                .map_err(|e| SentimentError::Analysis(format!("Failed to stack features: {}", e)))?
            }
        };

        debug!(
            "Extracted {} features: {} x {}",
            feature_type,
            data.nrows(),
            data.ncols()
        );

        Ok(FeatureTensor::new(data))
    }

    /// DCT of the log mel spectrogram in dB relative to unit power
    fn raw_mfcc(&self, mel_power: &Array2<f32>) -> Array2<f32> {
        let log_mel = power_to_db(mel_power, DbReference::Fixed(1.0));
        self.dct.dot(&log_mel)
    }

    /// MFCCs z-scored per coefficient
    fn mfcc(&self, mel_power: &Array2<f32>) -> Array2<f32> {
        let mut mfcc = self.raw_mfcc(mel_power);
        standardize_rows(&mut mfcc);
        mfcc
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Zero mean, unit variance per row. Constant rows become all zeros.
pub fn standardize_rows(data: &mut Array2<f32>) {
    for mut row in data.rows_mut() {
        let n = row.len().max(1) as f64;
        let mean = row.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = row.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt();

        if std > f64::EPSILON * mean.abs().max(1.0) {
            row.mapv_inplace(|v| ((v as f64 - mean) / std) as f32);
        } else {
            row.fill(0.0);
        }
    }
}

/// Orthonormal DCT-II basis, keeping the first `n_out` coefficients
fn dct_basis(n_out: usize, n_in: usize) -> Array2<f32> {
    let n = n_in as f64;
    Array2::from_shape_fn((n_out, n_in), |(k, i)| {
        let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
        (scale * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos()) as f32
    })
}
