use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::features::FeatureType;

/// Sample rate every waveform is normalized to
pub const SAMPLE_RATE: u32 = 16000;

/// Fixed clip duration fed to the classifier
pub const CLIP_DURATION_SECS: f32 = 3.0;

/// Number of MFCC coefficients
pub const N_MFCC: usize = 40;

/// Number of mel bands in the mel spectrogram
pub const N_MELS: usize = 128;

/// STFT window size
pub const N_FFT: usize = 2048;

/// STFT hop length
pub const HOP_LENGTH: usize = 512;

/// Dynamic range kept by power_to_db (dB below the reference peak)
pub const TOP_DB_FLOOR: f32 = 80.0;

/// Smallest power value before taking a logarithm
pub const AMIN: f32 = 1e-10;

/// Number of samples in one normalized clip
pub fn clip_samples() -> usize {
    (SAMPLE_RATE as f32 * CLIP_DURATION_SECS) as usize
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: u32,

    // Artifacts
    pub models_dir: PathBuf,
    pub model_extension: String,
    pub encoder_filename: String,
    pub feature_type: FeatureType,
    pub inference_threads: usize,

    // Silence trimming per input path
    pub file_top_db: f32,
    pub server_top_db: f32,
    pub stream_top_db: f32,

    // Real-time analysis
    pub chunk_size: usize,
    pub poll_interval_ms: u64,
    pub clips_dir: PathBuf,
    pub clip_save_interval_secs: u64,

    // HTTP server
    pub server_addr: String,
    /// Features for `serve`; its models take unscaled MFCCs
    pub server_feature_type: FeatureType,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: 1,
            models_dir: PathBuf::from("models"),
            model_extension: "onnx".to_string(),
            encoder_filename: "label_encoder.json".to_string(),
            feature_type: FeatureType::Mfcc,
            inference_threads: 1,
            file_top_db: 20.0,
            server_top_db: 25.0,
            stream_top_db: 20.0,
            chunk_size: 1024,
            poll_interval_ms: 100,
            clips_dir: PathBuf::from("voice_clips"),
            clip_save_interval_secs: 10,
            server_addr: "0.0.0.0:5000".to_string(),
            server_feature_type: FeatureType::MfccRaw,
        }
    }
}

impl Config {
    /// Load config from file, or create default
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .context("Failed to read config file")?;
            serde_json::from_str(&content)
                .context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize config")?;
        std::fs::write(path, content)
            .context("Failed to write config file")
    }

    /// Get the default config directory
    pub fn default_config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .context("Failed to get home directory")?;
        Ok(home.join(".voice-sentiment"))
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.json"))
    }

    /// Label encoder co-located with the models
    pub fn default_encoder_path(&self) -> PathBuf {
        self.models_dir.join(&self.encoder_filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.file_top_db, 20.0);
        assert_eq!(config.server_top_db, 25.0);
        assert_eq!(config.feature_type, FeatureType::Mfcc);
        assert_eq!(config.server_feature_type, FeatureType::MfccRaw);
        assert_eq!(config.clips_dir, PathBuf::from("voice_clips"));
    }

    #[test]
    fn test_clip_samples() {
        assert_eq!(clip_samples(), 48000);
    }

    #[test]
    fn test_default_encoder_path() {
        let config = Config::default();
        assert_eq!(
            config.default_encoder_path(),
            PathBuf::from("models").join("label_encoder.json")
        );
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.poll_interval_ms, 100);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.feature_type = FeatureType::Combined;
        config.server_top_db = 30.0;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.feature_type, FeatureType::Combined);
        assert_eq!(loaded.server_top_db, 30.0);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"feature_type": "melspec"}"#).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.feature_type, FeatureType::Melspec);
        assert_eq!(loaded.file_top_db, 20.0);
    }
}
