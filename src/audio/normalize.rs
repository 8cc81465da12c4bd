//! Waveform normalization: resample, trim silence, fix the clip length.

use tracing::debug;

use super::resampler::AudioResampler;
use crate::config::{clip_samples, AMIN, HOP_LENGTH, N_FFT, SAMPLE_RATE};
use crate::error::{Result, SentimentError};

/// Normalizes arbitrary mono audio into a fixed-length 16kHz clip
#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Silence threshold in dB below the loudest frame
    pub top_db: f32,
    /// Output length in samples
    pub target_samples: usize,
}

impl Normalizer {
    pub fn new(top_db: f32) -> Self {
        Self {
            top_db,
            target_samples: clip_samples(),
        }
    }

    /// Resample to 16kHz, trim leading/trailing silence, then truncate or
    /// zero-pad to exactly `target_samples`.
    pub fn normalize(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
        if samples.is_empty() {
            return Err(SentimentError::Load("Audio stream is empty".to_string()));
        }

        let resampled;
        let audio = if sample_rate == SAMPLE_RATE {
            samples
        } else {
            resampled = AudioResampler::new(sample_rate)?.resample_all(samples)?;
            resampled.as_slice()
        };

        let (start, end) = trim_bounds(audio, self.top_db);
        debug!(
            "Trimmed silence: kept samples {}..{} of {}",
            start,
            end,
            audio.len()
        );

        Ok(fit_length(&audio[start..end], self.target_samples))
    }
}

/// Truncate (keeping the head) or zero-pad (at the tail) to `target` samples
pub fn fit_length(audio: &[f32], target: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(target);
    out.extend_from_slice(&audio[..audio.len().min(target)]);
    out.resize(target, 0.0);
    out
}

/// Sample range `[start, end)` of the non-silent region.
///
/// Uses centred frames of `N_FFT` samples every `HOP_LENGTH` samples. A frame
/// is non-silent when its mean power is within `top_db` of the loudest frame.
/// Returns an empty range when every frame is silent.
pub fn trim_bounds(audio: &[f32], top_db: f32) -> (usize, usize) {
    let power = frame_power(audio, N_FFT, HOP_LENGTH);
    let peak = power.iter().copied().fold(0.0f32, f32::max);
    let ref_db = 10.0 * peak.max(AMIN).log10();

    let is_loud = |p: &f32| 10.0 * p.max(AMIN).log10() - ref_db > -top_db;

    let first = power.iter().position(is_loud);
    let last = power.iter().rposition(is_loud);

    match (first, last) {
        (Some(first), Some(last)) => {
            let start = (first * HOP_LENGTH).min(audio.len());
            let end = ((last + 1) * HOP_LENGTH).min(audio.len());
            (start, end.max(start))
        }
        _ => (0, 0),
    }
}

/// Mean-square energy of centred, zero-padded frames
fn frame_power(audio: &[f32], frame_length: usize, hop_length: usize) -> Vec<f32> {
    let n_frames = 1 + audio.len() / hop_length;
    let half = frame_length / 2;

    (0..n_frames)
        .map(|frame| {
            // Frame centre sits at frame * hop; padding outside the signal is zero
            let centre = frame * hop_length;
            let lo = centre.saturating_sub(half);
            let hi = (centre + half).min(audio.len());
            let energy: f32 = audio[lo.min(hi)..hi].iter().map(|s| s * s).sum();
            energy / frame_length as f32
        })
        .collect()
}
