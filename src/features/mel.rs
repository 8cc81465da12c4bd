//! Mel spectrogram generation.
//!
//! Centred STFT frames with a periodic Hann window, power spectrum, then a
//! Slaney-style mel filterbank (Slaney mel scale, area-normalized filters).

use ndarray::Array2;
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::f64::consts::PI;
use std::sync::Arc;

use crate::config::{AMIN, TOP_DB_FLOOR};
use crate::error::{Result, SentimentError};

/// Mel spectrogram generator with pre-computed filterbank and FFT plan
pub struct MelSpectrogram {
    n_fft: usize,
    hop_length: usize,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    /// n_mels x (n_fft / 2 + 1)
    filterbank: Array2<f32>,
}

impl MelSpectrogram {
    pub fn new(sample_rate: u32, n_fft: usize, hop_length: usize, n_mels: usize) -> Self {
        let window = periodic_hann(n_fft);
        let filterbank = mel_filterbank(sample_rate as f64, n_fft, n_mels);

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n_fft);

        Self {
            n_fft,
            hop_length,
            fft,
            window,
            filterbank,
        }
    }

    pub fn n_mels(&self) -> usize {
        self.filterbank.nrows()
    }

    /// Number of frames produced for `n_samples` of input
    pub fn n_frames(&self, n_samples: usize) -> usize {
        1 + n_samples / self.hop_length
    }

    /// Power spectrogram, shape (n_fft / 2 + 1) x frames
    pub fn stft_power(&self, audio: &[f32]) -> Result<Array2<f32>> {
        if audio.is_empty() {
            return Err(SentimentError::Analysis("Empty audio".to_string()));
        }

        let pad = self.n_fft / 2;
        let n_frames = self.n_frames(audio.len());
        let n_bins = self.n_fft / 2 + 1;

        let mut padded = vec![0.0f32; audio.len() + 2 * pad];
        padded[pad..pad + audio.len()].copy_from_slice(audio);

        let mut fft_input = vec![0.0f32; self.n_fft];
        let mut fft_output = vec![Complex::new(0.0f32, 0.0); n_bins];
        let mut power = Array2::<f32>::zeros((n_bins, n_frames));

        for frame_idx in 0..n_frames {
            let start = frame_idx * self.hop_length;
            let frame = &padded[start..start + self.n_fft];

            for ((dst, &sample), &w) in fft_input.iter_mut().zip(frame).zip(&self.window) {
                *dst = sample * w;
            }

            self.fft
                .process(&mut fft_input, &mut fft_output)
                .map_err(|e| SentimentError::Analysis(format!("FFT failed: {}", e)))?;

            for (bin, c) in fft_output.iter().enumerate() {
                power[[bin, frame_idx]] = c.re * c.re + c.im * c.im;
            }
        }

        Ok(power)
    }

    /// Mel power spectrogram, shape n_mels x frames
    pub fn compute(&self, audio: &[f32]) -> Result<Array2<f32>> {
        let power = self.stft_power(audio)?;
        Ok(self.filterbank.dot(&power))
    }
}

/// Reference level for decibel conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DbReference {
    /// Fixed reference power
    Fixed(f32),
    /// Maximum power of the spectrogram being converted
    Max,
}

/// Convert power to decibels relative to `reference`, keeping at most
/// `TOP_DB_FLOOR` dB of dynamic range below the peak.
pub fn power_to_db(spec: &Array2<f32>, reference: DbReference) -> Array2<f32> {
    let ref_value = match reference {
        DbReference::Fixed(value) => value.abs(),
        DbReference::Max => spec.iter().copied().fold(0.0f32, f32::max),
    };
    let ref_db = 10.0 * ref_value.max(AMIN).log10();

    let db = spec.mapv(|p| 10.0 * p.max(AMIN).log10() - ref_db);
    let peak = db.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    db.mapv(|v| v.max(peak - TOP_DB_FLOOR))
}

/// Periodic Hann window of length n
fn periodic_hann(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos()) as f32)
        .collect()
}

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Convert frequency to the Slaney mel scale (linear below 1 kHz, log above)
fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

/// Convert Slaney mel scale to frequency
fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        mel * F_SP
    }
}

/// Create an area-normalized triangular mel filterbank spanning 0 Hz to Nyquist
fn mel_filterbank(sample_rate: f64, n_fft: usize, n_mels: usize) -> Array2<f32> {
    let n_bins = n_fft / 2 + 1;
    let nyquist = sample_rate / 2.0;

    let fft_freqs: Vec<f64> = (0..n_bins)
        .map(|i| i as f64 * nyquist / (n_bins - 1) as f64)
        .collect();

    // n_mels + 2 band edges equally spaced on the mel scale
    let mel_max = hz_to_mel(nyquist);
    let mel_edges: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
        .collect();

    let mut filterbank = Array2::<f32>::zeros((n_mels, n_bins));

    for m in 0..n_mels {
        let (left, center, right) = (mel_edges[m], mel_edges[m + 1], mel_edges[m + 2]);
        let norm = 2.0 / (right - left);

        for (bin, &freq) in fft_freqs.iter().enumerate() {
            let rising = (freq - left) / (center - left);
            let falling = (right - freq) / (right - center);
            let weight = rising.min(falling).max(0.0);
            filterbank[[m, bin]] = (weight * norm) as f32;
        }
    }

    filterbank
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI as PI32;

    #[test]
    fn test_hz_to_mel_linear_region() {
        assert!((hz_to_mel(0.0) - 0.0).abs() < 1e-9);
        assert!((hz_to_mel(200.0) - 3.0).abs() < 1e-9);
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_mel_to_hz_roundtrip() {
        for hz in [100.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0] {
            let hz_back = mel_to_hz(hz_to_mel(hz));
            assert!((hz - hz_back).abs() < 1e-6, "Roundtrip failed for {} Hz", hz);
        }
    }

    #[test]
    fn test_filterbank_shape_and_weights() {
        let filterbank = mel_filterbank(16000.0, 2048, 128);
        assert_eq!(filterbank.dim(), (128, 1025));

        assert!(filterbank.iter().all(|&w| w >= 0.0));
        for row in filterbank.rows() {
            let sum: f32 = row.sum();
            assert!(sum > 0.0, "Filter should have non-zero weights");
        }
    }

    #[test]
    fn test_periodic_hann() {
        let window = periodic_hann(4);
        assert!((window[0] - 0.0).abs() < 1e-7);
        assert!((window[1] - 0.5).abs() < 1e-7);
        assert!((window[2] - 1.0).abs() < 1e-7);
        assert!((window[3] - 0.5).abs() < 1e-7);
    }

    #[test]
    fn test_mel_spectrogram_dimensions() {
        let mel = MelSpectrogram::new(16000, 2048, 512, 128);
        let spec = mel.compute(&vec![0.0; 48000]).unwrap();
        assert_eq!(spec.dim(), (128, 94));
    }

    #[test]
    fn test_tone_energy_lands_in_matching_band() {
        let mel = MelSpectrogram::new(16000, 2048, 512, 128);
        let audio: Vec<f32> = (0..16000)
            .map(|i| (2.0 * PI32 * 440.0 * i as f32 / 16000.0).sin() * 0.5)
            .collect();
        let spec = mel.compute(&audio).unwrap();

        // Middle frame peak should sit on the band whose centre is near 440 Hz
        let frame = spec.column(15);
        let (peak_band, _) = frame
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        let mel_max = hz_to_mel(8000.0);
        let centre_hz = mel_to_hz(mel_max * (peak_band + 1) as f64 / 129.0);
        assert!((centre_hz - 440.0).abs() < 60.0, "peak band centre {} Hz", centre_hz);
    }

    #[test]
    fn test_power_to_db_relative_to_max() {
        let spec = Array2::from_shape_vec((1, 3), vec![1.0, 0.1, 0.01]).unwrap();
        let db = power_to_db(&spec, DbReference::Max);
        assert!((db[[0, 0]] - 0.0).abs() < 1e-4);
        assert!((db[[0, 1]] + 10.0).abs() < 1e-4);
        assert!((db[[0, 2]] + 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_power_to_db_clamps_dynamic_range() {
        let spec = Array2::from_shape_vec((1, 2), vec![1.0, 1e-12]).unwrap();
        let db = power_to_db(&spec, DbReference::Fixed(1.0));
        assert!((db[[0, 1]] + TOP_DB_FLOOR).abs() < 1e-4);
    }

    #[test]
    fn test_power_to_db_silence_is_finite() {
        let spec = Array2::<f32>::zeros((4, 5));
        let db = power_to_db(&spec, DbReference::Max);
        assert!(db.iter().all(|v| v.is_finite() && *v == 0.0));
    }

    #[test]
    fn test_empty_audio_rejected() {
        let mel = MelSpectrogram::new(16000, 2048, 512, 128);
        assert!(mel.compute(&[]).is_err());
    }
}
