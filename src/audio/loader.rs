//! WAV decoding into mono f32 samples.

use hound::{SampleFormat, WavReader};
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::error::{Result, SentimentError};

/// Decoded mono audio with its native sample rate
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate.max(1) as f32
    }
}

/// Load a WAV file, downmixing to mono
pub fn load_wav(path: &Path) -> Result<DecodedAudio> {
    let reader = WavReader::open(path)
        .map_err(|e| SentimentError::Load(format!("{}: {}", path.display(), e)))?;
    decode(reader)
}

/// Decode WAV data from any reader
pub fn decode<R: Read>(reader: WavReader<R>) -> Result<DecodedAudio> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    debug!(
        "Decoding WAV: {} Hz, {} channels, {} bits, {:?}",
        spec.sample_rate, spec.channels, spec.bits_per_sample, spec.sample_format
    );

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample)?;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    if interleaved.is_empty() {
        return Err(SentimentError::Load("Audio stream is empty".to_string()));
    }

    let samples = downmix(&interleaved, channels);

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Full-scale value for integer PCM of the given bit depth
fn int_scale(bits_per_sample: u16) -> Result<f32> {
    match bits_per_sample {
        1..=32 => Ok((1u64 << (bits_per_sample - 1)) as f32),
        other => Err(SentimentError::Load(format!(
            "Unsupported bit depth: {}",
            other
        ))),
    }
}

/// Average interleaved channels into a single channel
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use tempfile::tempdir;

    #[test]
    fn test_downmix_stereo() {
        let stereo = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(downmix(&stereo, 2), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let mono = [0.1, 0.2, 0.3];
        assert_eq!(downmix(&mono, 1), mono.to_vec());
    }

    #[test]
    fn test_load_int16_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for sample in [0i16, 16384, -16384, i16::MAX] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let audio = load_wav(&path).unwrap();
        assert_eq!(audio.sample_rate, 22050);
        assert_eq!(audio.samples.len(), 4);
        assert!((audio.samples[1] - 0.5).abs() < 1e-6);
        assert!((audio.samples[2] + 0.5).abs() < 1e-6);
        assert!(audio.samples[3] < 1.0);
    }

    #[test]
    fn test_load_float_stereo_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 16000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for sample in [0.2f32, 0.4, -0.2, -0.4] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let audio = load_wav(&path).unwrap();
        assert_eq!(audio.samples.len(), 2);
        assert!((audio.samples[0] - 0.3).abs() < 1e-6);
        assert!((audio.samples[1] + 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_empty_wav_is_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        WavWriter::create(&path, spec).unwrap().finalize().unwrap();

        assert!(matches!(load_wav(&path), Err(SentimentError::Load(_))));
    }

    #[test]
    fn test_corrupt_file_is_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.wav");
        std::fs::write(&path, b"definitely not a riff header").unwrap();

        assert!(matches!(load_wav(&path), Err(SentimentError::Load(_))));
    }
}
