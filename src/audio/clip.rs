use chrono::{DateTime, Local};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::SAMPLE_RATE;
use crate::error::{Result, SentimentError};
use crate::sentiment::Sentiment;

/// File name for a clip saved when the given sentiment was detected
pub fn clip_filename(sentiment: Sentiment, at: DateTime<Local>) -> String {
    format!(
        "sentiment_{}_{}.wav",
        sentiment,
        at.format("%Y%m%d_%H%M%S_%3f")
    )
}

/// Scale samples down so the peak amplitude is at most 1.0
pub fn peak_limited(samples: &[f32]) -> Vec<f32> {
    let peak = samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
    if peak > 1.0 {
        samples.iter().map(|s| s / peak).collect()
    } else {
        samples.to_vec()
    }
}

/// Write a mono 32-bit float WAV at the fixed sample rate
pub fn write_clip(path: &Path, samples: &[f32]) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let io_err = |e: hound::Error| SentimentError::Analysis(format!("Failed to write clip: {}", e));

    let mut writer = WavWriter::create(path, spec).map_err(io_err)?;
    for sample in peak_limited(samples) {
        writer.write_sample(sample).map_err(io_err)?;
    }
    writer.finalize().map_err(io_err)?;

    debug!("Clip saved to {:?} ({} samples)", path, samples.len());
    Ok(())
}

/// Save a clip into `dir` named after the sentiment and timestamp
pub fn save_sentiment_clip(
    dir: &Path,
    sentiment: Sentiment,
    at: DateTime<Local>,
    samples: &[f32],
) -> Result<PathBuf> {
    let path = dir.join(clip_filename(sentiment, at));
    write_clip(&path, samples)?;
    Ok(path)
}
