use rubato::{FftFixedIn, Resampler};
use tracing::debug;

use crate::config::SAMPLE_RATE;
use crate::error::{Result, SentimentError};

/// Input chunk size fed to the FFT resampler
const RESAMPLER_CHUNK: usize = 1024;

/// Audio resampler wrapper for converting a source sample rate to 16kHz
pub struct AudioResampler {
    resampler: FftFixedIn<f32>,
    input_buffer: Vec<Vec<f32>>,
    output_buffer: Vec<Vec<f32>>,
    input_frames: usize,
    source_rate: u32,
}

impl AudioResampler {
    /// Create a new resampler from the source sample rate to 16kHz
    pub fn new(source_rate: u32) -> Result<Self> {
        if source_rate == 0 {
            return Err(SentimentError::Load("Sample rate must be non-zero".into()));
        }

        let ratio = SAMPLE_RATE as f64 / source_rate as f64;
        debug!(
            "Creating resampler: {} Hz -> {} Hz (ratio: {:.4})",
            source_rate, SAMPLE_RATE, ratio
        );

        let channels = 1; // Mono

        let resampler = FftFixedIn::new(
            source_rate as usize,
            SAMPLE_RATE as usize,
            RESAMPLER_CHUNK,
            2, // sub_chunks for quality
            channels,
        )
        .map_err(|e| SentimentError::Analysis(format!("Failed to create resampler: {}", e)))?;

        let input_buffer = vec![vec![0.0f32; RESAMPLER_CHUNK]; channels];
        let output_buffer = resampler.output_buffer_allocate(true);

        Ok(Self {
            resampler,
            input_buffer,
            output_buffer,
            input_frames: RESAMPLER_CHUNK,
            source_rate,
        })
    }

    /// Get the number of input frames needed for the next process call
    pub fn input_frames_next(&self) -> usize {
        self.input_frames
    }

    /// Process one chunk of exactly `input_frames_next()` samples
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if input.len() != self.input_frames {
            return Err(SentimentError::Analysis(format!(
                "Input length {} doesn't match expected {}",
                input.len(),
                self.input_frames
            )));
        }

        self.input_buffer[0].copy_from_slice(input);

        let (_, output_frames) = self
            .resampler
            .process_into_buffer(&self.input_buffer, &mut self.output_buffer, None)
            .map_err(|e| SentimentError::Analysis(format!("Resampling failed: {}", e)))?;

        Ok(self.output_buffer[0][..output_frames].to_vec())
    }

    /// Resample a complete clip, compensating the resampler delay.
    ///
    /// Output length is `round(len * 16000 / source_rate)`.
    pub fn resample_all(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.reset();

        let expected =
            (input.len() as f64 * SAMPLE_RATE as f64 / self.source_rate as f64).round() as usize;
        let delay = self.resampler.output_delay();

        let mut output = Vec::with_capacity(expected + delay + self.input_frames);
        let mut chunk = vec![0.0f32; self.input_frames];
        let mut offset = 0;

        // Keep feeding (zero-padded) chunks until the delayed tail is flushed
        while output.len() < expected + delay {
            chunk.fill(0.0);
            if offset < input.len() {
                let end = (offset + self.input_frames).min(input.len());
                chunk[..end - offset].copy_from_slice(&input[offset..end]);
            }
            offset += self.input_frames;
            output.extend(self.process(&chunk)?);
        }

        Ok(output.into_iter().skip(delay).take(expected).collect())
    }

    /// Reset the resampler state
    pub fn reset(&mut self) {
        self.resampler.reset();
    }
}
