//! Speech emotion recognition with coarse sentiment bucketing.
//!
//! Audio is normalized to a fixed 3 s, 16 kHz mono clip, turned into an
//! MFCC or mel spectrogram grid, classified by a trained emotion model and
//! mapped to positive / negative / neutral / unknown. Files, a live
//! microphone and remote URLs (over HTTP) all share the same pipeline.

pub mod audio;
pub mod classifier;
pub mod config;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod sentiment;
pub mod server;
pub mod session;


pub use error::{Result, SentimentError};
pub use pipeline::{Analyzer, FileAnalysis, PredictionResult};
pub use sentiment::{map_sentiment, Sentiment};
