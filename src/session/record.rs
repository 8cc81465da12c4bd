use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::PredictionResult;
use crate::sentiment::Sentiment;

/// A sentiment change observed during a continuous session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentEvent {
    pub timestamp: DateTime<Local>,
    pub label: String,
    pub sentiment: Sentiment,
    pub confidence: f32,
}

impl SentimentEvent {
    pub fn new(timestamp: DateTime<Local>, prediction: &PredictionResult) -> Self {
        Self {
            timestamp,
            label: prediction.label.clone(),
            sentiment: prediction.sentiment,
            confidence: prediction.confidence,
        }
    }

    /// One summary line, e.g. `14:02:11 - 03_happy (positive) - Confidence: 71.0%`
    pub fn describe(&self) -> String {
        format!(
            "{} - {} ({}) - Confidence: {:.1}%",
            self.timestamp.format("%H:%M:%S"),
            self.label,
            self.sentiment,
            self.confidence * 100.0
        )
    }
}

/// Record of a continuous session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub started_at: DateTime<Local>,
    pub ended_at: Option<DateTime<Local>>,
    pub events: Vec<SentimentEvent>,

    // Stats
    pub cycles_analyzed: u64,
    pub cycle_errors: u64,
    pub clips_saved: u64,
    pub overflow_count: u64,
    /// Capture broke before the session was stopped
    pub capture_failed: bool,
}

impl SessionSummary {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Local::now(),
            ended_at: None,
            events: Vec::new(),
            cycles_analyzed: 0,
            cycle_errors: 0,
            clips_saved: 0,
            overflow_count: 0,
            capture_failed: false,
        }
    }

    /// Sentiment of the most recent event
    pub fn current_sentiment(&self) -> Option<Sentiment> {
        self.events.last().map(|e| e.sentiment)
    }

    /// Record a prediction; only sentiment changes become events.
    /// Returns whether an event was appended.
    pub fn record(&mut self, at: DateTime<Local>, prediction: &PredictionResult) -> bool {
        self.cycles_analyzed += 1;

        if self.current_sentiment() == Some(prediction.sentiment) {
            return false;
        }

        self.events.push(SentimentEvent::new(at, prediction));
        true
    }

    pub fn record_error(&mut self) {
        self.cycle_errors += 1;
    }

    pub fn finalize(&mut self) {
        self.ended_at = Some(Local::now());
    }

    pub fn duration_secs(&self) -> f64 {
        let end = self.ended_at.unwrap_or_else(Local::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Numbered event lines in chronological order
    pub fn summary_lines(&self) -> Vec<String> {
        self.events
            .iter()
            .enumerate()
            .map(|(i, event)| format!("{}. {}", i + 1, event.describe()))
            .collect()
    }
}

impl Default for SessionSummary {
    fn default() -> Self {
        Self::new()
    }
}
