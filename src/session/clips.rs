use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::audio::save_sentiment_clip;
use crate::error::Result;
use crate::sentiment::Sentiment;

/// Decides when a streaming window is persisted as a clip
#[derive(Debug, Clone)]
pub struct ClipPolicy {
    dir: PathBuf,
    interval: Duration,
    last_saved: Option<Instant>,
}

impl ClipPolicy {
    /// `dir` must already exist
    pub fn new(dir: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            interval,
            last_saved: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save on a sentiment change, or once the interval since the last save elapsed
    pub fn should_save(&self, changed: bool, now: Instant) -> bool {
        changed
            || self
                .last_saved
                .map_or(true, |last| now.duration_since(last) >= self.interval)
    }

    /// Save the window if due; returns the written path
    pub fn maybe_save(
        &mut self,
        changed: bool,
        now: Instant,
        sentiment: Sentiment,
        at: DateTime<Local>,
        window: &[f32],
    ) -> Result<Option<PathBuf>> {
        if !self.should_save(changed, now) {
            return Ok(None);
        }

        let path = save_sentiment_clip(&self.dir, sentiment, at, window)?;
        self.last_saved = Some(now);
        Ok(Some(path))
    }
}
