//! Continuous real-time analysis over a capture window source.

mod clips;
mod record;

pub use clips::ClipPolicy;
pub use record::{SentimentEvent, SessionSummary};

use chrono::Local;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::audio::WindowSource;
use crate::pipeline::{Analyzer, PredictionResult};

/// Options for a continuous session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub poll_interval: Duration,
    /// Stop after this long; `None` runs until interrupted
    pub max_duration: Option<Duration>,
    pub clips: Option<ClipPolicy>,
    /// Print a live status line per analysed window
    pub live_output: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_duration: None,
            clips: None,
            live_output: false,
        }
    }
}

/// Polls a window source and classifies every new full window
pub struct RealtimeSession<'a, S: WindowSource> {
    source: &'a S,
    analyzer: &'a Analyzer,
    options: SessionOptions,
    stop: Arc<AtomicBool>,
}

impl<'a, S: WindowSource> RealtimeSession<'a, S> {
    pub fn new(
        source: &'a S,
        analyzer: &'a Analyzer,
        options: SessionOptions,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            analyzer,
            options,
            stop,
        }
    }

    /// Run until the stop flag is set or the duration cap is reached.
    /// Per-cycle failures are logged and counted; the loop keeps going.
    pub fn run(mut self) -> SessionSummary {
        let mut summary = SessionSummary::new();
        let started = Instant::now();
        let mut last_window: Option<Arc<[f32]>> = None;

        info!("Session {} started", summary.session_id);

        while !self.stop.load(Ordering::SeqCst) {
            if let Some(max) = self.options.max_duration {
                if started.elapsed() >= max {
                    info!("Reached time limit of {} seconds", max.as_secs_f32());
                    if self.options.live_output {
                        print!("\nReached time limit of {} seconds.", max.as_secs());
                    }
                    break;
                }
            }

            if self.source.has_failed() {
                error!("Audio capture failed, ending session");
                summary.capture_failed = true;
                break;
            }

            if let Some(window) = self.source.snapshot() {
                let is_new = last_window
                    .as_ref()
                    .map_or(true, |last| !Arc::ptr_eq(last, &window));

                if is_new {
                    self.analyze_cycle(&window, &mut summary);
                    last_window = Some(window);
                }
            }

            std::thread::sleep(self.options.poll_interval);
        }

        if self.options.live_output {
            println!();
        }

        summary.finalize();
        info!(
            "Session {} finished: {} windows, {} events, {} errors",
            summary.session_id,
            summary.cycles_analyzed,
            summary.events.len(),
            summary.cycle_errors
        );
        summary
    }

    fn analyze_cycle(&mut self, window: &[f32], summary: &mut SessionSummary) {
        let prediction = match self.analyzer.analyze_window(window) {
            Ok(prediction) => prediction,
            Err(e) => {
                warn!("Error in analysis: {}", e);
                summary.record_error();
                return;
            }
        };

        let now = Local::now();
        let changed = summary.record(now, &prediction);
        if changed {
            debug!("Sentiment changed to {}", prediction.sentiment);
        }

        if self.options.live_output {
            print_live(&prediction);
        }

        if let Some(policy) = self.options.clips.as_mut() {
            match policy.maybe_save(changed, Instant::now(), prediction.sentiment, now, window) {
                Ok(Some(path)) => {
                    summary.clips_saved += 1;
                    debug!("Saved clip {:?}", path);
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to save clip: {}", e),
            }
        }
    }
}

/// Status line rewritten in place after every analysed window
pub fn live_line(prediction: &PredictionResult) -> String {
    format!(
        "Voice detected: {} (Sentiment: {}) - Confidence: {:.1}%",
        prediction.label,
        prediction.sentiment,
        prediction.confidence * 100.0
    )
}

fn print_live(prediction: &PredictionResult) {
    print!("\r{}", live_line(prediction));
    std::io::stdout().flush().ok();
}

/// Print the ordered list of sentiment changes
pub fn print_summary(summary: &SessionSummary) {
    if summary.capture_failed {
        println!("\nAudio capture stopped after a device error.");
    }

    println!("\nAnalysis Summary:");
    println!("----------------");
    for line in summary.summary_lines() {
        println!("{}", line);
    }
    if summary.events.is_empty() {
        println!("No voice detected.");
    }

    println!("\nDuration: {:.1}s", summary.duration_secs());
    println!("Windows analysed: {}", summary.cycles_analyzed);
    if summary.cycle_errors > 0 {
        println!("Failed windows: {}", summary.cycle_errors);
    }
    if summary.clips_saved > 0 {
        println!("Clips saved: {}", summary.clips_saved);
    }
}
