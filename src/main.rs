use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use voice_sentiment::audio::{list_input_devices, CaptureEngine, CpalDevice};
use voice_sentiment::classifier::{resolve_artifacts, ClassifierArtifact};
use voice_sentiment::config::{clip_samples, Config};
use voice_sentiment::features::FeatureType;
use voice_sentiment::server::{start_server, AnalyzerLoader, AppState};
use voice_sentiment::session::{print_summary, ClipPolicy, RealtimeSession, SessionOptions, SessionSummary};
use voice_sentiment::{Analyzer, FileAnalysis};

/// Detect emotion and sentiment in speech
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.voice-sentiment/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Model selection shared by every analysis command
#[derive(Args, Debug, Clone)]
struct ModelArgs {
    /// Model file (default: most recent in the models directory)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Label encoder file (default: label_encoder.json next to the models)
    #[arg(short, long)]
    encoder: Option<PathBuf>,

    /// Feature type the model was trained on
    #[arg(short, long, value_enum)]
    feature: Option<FeatureType>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a single WAV file
    Analyze {
        /// Audio file to analyze
        file: PathBuf,

        #[command(flatten)]
        model: ModelArgs,

        /// Silence trim threshold in dB below peak
        #[arg(long)]
        top_db: Option<f32>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze microphone input continuously
    Realtime {
        #[command(flatten)]
        model: ModelArgs,

        /// Save analysed windows as WAV clips
        #[arg(long)]
        save_clips: bool,

        /// Directory for saved clips
        #[arg(long)]
        clips_dir: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Input device name (see list-devices)
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Serve the analysis API over HTTP
    Serve {
        #[command(flatten)]
        model: ModelArgs,

        /// Listen address
        #[arg(long)]
        addr: Option<String>,

        /// Silence trim threshold in dB below peak
        #[arg(long)]
        top_db: Option<f32>,
    },

    /// List available input devices
    ListDevices,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Analyze {
            file,
            model,
            top_db,
            json,
        } => {
            let top_db = top_db.unwrap_or(config.file_top_db);
            analyze_file(&file, &model, &config, top_db, json)
        }
        Command::Realtime {
            model,
            save_clips,
            clips_dir,
            duration,
            device,
        } => {
            let clips_dir = save_clips.then(|| clips_dir.unwrap_or_else(|| config.clips_dir.clone()));
            run_realtime(&model, &config, clips_dir, duration, device).await
        }
        Command::Serve {
            model,
            addr,
            top_db,
        } => {
            let addr = addr.unwrap_or_else(|| config.server_addr.clone());
            let top_db = top_db.unwrap_or(config.server_top_db);
            serve(model, config, &addr, top_db).await
        }
        Command::ListDevices => list_devices(),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::default_config_path()?,
    };
    Config::load(&path).with_context(|| format!("Failed to load config from {:?}", path))
}

fn load_analyzer(
    args: &ModelArgs,
    config: &Config,
    default_features: FeatureType,
    top_db: f32,
) -> voice_sentiment::Result<Analyzer> {
    let paths = resolve_artifacts(args.model.clone(), args.encoder.clone(), config)?;
    let artifact = ClassifierArtifact::load(&paths, config.inference_threads)?;
    let feature_type = args.feature.unwrap_or(default_features);
    Ok(Analyzer::new(Arc::new(artifact), feature_type, top_db))
}

fn analyze_file(file: &Path, args: &ModelArgs, config: &Config, top_db: f32, json: bool) -> Result<()> {
    let analyzer = load_analyzer(args, config, config.feature_type, top_db)?;

    println!("\nAnalyzing file: {}", file.display());
    info!("Using {} features", analyzer.feature_type());
    let start = Instant::now();
    let result = analyzer
        .analyze_file(file)
        .with_context(|| format!("Failed to analyze {:?}", file))?;
    let elapsed = start.elapsed().as_secs_f64();

    if json {
        let report = FileAnalysis::new(file, result, elapsed);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\nResults:");
    println!("Detected emotion: {}", result.label);
    println!("Sentiment category: {}", result.sentiment);
    println!("Confidence: {:.1}%", result.confidence * 100.0);
    println!("\nAnalysis completed in {:.2} seconds", elapsed);
    Ok(())
}

async fn run_realtime(
    args: &ModelArgs,
    config: &Config,
    clips_dir: Option<PathBuf>,
    duration: Option<u64>,
    device: Option<String>,
) -> Result<()> {
    let analyzer = load_analyzer(args, config, config.feature_type, config.stream_top_db)?;

    let clips = match clips_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create clips directory {:?}", dir))?;
            info!("Saving clips to {:?}", dir);
            Some(ClipPolicy::new(dir, Duration::from_secs(config.clip_save_interval_secs)))
        }
        None => None,
    };

    let options = SessionOptions {
        poll_interval: Duration::from_millis(config.poll_interval_ms),
        max_duration: duration.map(Duration::from_secs),
        clips,
        live_output: true,
    };

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_ctrlc = stop_flag.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, stopping...");
        stop_flag_ctrlc.store(true, Ordering::SeqCst);
    });

    let chunk_size = config.chunk_size;
    let summary = tokio::task::spawn_blocking(move || {
        capture_session(device, chunk_size, &analyzer, options, stop_flag)
    })
    .await
    .context("Realtime session task failed")??;

    print_summary(&summary);
    info!("Session complete");
    Ok(())
}

/// Runs on a blocking thread: the cpal stream cannot leave the thread that opened it
fn capture_session(
    device: Option<String>,
    chunk_size: usize,
    analyzer: &Analyzer,
    options: SessionOptions,
    stop_flag: Arc<AtomicBool>,
) -> Result<SessionSummary> {
    let mut engine = CaptureEngine::new(CpalDevice::new(device), clip_samples(), chunk_size);
    engine.start().context("Failed to start audio capture")?;

    println!("Recording started... Speak now");
    println!("Press Ctrl+C to stop");

    let mut summary = RealtimeSession::new(&engine, analyzer, options, stop_flag).run();

    summary.overflow_count = engine.overflow_count();
    engine.stop();

    if summary.overflow_count > 0 {
        warn!("Audio overflows detected: {}", summary.overflow_count);
    }
    Ok(summary)
}

async fn serve(args: ModelArgs, config: Config, addr: &str, top_db: f32) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("Invalid listen address: {}", addr))?;

    let loader: AnalyzerLoader = Arc::new(move || {
        load_analyzer(&args, &config, config.server_feature_type, top_db)
    });
    let state = AppState::new(loader);
    state.preload().await;

    start_server(addr, state)
        .await
        .with_context(|| format!("Server on {} failed", addr))
}

fn list_devices() -> Result<()> {
    println!("Available input devices:\n");

    match list_input_devices() {
        Ok(devices) => {
            if devices.is_empty() {
                println!("  No input devices found.");
            } else {
                for device in devices {
                    let default_marker = if device.is_default { " (default)" } else { "" };
                    println!("  - {}{}", device.name, default_marker);
                }
            }
        }
        Err(e) => {
            error!("Failed to list devices: {}", e);
            println!("  Error: {}", e);
        }
    }

    Ok(())
}
