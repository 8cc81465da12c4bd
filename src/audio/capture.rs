//! Microphone capture feeding a rolling analysis window.
//!
//! The device callback pushes raw samples into a lock-free SPSC ring buffer.
//! A background append thread drains it one chunk at a time, resamples to
//! 16kHz when the device runs at another rate, and appends to a
//! [`RollingAudioBuffer`]. Each time the buffer holds a full window it is
//! published to a [`WindowSlot`] for the analysis loop.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use ringbuf::traits::{Consumer as ConsumerTrait, Observer, Producer as ProducerTrait, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::resampler::AudioResampler;
use super::rolling::{RollingAudioBuffer, WindowSlot};
use crate::config::SAMPLE_RATE;
use crate::error::{Result, SentimentError};

/// Audio device information
#[derive(Debug, Clone)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// List available input devices
pub fn list_input_devices() -> Result<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let default_device = host.default_input_device();
    let default_name = default_device
        .as_ref()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();

    let mut devices = Vec::new();

    for device in host
        .input_devices()
        .map_err(|e| SentimentError::Device(format!("Failed to enumerate input devices: {}", e)))?
    {
        if let Ok(name) = device.name() {
            let is_default = name == default_name;
            devices.push(AudioDevice {
                id: name.clone(),
                name,
                is_default,
            });
        }
    }

    Ok(devices)
}

/// Get device by ID (name) or return default
pub fn get_device(device_id: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    match device_id {
        Some(id) if id != "default" => {
            for device in host
                .input_devices()
                .map_err(|e| SentimentError::Device(format!("Failed to enumerate devices: {}", e)))?
            {
                if let Ok(name) = device.name() {
                    if name == id {
                        return Ok(device);
                    }
                }
            }
            Err(SentimentError::Device(format!("Device not found: {}", id)))
        }
        _ => host
            .default_input_device()
            .ok_or_else(|| SentimentError::Device("No default input device available".into())),
    }
}

/// Selected audio configuration with both stream config and sample format
pub struct SelectedConfig {
    pub config: StreamConfig,
    pub sample_format: SampleFormat,
}

/// Select an input configuration, preferring mono at 16kHz
pub fn select_input_config(device: &Device) -> Result<SelectedConfig> {
    if let Ok(supported) = device.supported_input_configs() {
        let mono: Vec<_> = supported.filter(|range| range.channels() == 1).collect();

        // Capture at 16kHz directly when the device allows it
        for config_range in &mono {
            let rate = cpal::SampleRate(SAMPLE_RATE);
            if config_range.min_sample_rate() <= rate && rate <= config_range.max_sample_rate() {
                let supported_config = config_range.clone().with_sample_rate(rate);
                debug!(
                    "Selected mono config at {} Hz, format {:?}",
                    SAMPLE_RATE,
                    supported_config.sample_format()
                );
                return Ok(SelectedConfig {
                    config: supported_config.clone().into(),
                    sample_format: supported_config.sample_format(),
                });
            }
        }

        if let Some(config_range) = mono.into_iter().next() {
            let supported_config = config_range.with_max_sample_rate();
            debug!(
                "Selected mono config: {} Hz, format {:?}",
                supported_config.sample_rate().0,
                supported_config.sample_format()
            );
            return Ok(SelectedConfig {
                config: supported_config.clone().into(),
                sample_format: supported_config.sample_format(),
            });
        }
    }

    // Fall back to default (will downmix in callback)
    let supported_config = device
        .default_input_config()
        .map_err(|e| SentimentError::Device(format!("No default input config: {}", e)))?;
    debug!(
        "Using default config (will downmix): {} Hz, {} channels, format {:?}",
        supported_config.sample_rate().0,
        supported_config.channels(),
        supported_config.sample_format()
    );
    Ok(SelectedConfig {
        config: supported_config.clone().into(),
        sample_format: supported_config.sample_format(),
    })
}

/// Calculate ring buffer capacity for given sample rate
pub fn calculate_ring_buffer_capacity(device_sample_rate: u32) -> usize {
    const BUFFER_DURATION_SECONDS: u32 = 5;
    (device_sample_rate * BUFFER_DURATION_SECONDS) as usize
}

/// Running cpal input stream writing into a ring buffer producer
pub struct AudioCapture {
    stream: Stream,
    sample_rate: u32,
    overflow_counter: Arc<AtomicU64>,
    is_running: Arc<AtomicBool>,
    stream_failed: Arc<AtomicBool>,
}

impl AudioCapture {
    /// Build an input stream that writes to the given ring buffer producer
    pub fn new(
        device: &Device,
        config: &StreamConfig,
        sample_format: SampleFormat,
        mut producer: HeapProd<f32>,
    ) -> Result<Self> {
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0;
        let overflow_counter = Arc::new(AtomicU64::new(0));
        let overflow_clone = overflow_counter.clone();
        let is_running = Arc::new(AtomicBool::new(false));
        let running_clone = is_running.clone();

        info!(
            "Building input stream: {} Hz, {} channels, format {:?}",
            sample_rate, channels, sample_format
        );

        let stream_failed = Arc::new(AtomicBool::new(false));
        let failed_clone = stream_failed.clone();
        let error_callback = move |err| {
            error!("Audio stream error: {}", err);
            failed_clone.store(true, Ordering::SeqCst);
        };

        let stream = match sample_format {
            SampleFormat::F32 => device.build_input_stream(
                config,
                move |data: &[f32], _| {
                    if !running_clone.load(Ordering::Relaxed) {
                        return;
                    }
                    push_frames(data, channels, &mut producer, &overflow_clone, |s| s);
                },
                error_callback,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                config,
                move |data: &[i16], _| {
                    if !running_clone.load(Ordering::Relaxed) {
                        return;
                    }
                    push_frames(data, channels, &mut producer, &overflow_clone, |s| {
                        s as f32 / 32768.0
                    });
                },
                error_callback,
                None,
            ),
            SampleFormat::U8 => device.build_input_stream(
                config,
                move |data: &[u8], _| {
                    if !running_clone.load(Ordering::Relaxed) {
                        return;
                    }
                    // u8 is unsigned: 0-255, with 128 as center
                    push_frames(data, channels, &mut producer, &overflow_clone, |s| {
                        (s as f32 - 128.0) / 128.0
                    });
                },
                error_callback,
                None,
            ),
            other => {
                return Err(SentimentError::Device(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        }
        .map_err(|e| SentimentError::Device(format!("Failed to build input stream: {}", e)))?;

        Ok(Self {
            stream,
            sample_rate,
            overflow_counter,
            is_running,
            stream_failed,
        })
    }

    /// Start capturing audio
    pub fn start(&self) -> Result<()> {
        self.is_running.store(true, Ordering::SeqCst);
        self.stream
            .play()
            .map_err(|e| SentimentError::Device(format!("Failed to start audio stream: {}", e)))?;
        info!("Audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&self) -> Result<()> {
        self.is_running.store(false, Ordering::SeqCst);
        self.stream
            .pause()
            .map_err(|e| SentimentError::Device(format!("Failed to stop audio stream: {}", e)))?;
        info!("Audio capture stopped");
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_counter.load(Ordering::Relaxed)
    }

    /// Whether the stream reported an error since it was built
    pub fn has_failed(&self) -> bool {
        self.stream_failed.load(Ordering::SeqCst)
    }
}

/// Push the first channel of each frame, converted to f32.
/// Samples that do not fit are dropped and counted as one overflow.
fn push_frames<T: Copy>(
    data: &[T],
    channels: usize,
    producer: &mut HeapProd<f32>,
    overflow_counter: &AtomicU64,
    convert: impl Fn(T) -> f32,
) {
    for frame in data.chunks(channels.max(1)) {
        if producer.try_push(convert(frame[0])).is_err() {
            overflow_counter.fetch_add(1, Ordering::Relaxed);
            break;
        }
    }
}

/// Samples streaming from an opened capture device
pub struct OpenedStream {
    pub consumer: HeapCons<f32>,
    pub sample_rate: u32,
}

/// Source of raw microphone samples
pub trait CaptureDevice {
    /// Open the device and start streaming into a fresh ring buffer
    fn open(&mut self) -> Result<OpenedStream>;

    /// Stop streaming and release the device
    fn close(&mut self);

    /// Samples dropped because the ring buffer was full
    fn overflow_count(&self) -> u64 {
        0
    }

    /// Whether the device stopped delivering audio because of an error
    fn has_failed(&self) -> bool {
        false
    }
}

/// Default cpal input device
pub struct CpalDevice {
    device_id: Option<String>,
    capture: Option<AudioCapture>,
}

impl CpalDevice {
    pub fn new(device_id: Option<String>) -> Self {
        Self {
            device_id,
            capture: None,
        }
    }
}

impl CaptureDevice for CpalDevice {
    fn open(&mut self) -> Result<OpenedStream> {
        let device = get_device(self.device_id.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio device: {}", device_name);

        let selected = select_input_config(&device)?;
        let sample_rate = selected.config.sample_rate.0;

        let capacity = calculate_ring_buffer_capacity(sample_rate);
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        debug!("Ring buffer capacity: {} samples", capacity);

        let capture = AudioCapture::new(&device, &selected.config, selected.sample_format, producer)?;
        capture.start()?;
        self.capture = Some(capture);

        Ok(OpenedStream {
            consumer,
            sample_rate,
        })
    }

    fn close(&mut self) {
        if let Some(capture) = self.capture.take() {
            if let Err(e) = capture.stop() {
                warn!("{}", e);
            }
            if capture.overflow_count() > 0 {
                warn!("Audio overflows detected: {}", capture.overflow_count());
            }
        }
    }

    fn overflow_count(&self) -> u64 {
        self.capture.as_ref().map_or(0, AudioCapture::overflow_count)
    }

    fn has_failed(&self) -> bool {
        self.capture.as_ref().map_or(false, AudioCapture::has_failed)
    }
}

/// Anything that can hand out the latest full analysis window
pub trait WindowSource {
    /// The most recent full window, or `None` while not ready
    fn snapshot(&self) -> Option<Arc<[f32]>>;

    /// True once no further windows will arrive because capture broke
    fn has_failed(&self) -> bool {
        false
    }
}

/// Capture engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
}

/// Drives a capture device and maintains the rolling analysis window
pub struct CaptureEngine<D: CaptureDevice> {
    device: D,
    state: CaptureState,
    capacity: usize,
    chunk_size: usize,
    is_recording: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    window: WindowSlot,
    worker: Option<JoinHandle<()>>,
}

impl<D: CaptureDevice> CaptureEngine<D> {
    /// `capacity` is the window length in 16kHz samples
    pub fn new(device: D, capacity: usize, chunk_size: usize) -> Self {
        Self {
            device,
            state: CaptureState::Idle,
            capacity,
            chunk_size: chunk_size.max(1),
            is_recording: Arc::new(AtomicBool::new(false)),
            failed: Arc::new(AtomicBool::new(false)),
            window: WindowSlot::new(),
            worker: None,
        }
    }

    /// Open the device and launch the append loop
    pub fn start(&mut self) -> Result<()> {
        if self.state == CaptureState::Recording {
            self.stop();
        }

        let opened = self.device.open()?;
        self.window.clear();
        self.failed.store(false, Ordering::SeqCst);
        self.is_recording.store(true, Ordering::SeqCst);

        let config = AppendConfig {
            sample_rate: opened.sample_rate,
            chunk_size: self.chunk_size,
            capacity: self.capacity,
        };
        let recording = self.is_recording.clone();
        let failed = self.failed.clone();
        let window = self.window.clone();

        let spawned = std::thread::Builder::new()
            .name("capture-append".into())
            .spawn(move || run_append_loop(opened.consumer, config, window, recording, failed));

        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                self.is_recording.store(false, Ordering::SeqCst);
                self.device.close();
                return Err(SentimentError::Device(format!(
                    "Failed to spawn capture thread: {}",
                    e
                )));
            }
        };

        self.worker = Some(worker);
        self.state = CaptureState::Recording;
        info!("Recording started");
        Ok(())
    }

    /// Stop the append loop and close the device. Calling twice is a no-op.
    pub fn stop(&mut self) {
        if self.state == CaptureState::Idle {
            return;
        }

        self.is_recording.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Capture append thread panicked");
            }
        }
        self.device.close();
        self.state = CaptureState::Idle;
        info!("Recording stopped");
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn overflow_count(&self) -> u64 {
        self.device.overflow_count()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Append loop or device gave up; the window will not advance any more
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst) || self.device.has_failed()
    }
}

impl<D: CaptureDevice> WindowSource for CaptureEngine<D> {
    fn snapshot(&self) -> Option<Arc<[f32]>> {
        self.window.latest()
    }

    fn has_failed(&self) -> bool {
        CaptureEngine::has_failed(self)
    }
}

impl<D: CaptureDevice> Drop for CaptureEngine<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

struct AppendConfig {
    sample_rate: u32,
    chunk_size: usize,
    capacity: usize,
}

/// Drain the ring buffer chunk by chunk into the rolling window
fn run_append_loop(
    mut consumer: HeapCons<f32>,
    config: AppendConfig,
    window: WindowSlot,
    recording: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
) {
    let mut resampler = if config.sample_rate == SAMPLE_RATE {
        None
    } else {
        match AudioResampler::new(config.sample_rate) {
            Ok(resampler) => Some(resampler),
            Err(e) => {
                error!("Error recording audio: {}", e);
                failed.store(true, Ordering::SeqCst);
                return;
            }
        }
    };

    let chunk_size = resampler
        .as_ref()
        .map_or(config.chunk_size, AudioResampler::input_frames_next);
    let mut chunk = vec![0.0f32; chunk_size];
    let mut buffer = RollingAudioBuffer::new(config.capacity);

    debug!(
        "Append loop started: {} Hz input, {} sample chunks",
        config.sample_rate, chunk_size
    );

    while recording.load(Ordering::Relaxed) {
        if consumer.occupied_len() < chunk_size {
            std::thread::sleep(Duration::from_millis(5));
            continue;
        }

        let read = consumer.pop_slice(&mut chunk);
        if read < chunk_size {
            warn!("Incomplete read from ring buffer: {} < {}", read, chunk_size);
            continue;
        }

        match resampler.as_mut() {
            Some(resampler) => match resampler.process(&chunk) {
                Ok(resampled) => buffer.push_slice(&resampled),
                Err(e) => {
                    error!("Error recording audio: {}", e);
                    failed.store(true, Ordering::SeqCst);
                    break;
                }
            },
            None => buffer.push_slice(&chunk),
        }

        if let Some(full) = buffer.window() {
            window.publish(full);
        }
    }

    debug!("Append loop stopped after {} samples", buffer.total_appended());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Device that pre-fills its ring buffer with a fixed signal
    struct PrefilledDevice {
        samples: Vec<f32>,
        sample_rate: u32,
        fail: bool,
        open_count: usize,
        close_count: usize,
    }

    impl PrefilledDevice {
        fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
            Self {
                samples,
                sample_rate,
                fail: false,
                open_count: 0,
                close_count: 0,
            }
        }
    }

    impl CaptureDevice for PrefilledDevice {
        fn open(&mut self) -> Result<OpenedStream> {
            if self.fail {
                return Err(SentimentError::Device("microphone unavailable".into()));
            }
            self.open_count += 1;
            let (mut producer, consumer) = HeapRb::<f32>::new(self.samples.len() + 1).split();
            producer.push_slice(&self.samples);
            Ok(OpenedStream {
                consumer,
                sample_rate: self.sample_rate,
            })
        }

        fn close(&mut self) {
            self.close_count += 1;
        }
    }

    fn wait_for_window<S: WindowSource>(source: &S) -> Option<Arc<[f32]>> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(window) = source.snapshot() {
                return Some(window);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_calculate_ring_buffer_capacity() {
        assert_eq!(calculate_ring_buffer_capacity(48000), 240_000);
        assert_eq!(calculate_ring_buffer_capacity(16000), 80_000);
    }

    #[test]
    fn test_push_frames_downmixes_first_channel() {
        let (mut producer, mut consumer) = HeapRb::<f32>::new(8).split();
        let overflow = AtomicU64::new(0);
        push_frames(&[1i16, 2, 3, 4], 2, &mut producer, &overflow, |s| s as f32);

        let mut out = [0.0f32; 2];
        assert_eq!(consumer.pop_slice(&mut out), 2);
        assert_eq!(out, [1.0, 3.0]);
        assert_eq!(overflow.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_push_frames_counts_overflow() {
        let (mut producer, _consumer) = HeapRb::<f32>::new(2).split();
        let overflow = AtomicU64::new(0);
        push_frames(&[0.1f32, 0.2, 0.3], 1, &mut producer, &overflow, |s| s);
        assert_eq!(overflow.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_snapshot_not_ready_before_capacity() {
        let device = PrefilledDevice::new(vec![0.1; 1500], SAMPLE_RATE);
        let mut engine = CaptureEngine::new(device, 2048, 512);
        engine.start().unwrap();

        std::thread::sleep(Duration::from_millis(100));
        assert!(engine.snapshot().is_none());
        engine.stop();
    }

    #[test]
    fn test_snapshot_returns_most_recent_window() {
        let samples: Vec<f32> = (0..4096).map(|i| i as f32).collect();
        let device = PrefilledDevice::new(samples, SAMPLE_RATE);
        let mut engine = CaptureEngine::new(device, 2048, 512);
        engine.start().unwrap();
        assert_eq!(engine.state(), CaptureState::Recording);

        // Wait until the whole prefill has been drained
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut window = wait_for_window(&engine).unwrap();
        while window[0] != 2048.0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
            window = engine.snapshot().unwrap();
        }

        assert_eq!(window.len(), 2048);
        assert_eq!(window[0], 2048.0);
        assert_eq!(window[2047], 4095.0);
        engine.stop();
    }

    #[test]
    fn test_resamples_non_native_rate() {
        let device = PrefilledDevice::new(vec![0.2; 48000], 48000);
        let mut engine = CaptureEngine::new(device, 4000, 1024);
        engine.start().unwrap();

        let window = wait_for_window(&engine).unwrap();
        assert_eq!(window.len(), 4000);
    }

    #[test]
    fn test_unusable_rate_marks_failure() {
        let device = PrefilledDevice::new(vec![0.2; 4096], 0);
        let mut engine = CaptureEngine::new(device, 1024, 256);
        engine.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !engine.has_failed() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(engine.has_failed());
        assert!(WindowSource::has_failed(&engine));
        assert!(engine.snapshot().is_none());
        engine.stop();
    }

    #[test]
    fn test_healthy_engine_not_failed() {
        let device = PrefilledDevice::new(vec![0.1; 4096], SAMPLE_RATE);
        let mut engine = CaptureEngine::new(device, 2048, 512);
        engine.start().unwrap();

        assert!(wait_for_window(&engine).is_some());
        assert!(!engine.has_failed());
        engine.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let device = PrefilledDevice::new(vec![0.0; 10], SAMPLE_RATE);
        let mut engine = CaptureEngine::new(device, 100, 10);
        engine.start().unwrap();

        engine.stop();
        engine.stop();
        assert_eq!(engine.state(), CaptureState::Idle);
        assert_eq!(engine.device().close_count, 1);
    }

    #[test]
    fn test_restart_reopens_device() {
        let device = PrefilledDevice::new(vec![0.0; 10], SAMPLE_RATE);
        let mut engine = CaptureEngine::new(device, 100, 10);
        engine.start().unwrap();
        engine.start().unwrap();

        assert_eq!(engine.device().open_count, 2);
        assert_eq!(engine.device().close_count, 1);
    }

    #[test]
    fn test_device_error_on_start() {
        let mut device = PrefilledDevice::new(Vec::new(), SAMPLE_RATE);
        device.fail = true;
        let mut engine = CaptureEngine::new(device, 100, 10);

        assert!(matches!(engine.start(), Err(SentimentError::Device(_))));
        assert_eq!(engine.state(), CaptureState::Idle);
    }

    #[test]
    fn test_list_devices() {
        // Actual devices depend on the system, CI might have none
        if let Ok(devices) = list_input_devices() {
            println!("Found {} input devices", devices.len());
        }
    }
}
