pub mod capture;
pub mod clip;
pub mod loader;
pub mod normalize;
pub mod resampler;
pub mod rolling;

pub use capture::{
    calculate_ring_buffer_capacity, get_device, list_input_devices, select_input_config,
    AudioCapture, AudioDevice, CaptureDevice, CaptureEngine, CaptureState, CpalDevice,
    OpenedStream, WindowSource,
};
pub use clip::{clip_filename, save_sentiment_clip, write_clip};
pub use loader::{load_wav, DecodedAudio};
pub use normalize::Normalizer;
pub use resampler::AudioResampler;
pub use rolling::{RollingAudioBuffer, WindowSlot};
