//! Audio plumbing for the client session
//!
//! - `codec`: float ↔ PCM16 conversion for the wire
//! - `backend`: capture sources that deliver fixed-size frames
//! - `device`: microphone and speaker through cpal
//! - `file`: WAV loading and resampling
//! - `sink`: where decoded AI speech goes
//! - `playback`: FIFO scheduling with barge-in

pub mod backend;
pub mod codec;
pub mod device;
pub mod file;
pub mod playback;
pub mod sink;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, ChannelBackend,
    PacedBackend,
};
pub use device::{input_device_names, MicrophoneBackend, SpeakerSink};
pub use file::{resample_linear, AudioFile};
pub use playback::{PlaybackEvent, PlaybackQueue, PlaybackScheduler};
pub use sink::{AudioOutput, AudioSink, PacedSink, WavSink};
