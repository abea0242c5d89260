use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use super::device::MicrophoneBackend;
use super::file::AudioFile;

/// One block of captured microphone audio (mono, float samples in [-1, 1])
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Captured samples
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Sample rate frames are delivered at
    pub target_sample_rate: u32,
    /// Frame size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // live API input rate
            buffer_duration_ms: 100,   // 100ms frames
        }
    }
}

impl AudioBackendConfig {
    pub fn samples_per_frame(&self) -> usize {
        (self.target_sample_rate as u64 * self.buffer_duration_ms / 1000) as usize
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: live capture through cpal
/// - File: replays a WAV file in real time in place of a microphone
/// - Silence: keeps the line open with zeroed frames
/// - Channel: frames pushed by the embedding application
#[async_trait]
pub trait AudioBackend: Send {
    /// Acquire the device and start capturing
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing and release the device
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Live input device; `None` picks the host default
    Microphone(Option<String>),
    /// WAV file replayed as if it were a microphone
    File(PathBuf),
    /// Zeroed frames at real-time pace
    Silence,
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create a fresh capture backend for the given source
    pub fn create(source: AudioSource, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Microphone(device) => Ok(Box::new(MicrophoneBackend::new(device, config))),
            AudioSource::File(path) => Ok(Box::new(PacedBackend::from_file(path, config))),
            AudioSource::Silence => Ok(Box::new(PacedBackend::silence(config))),
        }
    }
}

enum PacedInput {
    File(PathBuf),
    Silence,
}

/// Emits fixed-size frames on a real-time clock, from a WAV file or silence
pub struct PacedBackend {
    config: AudioBackendConfig,
    input: PacedInput,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl PacedBackend {
    pub fn from_file(path: PathBuf, config: AudioBackendConfig) -> Self {
        Self {
            config,
            input: PacedInput::File(path),
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn silence(config: AudioBackendConfig) -> Self {
        Self {
            config,
            input: PacedInput::Silence,
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    fn load_samples(&self) -> Result<Option<Vec<f32>>> {
        match &self.input {
            PacedInput::Silence => Ok(None),
            PacedInput::File(path) => {
                let audio = AudioFile::open(path)?;
                Ok(Some(audio.to_mono_float(self.config.target_sample_rate)?))
            }
        }
    }
}

#[async_trait]
impl AudioBackend for PacedBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.running.load(Ordering::SeqCst) {
            bail!("Already capturing");
        }

        let frame_len = self.config.samples_per_frame();
        if frame_len == 0 {
            bail!(
                "Frame duration of {}ms is too short at {}Hz",
                self.config.buffer_duration_ms,
                self.config.target_sample_rate
            );
        }

        let samples = self.load_samples()?;
        let frame_ms = self.config.buffer_duration_ms;
        let sample_rate = self.config.target_sample_rate;

        info!(
            "Starting {} capture ({}Hz, {}ms frames)",
            self.name(),
            sample_rate,
            frame_ms
        );

        let (tx, rx) = mpsc::channel(100);
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(frame_ms.max(1)));
            let mut timestamp_ms = 0u64;
            let mut offset = 0usize;

            while running.load(Ordering::SeqCst) {
                ticker.tick().await;

                let frame_samples = match &samples {
                    None => vec![0.0; frame_len],
                    Some(all) => {
                        if offset >= all.len() {
                            info!("Capture file exhausted after {}ms", timestamp_ms);
                            break;
                        }
                        let end = (offset + frame_len).min(all.len());
                        let chunk = all[offset..end].to_vec();
                        offset = end;
                        chunk
                    }
                };

                let frame = AudioFrame {
                    samples: frame_samples,
                    sample_rate,
                    timestamp_ms,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
                timestamp_ms += frame_ms;
            }

            running.store(false, Ordering::SeqCst);
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            info!("{} capture stopped", self.name());
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        match self.input {
            PacedInput::File(_) => "WAV file",
            PacedInput::Silence => "silence",
        }
    }
}

/// Backend fed by the embedding application through a channel
///
/// The receiver can only be handed out once; a second `start` fails the
/// same way a busy microphone would.
pub struct ChannelBackend {
    frames: Option<mpsc::Receiver<AudioFrame>>,
    capturing: bool,
}

impl ChannelBackend {
    pub fn new(frames: mpsc::Receiver<AudioFrame>) -> Self {
        Self {
            frames: Some(frames),
            capturing: false,
        }
    }
}

#[async_trait]
impl AudioBackend for ChannelBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        match self.frames.take() {
            Some(rx) => {
                self.capturing = true;
                Ok(rx)
            }
            None => bail!("Capture channel already in use"),
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "channel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_follows_rate_and_duration() {
        let config = AudioBackendConfig::default();
        assert_eq!(config.samples_per_frame(), 1600);

        let config = AudioBackendConfig {
            target_sample_rate: 48000,
            buffer_duration_ms: 20,
        };
        assert_eq!(config.samples_per_frame(), 960);

        let config = AudioBackendConfig {
            target_sample_rate: 8000,
            buffer_duration_ms: 0,
        };
        assert_eq!(config.samples_per_frame(), 0);
    }

    #[tokio::test]
    async fn silence_backend_emits_zeroed_frames() {
        let config = AudioBackendConfig {
            target_sample_rate: 16000,
            buffer_duration_ms: 10,
        };
        let mut backend = AudioBackendFactory::create(AudioSource::Silence, config).unwrap();
        let mut rx = backend.start().await.unwrap();
        assert!(backend.is_capturing());

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.samples.len(), 160);
        assert!(frame.samples.iter().all(|&s| s == 0.0));
        assert_eq!(frame.timestamp_ms, 0);

        backend.stop().await.unwrap();
        assert!(!backend.is_capturing());
    }

    #[tokio::test]
    async fn channel_backend_hands_out_receiver_once() {
        let (_tx, rx) = mpsc::channel(4);
        let mut backend = ChannelBackend::new(rx);
        assert!(backend.start().await.is_ok());
        assert!(backend.start().await.is_err());
    }
}
