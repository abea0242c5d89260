//! Microphone capture and speaker playback through `cpal`
//!
//! A `cpal::Stream` is not `Send`, so each stream lives on its own thread for
//! as long as the device is held. Captured audio reaches tokio through a
//! bounded channel; speech for the speaker goes through a shared sample queue
//! drained by the output callback.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle as ThreadHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use super::file::resample_linear;
use super::sink::{segment_duration, AudioSink};

/// How often `play` checks whether the speaker has drained
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Extra time a segment may take before the output is considered stuck
const DRAIN_SLACK: Duration = Duration::from_secs(1);

/// Names of the input devices the default host can see
pub fn input_device_names() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.input_devices().context("No input devices available")?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

fn input_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .input_devices()
            .context("No input devices available")?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| anyhow!("Input device '{}' not found", name)),
        None => host
            .default_input_device()
            .context("No default input device available"),
    }
}

fn output_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .output_devices()
            .context("No output devices available")?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| anyhow!("Output device '{}' not found", name)),
        None => host
            .default_output_device()
            .context("No default output device available"),
    }
}

// ============================================================================
// Capture
// ============================================================================

/// Turns device callback buffers into fixed-duration mono frames at the
/// target rate
struct Framer {
    device_rate: u32,
    target_rate: u32,
    device_frame_len: usize,
    frame_ms: u64,
    pending: Vec<f32>,
    timestamp_ms: u64,
    frames: mpsc::Sender<AudioFrame>,
    dropped: u64,
}

impl Framer {
    fn new(device_rate: u32, config: &AudioBackendConfig, frames: mpsc::Sender<AudioFrame>) -> Self {
        let device_frame_len = (device_rate as u64 * config.buffer_duration_ms / 1000) as usize;
        Self {
            device_rate,
            target_rate: config.target_sample_rate,
            device_frame_len,
            frame_ms: config.buffer_duration_ms,
            pending: Vec::with_capacity(device_frame_len * 2),
            timestamp_ms: 0,
            frames,
            dropped: 0,
        }
    }

    fn push<T: Copy>(&mut self, data: &[T], channels: usize, convert: impl Fn(T) -> f32) {
        let channels = channels.max(1);
        for chunk in data.chunks(channels) {
            let sum: f32 = chunk.iter().map(|&s| convert(s)).sum();
            self.pending.push(sum / chunk.len() as f32);
        }

        if self.device_frame_len == 0 {
            self.pending.clear();
            return;
        }

        while self.pending.len() >= self.device_frame_len {
            let block: Vec<f32> = self.pending.drain(..self.device_frame_len).collect();
            let frame = AudioFrame {
                samples: resample_linear(&block, self.device_rate, self.target_rate),
                sample_rate: self.target_rate,
                timestamp_ms: self.timestamp_ms,
            };
            self.timestamp_ms += self.frame_ms;

            // Never block the audio callback
            if self.frames.try_send(frame).is_err() {
                self.dropped += 1;
                if self.dropped == 1 || self.dropped % 50 == 0 {
                    warn!("Capture consumer is behind, {} frames dropped", self.dropped);
                }
            }
        }
    }
}

fn open_input_stream(
    device_name: Option<&str>,
    config: &AudioBackendConfig,
    frames: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream> {
    let device = input_device(device_name)?;
    let supported = device
        .default_input_config()
        .context("Failed to query microphone (is access permitted?)")?;
    let format = supported.sample_format();
    let stream_config: StreamConfig = supported.into();
    let device_rate = stream_config.sample_rate.0;
    let channels = usize::from(stream_config.channels.max(1));

    info!(
        "Microphone: {} ({:?}, {}Hz, {} channels)",
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        format,
        device_rate,
        channels
    );

    let framer = Arc::new(Mutex::new(Framer::new(device_rate, config, frames)));
    let err_fn = |err: cpal::StreamError| warn!("Capture stream error: {}", err);

    let stream = match format {
        SampleFormat::F32 => {
            let framer = Arc::clone(&framer);
            device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut framer) = framer.lock() {
                        framer.push(data, channels, |s| s);
                    }
                },
                err_fn,
                None,
            )
        }
        SampleFormat::I16 => {
            let framer = Arc::clone(&framer);
            device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut framer) = framer.lock() {
                        framer.push(data, channels, |s| s as f32 / 32_768.0);
                    }
                },
                err_fn,
                None,
            )
        }
        SampleFormat::U16 => {
            let framer = Arc::clone(&framer);
            device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut framer) = framer.lock() {
                        framer.push(data, channels, |s| (s as f32 - 32_768.0) / 32_768.0);
                    }
                },
                err_fn,
                None,
            )
        }
        other => bail!("Unsupported microphone sample format: {:?}", other),
    }
    .context("Failed to open microphone stream")?;

    stream.play().context("Failed to start microphone stream")?;
    Ok(stream)
}

/// Live microphone capture
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    device_name: Option<String>,
    running: Arc<AtomicBool>,
    stop: Option<std_mpsc::Sender<()>>,
    thread: Option<ThreadHandle<()>>,
}

impl MicrophoneBackend {
    /// `device_name` picks a specific input; the host default otherwise
    pub fn new(device_name: Option<String>, config: AudioBackendConfig) -> Self {
        Self {
            config,
            device_name,
            running: Arc::new(AtomicBool::new(false)),
            stop: None,
            thread: None,
        }
    }
}

#[async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.running.load(Ordering::SeqCst) {
            bail!("Already capturing");
        }
        if self.config.samples_per_frame() == 0 {
            bail!(
                "Frame duration of {}ms is too short at {}Hz",
                self.config.buffer_duration_ms,
                self.config.target_sample_rate
            );
        }

        let (frame_tx, frame_rx) = mpsc::channel(100);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let config = self.config.clone();
        let device_name = self.device_name.clone();
        let running = Arc::clone(&self.running);

        let thread = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let stream = match open_input_stream(device_name.as_deref(), &config, frame_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                running.store(true, Ordering::SeqCst);
                let _ = ready_tx.send(Ok(()));

                // Held until stop() or the backend is dropped
                let _ = stop_rx.recv();
                drop(stream);
                running.store(false, Ordering::SeqCst);
                debug!("Microphone stream released");
            })
            .context("Failed to spawn capture thread")?;

        match ready_rx.await {
            Ok(Ok(())) => {
                self.stop = Some(stop_tx);
                self.thread = Some(thread);
                info!(
                    "Microphone capture started ({}Hz, {}ms frames)",
                    self.config.target_sample_rate, self.config.buffer_duration_ms
                );
                Ok(frame_rx)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => bail!("Capture thread exited before the microphone opened"),
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .context("Failed to join capture thread")?
                .map_err(|_| anyhow!("Capture thread panicked"))?;
            info!("Microphone capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

// ============================================================================
// Playback
// ============================================================================

type SampleQueue = Arc<Mutex<VecDeque<f32>>>;

/// Copy queued mono samples into an interleaved output buffer, padding with silence
fn fill_output<T: Copy>(data: &mut [T], channels: usize, queue: &SampleQueue, convert: impl Fn(f32) -> T) {
    let silence = convert(0.0);
    let Ok(mut queue) = queue.lock() else {
        data.fill(silence);
        return;
    };
    for frame in data.chunks_mut(channels.max(1)) {
        let value = queue.pop_front().map(&convert).unwrap_or(silence);
        frame.fill(value);
    }
}

fn open_output_stream(device_name: Option<&str>, queue: SampleQueue) -> Result<(cpal::Stream, u32)> {
    let device = output_device(device_name)?;
    let supported = device
        .default_output_config()
        .context("Failed to query speaker")?;
    let format = supported.sample_format();
    let stream_config: StreamConfig = supported.into();
    let device_rate = stream_config.sample_rate.0;
    let channels = usize::from(stream_config.channels.max(1));

    info!(
        "Speaker: {} ({:?}, {}Hz, {} channels)",
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        format,
        device_rate,
        channels
    );

    let err_fn = |err: cpal::StreamError| warn!("Playback stream error: {}", err);

    let stream = match format {
        SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                fill_output(data, channels, &queue, |s| s);
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &stream_config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                fill_output(data, channels, &queue, |s| (s.clamp(-1.0, 1.0) * 32_767.0) as i16);
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_output_stream(
            &stream_config,
            move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                fill_output(data, channels, &queue, |s| {
                    (s.clamp(-1.0, 1.0) * 32_767.0 + 32_768.0) as u16
                });
            },
            err_fn,
            None,
        ),
        other => bail!("Unsupported speaker sample format: {:?}", other),
    }
    .context("Failed to open speaker stream")?;

    stream.play().context("Failed to start speaker stream")?;
    Ok((stream, device_rate))
}

/// Empties the queue if a segment's `play` future is dropped before it drains
struct DrainGuard {
    queue: SampleQueue,
    armed: bool,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Ok(mut queue) = self.queue.lock() {
                queue.clear();
            }
        }
    }
}

/// Plays AI speech on an output device
pub struct SpeakerSink {
    device_rate: u32,
    queue: SampleQueue,
    stop: Option<std_mpsc::Sender<()>>,
    thread: Option<ThreadHandle<()>>,
}

impl SpeakerSink {
    pub async fn open(device_name: Option<String>) -> Result<Self> {
        let queue: SampleQueue = Arc::new(Mutex::new(VecDeque::new()));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<u32>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let stream_queue = Arc::clone(&queue);
        let thread = std::thread::Builder::new()
            .name("speaker".to_string())
            .spawn(move || {
                let stream = match open_output_stream(device_name.as_deref(), stream_queue) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Speaker stream released");
            })
            .context("Failed to spawn speaker thread")?;

        let device_rate = match ready_rx.await {
            Ok(result) => result?,
            Err(_) => bail!("Speaker thread exited before the device opened"),
        };

        Ok(Self {
            device_rate,
            queue,
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    fn queued(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl AudioSink for SpeakerSink {
    async fn play(&mut self, samples: &[f32], sample_rate: u32) -> Result<()> {
        let samples = resample_linear(samples, sample_rate, self.device_rate);
        let deadline = tokio::time::Instant::now()
            + segment_duration(samples.len(), self.device_rate)
            + DRAIN_SLACK;

        self.queue
            .lock()
            .map_err(|_| anyhow!("Speaker queue poisoned"))?
            .extend(samples);

        let mut guard = DrainGuard {
            queue: Arc::clone(&self.queue),
            armed: true,
        };

        let mut ticker = tokio::time::interval(DRAIN_POLL);
        while self.queued() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!("Speaker stopped draining; dropping {} samples", self.queued());
                break;
            }
            ticker.tick().await;
        }

        guard.armed = false;
        drop(guard);
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .context("Failed to join speaker thread")?
                .map_err(|_| anyhow!("Speaker thread panicked"))?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "speaker"
    }
}

impl Drop for SpeakerSink {
    fn drop(&mut self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }
}
