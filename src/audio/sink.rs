use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::codec;
use super::device::SpeakerSink;

/// Destination for decoded AI speech
///
/// `play` resolves when the segment has finished playing. Dropping the
/// future early is how playback gets cut off on barge-in.
#[async_trait]
pub trait AudioSink: Send {
    async fn play(&mut self, samples: &[f32], sample_rate: u32) -> Result<()>;

    /// Flush anything buffered; called once when the session ends
    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}

pub(crate) fn segment_duration(samples: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(samples as u64 * 1_000_000 / sample_rate as u64)
}

/// Where the client sends AI speech
#[derive(Debug, Clone)]
pub enum AudioOutput {
    /// Output device; `None` picks the host default
    Speaker(Option<String>),
    /// Record to a WAV file, paced like a speaker
    Wav(PathBuf),
    /// Paced and discarded
    Discard,
}

impl AudioOutput {
    pub async fn open(&self, sample_rate: u32) -> Result<Box<dyn AudioSink>> {
        match self {
            AudioOutput::Speaker(device) => Ok(Box::new(SpeakerSink::open(device.clone()).await?)),
            AudioOutput::Wav(path) => Ok(Box::new(
                WavSink::create(path, sample_rate, true).context("Failed to open output WAV")?,
            )),
            AudioOutput::Discard => Ok(Box::new(PacedSink)),
        }
    }
}

/// Sink that takes as long as the audio would, then discards it
#[derive(Debug, Default)]
pub struct PacedSink;

#[async_trait]
impl AudioSink for PacedSink {
    async fn play(&mut self, samples: &[f32], sample_rate: u32) -> Result<()> {
        tokio::time::sleep(segment_duration(samples.len(), sample_rate)).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "paced"
    }
}

/// Records AI speech to a mono 16-bit WAV file
pub struct WavSink {
    path: PathBuf,
    sample_rate: u32,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    /// Wait out each segment's duration so barge-in timing matches a speaker
    paced: bool,
    samples_written: usize,
}

impl WavSink {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32, paced: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        info!("Recording AI speech to {}", path.display());

        Ok(Self {
            path,
            sample_rate,
            writer: Some(writer),
            paced,
            samples_written: 0,
        })
    }

    pub fn samples_written(&self) -> usize {
        self.samples_written
    }
}

#[async_trait]
impl AudioSink for WavSink {
    async fn play(&mut self, samples: &[f32], sample_rate: u32) -> Result<()> {
        if sample_rate != self.sample_rate {
            warn!(
                "Segment sample rate {} differs from WAV sink rate {}",
                sample_rate, self.sample_rate
            );
        }

        if let Some(writer) = &mut self.writer {
            for sample in codec::float_to_pcm16(samples) {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            self.samples_written += samples.len();
        }

        if self.paced {
            tokio::time::sleep(segment_duration(samples.len(), sample_rate)).await;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
            info!(
                "AI speech saved: {} ({} samples)",
                self.path.display(),
                self.samples_written
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "wav"
    }
}

impl Drop for WavSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
