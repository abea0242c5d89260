use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use tracing::info;

use super::codec;

/// A WAV file loaded into memory as interleaved PCM16
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) => reader
                .into_samples::<i16>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            (SampleFormat::Float, 32) => {
                let floats = reader
                    .into_samples::<f32>()
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?;
                codec::float_to_pcm16(&floats)
            }
            (format, bits) => bail!("Unsupported WAV format: {:?} {}-bit", format, bits),
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Mono float samples at `target_rate`, ready to be framed like microphone input
    pub fn to_mono_float(&self, target_rate: u32) -> Result<Vec<f32>> {
        if self.channels == 0 {
            bail!("Audio file {} has no channels", self.path);
        }

        let mono: Vec<i16> = if self.channels == 1 {
            self.samples.clone()
        } else {
            self.samples
                .chunks_exact(self.channels as usize)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / self.channels as i32) as i16
                })
                .collect()
        };

        let floats = codec::pcm16_to_float(&mono);
        Ok(resample_linear(&floats, self.sample_rate, target_rate))
    }
}

/// Linear-interpolation resampler; good enough for speech fed to a recognizer
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(last)];
            let b = samples[(idx + 1).min(last)];
            a + (b - a) * frac
        })
        .collect()
}
