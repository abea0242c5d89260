// PCM16 <-> float conversion for capture and playback
//
// Capture produces float samples in [-1, 1] which go over the wire as
// little-endian 16-bit PCM. Playback receives PCM16 bytes and turns them
// back into floats. Positive samples scale by 0x7FFF, negative by 0x8000,
// and decoding always divides by 32768.

/// Convert float samples to 16-bit PCM, clamping to [-1, 1] first.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let s = sample.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 32768.0) as i16
            } else {
                (s * 32767.0) as i16
            }
        })
        .collect()
}

/// Convert 16-bit PCM samples to floats by dividing by 32768.
pub fn pcm16_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Serialize PCM16 samples as little-endian bytes.
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Parse little-endian PCM16 bytes. A trailing odd byte is ignored.
pub fn bytes_to_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Encode a captured float frame straight to wire bytes.
pub fn encode_frame(samples: &[f32]) -> Vec<u8> {
    pcm16_to_bytes(&float_to_pcm16(samples))
}

/// Decode wire bytes straight to float samples for playback.
pub fn decode_frame(bytes: &[u8]) -> Vec<f32> {
    pcm16_to_float(&bytes_to_pcm16(bytes))
}
