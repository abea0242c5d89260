use serde::de::DeserializeOwned;

/// A binary websocket payload after classification
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame<T> {
    /// JSON control message that arrived in a binary frame
    Control(T),
    /// Raw PCM16 audio
    Audio(Vec<u8>),
}

/// Classify a binary payload as a control message or audio.
///
/// Only payloads starting with `{` are tried as JSON; a failed parse means
/// the bytes are audio that happened to start with 0x7B.
pub fn classify_binary<T: DeserializeOwned>(bytes: &[u8]) -> InboundFrame<T> {
    if bytes.first() == Some(&b'{') {
        if let Ok(message) = serde_json::from_slice::<T>(bytes) {
            return InboundFrame::Control(message);
        }
    }
    InboundFrame::Audio(bytes.to_vec())
}
