use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Messages sent by the stage renderer to the control surface.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum StageMessage {
    Join {
        stage_id: String,
    },
    /// Clock handshake probe; `t0_ms` is the stage's wall clock at send.
    TimeRequest {
        t0_ms: f64,
        seq: u8,
    },
    /// Play-head report, sent at most ~30 times per second and skipped
    /// while paused.
    Status {
        duration: f64,
        position: f64,
        sent_at_ms: f64,
    },
    /// Playback state flips originating on the stage (media session keys,
    /// end-of-stream pause).
    PlaybackState {
        position: f64,
        playing: bool,
    },
    /// Link health measured from the handshake burst.
    Telemetry {
        offset_ms: f64,
        rtt_ms: f64,
    },
    Ended,
}

/// Messages sent by the control surface to the stage renderer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Handshake reply: `system_time` is the control clock in seconds,
    /// `sent_at_ms` its wall clock at transmit.
    TimeResponse {
        t0_ms: f64,
        received_at_ms: f64,
        system_time: f64,
        sent_at_ms: f64,
        seq: u8,
    },
    Play,
    Pause,
    /// Re-base the stage play-head. The stage compensates for transit
    /// using `sent_at_ms`.
    Seek {
        position: f64,
        sent_at_ms: f64,
    },
    Volume {
        level: f64,
    },
    SessionClosed,
}

/// Operator commands accepted over the control surface's REST endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Play,
    Pause,
    Seek { position: f64 },
    Volume { level: f64 },
    /// Close the presentation: tears the session down on both sides.
    Close,
}

/// Decoding failures on either link. Malformed frames are reported, never
/// silently misread.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed binary frame: {0}")]
    Binary(#[from] bincode::Error),
    #[error("malformed text frame: {0}")]
    Text(#[from] serde_json::Error),
}

/// Binary wire encoding for the stage link.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(bincode::serialize(msg)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Text encoding for the dashboard/REST path.
pub fn encode_text<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}

pub fn decode_text<T: DeserializeOwned>(text: &str) -> Result<T, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}
