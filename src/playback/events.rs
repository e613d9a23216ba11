//! Player-originated event vocabulary.
//!
//! Players report liveness and playback progress through these events rather
//! than commands: a heartbeat keeps the connection considered live, a state
//! change refreshes the now-playing snapshot, and the remaining events mark
//! lifecycle points of the embedded video player.

use serde_json::Value as JsonValue;

use super::commands::PlaybackError;

/// Wire names of the accepted player event types.
pub mod event_types {
    pub const HEARTBEAT: &str = "heartbeat";
    pub const STATE_CHANGE: &str = "stateChange";
    pub const VIDEO_ENDED: &str = "videoEnded";
    pub const PLAYER_READY: &str = "playerReady";
    pub const ERROR: &str = "error";
}

/// A validated player event.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Heartbeat,
    StateChange {
        position: Option<f64>,
        is_playing: Option<bool>,
    },
    VideoEnded,
    PlayerReady,
    PlayerError {
        message: String,
    },
}

impl PlayerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::Heartbeat => event_types::HEARTBEAT,
            PlayerEvent::StateChange { .. } => event_types::STATE_CHANGE,
            PlayerEvent::VideoEnded => event_types::VIDEO_ENDED,
            PlayerEvent::PlayerReady => event_types::PLAYER_READY,
            PlayerEvent::PlayerError { .. } => event_types::ERROR,
        }
    }

    /// Parses an event type name plus its loose data payload.
    pub fn parse(event_type: &str, data: &JsonValue) -> Result<Self, PlaybackError> {
        match event_type {
            event_types::HEARTBEAT => Ok(PlayerEvent::Heartbeat),
            event_types::STATE_CHANGE => Ok(PlayerEvent::StateChange {
                position: data.get("position").and_then(|v| v.as_f64()),
                is_playing: data.get("isPlaying").and_then(|v| v.as_bool()),
            }),
            event_types::VIDEO_ENDED => Ok(PlayerEvent::VideoEnded),
            event_types::PLAYER_READY => Ok(PlayerEvent::PlayerReady),
            event_types::ERROR => {
                let message = data
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown player error")
                    .to_string();
                Ok(PlayerEvent::PlayerError { message })
            }
            other => Err(PlaybackError::UnknownEvent(other.to_string())),
        }
    }
}
