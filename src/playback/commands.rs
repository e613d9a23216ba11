//! Playback command vocabulary and validation.
//!
//! Commands arrive as a name plus a loosely-typed JSON payload. Parsing
//! checks the command name first, then required fields, then ranges, and
//! produces a typed command or a distinct error kind per failure. Contextual
//! checks that need the venue (queue index bounds, permutation shape,
//! playlist ownership) happen in the transition layer, still before any
//! mutation is persisted.

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::venue_store::{RepeatMode, Track};

/// A validation or lookup failure while handling a playback command or
/// player event. No state is mutated when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("unknown player event type {0:?}")]
    UnknownEvent(String),
    #[error("{command} requires field '{field}'")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },
    #[error("{command} field '{field}' is invalid: {reason}")]
    InvalidField {
        command: &'static str,
        field: &'static str,
        reason: String,
    },
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("queue index {index} is out of bounds for queue of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("invalid reorder permutation: {0}")]
    InvalidPermutation(String),
    #[error("playlist {0} not found")]
    PlaylistNotFound(String),
    #[error("playlist {playlist_id} does not belong to venue {venue_id}")]
    PlaylistNotOwned {
        playlist_id: String,
        venue_id: String,
    },
}

impl PlaybackError {
    /// Whether the failure is a missing/unknown resource rather than a bad
    /// request.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlaybackError::PlaylistNotFound(_))
    }
}

/// A validated playback command.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Skip,
    Previous,
    Seek {
        time: f64,
    },
    /// `muted: None` toggles the current value.
    Mute {
        muted: Option<bool>,
    },
    Volume {
        volume: u8,
    },
    /// `enabled: None` toggles the current value.
    Shuffle {
        enabled: Option<bool>,
    },
    /// `mode: None` cycles off -> one -> all -> off.
    Repeat {
        mode: Option<RepeatMode>,
    },
    LoadPlaylist {
        playlist_id: String,
    },
    AddToQueue {
        track: Track,
        priority: bool,
        /// Explicit insert position (clamped to the queue length); appends
        /// when absent.
        position: Option<usize>,
    },
    RemoveFromQueue {
        index: usize,
        priority: bool,
    },
    ClearQueue {
        priority: bool,
    },
    ReorderQueue {
        order: Vec<usize>,
        priority: bool,
    },
}

impl PlaybackCommand {
    /// The wire name of this command, used for settings stamps and activity
    /// log entries.
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackCommand::Play => "play",
            PlaybackCommand::Pause => "pause",
            PlaybackCommand::Skip => "skip",
            PlaybackCommand::Previous => "previous",
            PlaybackCommand::Seek { .. } => "seek",
            PlaybackCommand::Mute { .. } => "mute",
            PlaybackCommand::Volume { .. } => "volume",
            PlaybackCommand::Shuffle { .. } => "shuffle",
            PlaybackCommand::Repeat { .. } => "repeat",
            PlaybackCommand::LoadPlaylist { .. } => "loadPlaylist",
            PlaybackCommand::AddToQueue { .. } => "addToQueue",
            PlaybackCommand::RemoveFromQueue { .. } => "removeFromQueue",
            PlaybackCommand::ClearQueue { .. } => "clearQueue",
            PlaybackCommand::ReorderQueue { .. } => "reorderQueue",
        }
    }

    /// Parses and validates a command name plus payload.
    pub fn parse(command: &str, payload: &JsonValue) -> Result<Self, PlaybackError> {
        match command {
            "play" => Ok(PlaybackCommand::Play),
            "pause" => Ok(PlaybackCommand::Pause),
            "skip" => Ok(PlaybackCommand::Skip),
            "previous" => Ok(PlaybackCommand::Previous),
            "seek" => {
                let time = require_number("seek", "time", payload)?;
                if time < 0.0 {
                    return Err(PlaybackError::OutOfRange {
                        field: "time",
                        value: time,
                        min: 0.0,
                        max: f64::INFINITY,
                    });
                }
                Ok(PlaybackCommand::Seek { time })
            }
            "mute" => Ok(PlaybackCommand::Mute {
                muted: optional_bool("mute", "muted", payload)?,
            }),
            "volume" => {
                let volume = require_number("volume", "volume", payload)?;
                if !(0.0..=100.0).contains(&volume) {
                    return Err(PlaybackError::OutOfRange {
                        field: "volume",
                        value: volume,
                        min: 0.0,
                        max: 100.0,
                    });
                }
                Ok(PlaybackCommand::Volume {
                    volume: volume.round() as u8,
                })
            }
            "shuffle" => Ok(PlaybackCommand::Shuffle {
                enabled: optional_bool("shuffle", "enabled", payload)?,
            }),
            "repeat" => {
                let mode = match payload.get("mode") {
                    None | Some(JsonValue::Null) => None,
                    Some(JsonValue::String(s)) => {
                        Some(RepeatMode::parse(s).ok_or_else(|| PlaybackError::InvalidField {
                            command: "repeat",
                            field: "mode",
                            reason: format!("expected one of off/one/all, got {:?}", s),
                        })?)
                    }
                    Some(other) => {
                        return Err(PlaybackError::InvalidField {
                            command: "repeat",
                            field: "mode",
                            reason: format!("expected a string, got {}", json_kind(other)),
                        })
                    }
                };
                Ok(PlaybackCommand::Repeat { mode })
            }
            "loadPlaylist" => {
                let playlist_id = require_string("loadPlaylist", "playlistId", payload)?;
                Ok(PlaybackCommand::LoadPlaylist { playlist_id })
            }
            "addToQueue" => {
                let track_value = payload.get("track").ok_or(PlaybackError::MissingField {
                    command: "addToQueue",
                    field: "track",
                })?;
                let track: Track = serde_json::from_value(track_value.clone()).map_err(|e| {
                    PlaybackError::InvalidField {
                        command: "addToQueue",
                        field: "track",
                        reason: e.to_string(),
                    }
                })?;
                Ok(PlaybackCommand::AddToQueue {
                    track,
                    priority: optional_bool("addToQueue", "priority", payload)?.unwrap_or(false),
                    position: optional_index("addToQueue", "position", payload)?,
                })
            }
            "removeFromQueue" => {
                let index = require_index("removeFromQueue", "index", payload)?;
                Ok(PlaybackCommand::RemoveFromQueue {
                    index,
                    priority: optional_bool("removeFromQueue", "priority", payload)?.unwrap_or(false),
                })
            }
            "clearQueue" => Ok(PlaybackCommand::ClearQueue {
                priority: optional_bool("clearQueue", "priority", payload)?.unwrap_or(false),
            }),
            "reorderQueue" => {
                let order_value = payload.get("order").ok_or(PlaybackError::MissingField {
                    command: "reorderQueue",
                    field: "order",
                })?;
                let order: Vec<usize> =
                    serde_json::from_value(order_value.clone()).map_err(|e| {
                        PlaybackError::InvalidField {
                            command: "reorderQueue",
                            field: "order",
                            reason: e.to_string(),
                        }
                    })?;
                Ok(PlaybackCommand::ReorderQueue {
                    order,
                    priority: optional_bool("reorderQueue", "priority", payload)?.unwrap_or(false),
                })
            }
            other => Err(PlaybackError::UnknownCommand(other.to_string())),
        }
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

fn require_number(
    command: &'static str,
    field: &'static str,
    payload: &JsonValue,
) -> Result<f64, PlaybackError> {
    match payload.get(field) {
        None | Some(JsonValue::Null) => Err(PlaybackError::MissingField { command, field }),
        Some(value) => value.as_f64().ok_or_else(|| PlaybackError::InvalidField {
            command,
            field,
            reason: format!("expected a number, got {}", json_kind(value)),
        }),
    }
}

fn require_string(
    command: &'static str,
    field: &'static str,
    payload: &JsonValue,
) -> Result<String, PlaybackError> {
    match payload.get(field) {
        None | Some(JsonValue::Null) => Err(PlaybackError::MissingField { command, field }),
        Some(value) => value
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| PlaybackError::InvalidField {
                command,
                field,
                reason: format!("expected a string, got {}", json_kind(value)),
            }),
    }
}

fn require_index(
    command: &'static str,
    field: &'static str,
    payload: &JsonValue,
) -> Result<usize, PlaybackError> {
    match payload.get(field) {
        None | Some(JsonValue::Null) => Err(PlaybackError::MissingField { command, field }),
        Some(value) => value
            .as_u64()
            .map(|v| v as usize)
            .ok_or_else(|| PlaybackError::InvalidField {
                command,
                field,
                reason: format!("expected a non-negative integer, got {}", value),
            }),
    }
}

fn optional_index(
    command: &'static str,
    field: &'static str,
    payload: &JsonValue,
) -> Result<Option<usize>, PlaybackError> {
    match payload.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(_) => require_index(command, field, payload).map(Some),
    }
}

fn optional_bool(
    command: &'static str,
    field: &'static str,
    payload: &JsonValue,
) -> Result<Option<bool>, PlaybackError> {
    match payload.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| PlaybackError::InvalidField {
                command,
                field,
                reason: format!("expected a boolean, got {}", json_kind(value)),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_commands_parse_without_payload() {
        for name in ["play", "pause", "skip", "previous"] {
            PlaybackCommand::parse(name, &json!({})).unwrap();
        }
    }

    #[test]
    fn unknown_command_is_rejected() {
        let err = PlaybackCommand::parse("explode", &json!({})).unwrap_err();
        assert_eq!(err, PlaybackError::UnknownCommand("explode".to_string()));
    }

    #[test]
    fn seek_requires_non_negative_time() {
        let cmd = PlaybackCommand::parse("seek", &json!({ "time": 42.5 })).unwrap();
        assert_eq!(cmd, PlaybackCommand::Seek { time: 42.5 });

        let err = PlaybackCommand::parse("seek", &json!({})).unwrap_err();
        assert!(matches!(err, PlaybackError::MissingField { field: "time", .. }));

        let err = PlaybackCommand::parse("seek", &json!({ "time": -1.0 })).unwrap_err();
        assert!(matches!(err, PlaybackError::OutOfRange { field: "time", .. }));
    }

    #[test]
    fn volume_range_is_enforced() {
        let cmd = PlaybackCommand::parse("volume", &json!({ "volume": 100 })).unwrap();
        assert_eq!(cmd, PlaybackCommand::Volume { volume: 100 });

        let err = PlaybackCommand::parse("volume", &json!({ "volume": 150 })).unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::OutOfRange {
                field: "volume",
                value,
                ..
            } if value == 150.0
        ));

        let err = PlaybackCommand::parse("volume", &json!({})).unwrap_err();
        assert!(matches!(err, PlaybackError::MissingField { field: "volume", .. }));
    }

    #[test]
    fn mute_and_shuffle_default_to_toggle() {
        assert_eq!(
            PlaybackCommand::parse("mute", &json!({})).unwrap(),
            PlaybackCommand::Mute { muted: None }
        );
        assert_eq!(
            PlaybackCommand::parse("mute", &json!({ "muted": true })).unwrap(),
            PlaybackCommand::Mute { muted: Some(true) }
        );
        assert_eq!(
            PlaybackCommand::parse("shuffle", &json!({})).unwrap(),
            PlaybackCommand::Shuffle { enabled: None }
        );
        let err = PlaybackCommand::parse("shuffle", &json!({ "enabled": "yes" })).unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidField { field: "enabled", .. }));
    }

    #[test]
    fn repeat_accepts_explicit_mode_or_cycles() {
        assert_eq!(
            PlaybackCommand::parse("repeat", &json!({ "mode": "all" })).unwrap(),
            PlaybackCommand::Repeat {
                mode: Some(RepeatMode::All)
            }
        );
        assert_eq!(
            PlaybackCommand::parse("repeat", &json!({})).unwrap(),
            PlaybackCommand::Repeat { mode: None }
        );
        let err = PlaybackCommand::parse("repeat", &json!({ "mode": "banana" })).unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidField { field: "mode", .. }));
    }

    #[test]
    fn load_playlist_requires_id() {
        let cmd =
            PlaybackCommand::parse("loadPlaylist", &json!({ "playlistId": "pl-9" })).unwrap();
        assert_eq!(
            cmd,
            PlaybackCommand::LoadPlaylist {
                playlist_id: "pl-9".to_string()
            }
        );

        let err = PlaybackCommand::parse("loadPlaylist", &json!({})).unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::MissingField {
                field: "playlistId",
                ..
            }
        ));
    }

    #[test]
    fn add_to_queue_parses_track_and_flags() {
        let payload = json!({
            "track": {
                "video_id": "abc",
                "title": "Song",
                "channel": "Artist",
                "duration": 180.0
            },
            "priority": true
        });
        let cmd = PlaybackCommand::parse("addToQueue", &payload).unwrap();
        match cmd {
            PlaybackCommand::AddToQueue {
                track,
                priority,
                position,
            } => {
                assert_eq!(track.video_id, "abc");
                assert!(priority);
                assert_eq!(position, None);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let err = PlaybackCommand::parse("addToQueue", &json!({})).unwrap_err();
        assert!(matches!(err, PlaybackError::MissingField { field: "track", .. }));

        let err =
            PlaybackCommand::parse("addToQueue", &json!({ "track": { "title": "x" } }))
                .unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidField { field: "track", .. }));
    }

    #[test]
    fn remove_from_queue_distinguishes_missing_and_invalid_index() {
        let cmd = PlaybackCommand::parse("removeFromQueue", &json!({ "index": 0 })).unwrap();
        assert_eq!(
            cmd,
            PlaybackCommand::RemoveFromQueue {
                index: 0,
                priority: false
            }
        );

        let err = PlaybackCommand::parse("removeFromQueue", &json!({})).unwrap_err();
        assert!(matches!(err, PlaybackError::MissingField { field: "index", .. }));

        let err =
            PlaybackCommand::parse("removeFromQueue", &json!({ "index": -2 })).unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidField { field: "index", .. }));
    }

    #[test]
    fn reorder_requires_order_array() {
        let cmd = PlaybackCommand::parse("reorderQueue", &json!({ "order": [2, 0, 1] })).unwrap();
        assert_eq!(
            cmd,
            PlaybackCommand::ReorderQueue {
                order: vec![2, 0, 1],
                priority: false
            }
        );

        let err = PlaybackCommand::parse("reorderQueue", &json!({})).unwrap_err();
        assert!(matches!(err, PlaybackError::MissingField { field: "order", .. }));
    }
}
