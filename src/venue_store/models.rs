//! Data model for venue playback state.
//!
//! A venue is the root aggregate: one jukebox instance with its playback
//! status, the currently playing track snapshot, a user-requested priority
//! queue and a playlist-sourced background queue. Nested structures are
//! stored as JSON text columns and decoded to these types at the store
//! boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// =============================================================================
// Playback state
// =============================================================================

/// Playback status of a venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Ready,
    Playing,
    Paused,
}

impl PlaybackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Ready => "ready",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(PlaybackStatus::Idle),
            "ready" => Some(PlaybackStatus::Ready),
            "playing" => Some(PlaybackStatus::Playing),
            "paused" => Some(PlaybackStatus::Paused),
            _ => None,
        }
    }
}

/// Repeat mode for playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl RepeatMode {
    /// The next mode in the off -> one -> all -> off cycle.
    pub fn cycled(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::One,
            RepeatMode::One => RepeatMode::All,
            RepeatMode::All => RepeatMode::Off,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(RepeatMode::Off),
            "one" => Some(RepeatMode::One),
            "all" => Some(RepeatMode::All),
            _ => None,
        }
    }
}

/// A queueable track. Position in a queue is implicit by array index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub video_id: String,
    pub title: String,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub duration: f64,
}

/// Snapshot of the currently playing track.
///
/// The empty sentinel (all track fields absent, `is_playing` false) stands
/// for "nothing playing" and is what advancement writes when both queues
/// are drained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NowPlaying {
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub current_time: f64,
    pub is_playing: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl NowPlaying {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_track(track: &Track, now: DateTime<Utc>) -> Self {
        Self {
            video_id: Some(track.video_id.clone()),
            title: Some(track.title.clone()),
            channel: Some(track.channel.clone()),
            thumbnail: track.thumbnail.clone(),
            duration: Some(track.duration),
            current_time: 0.0,
            is_playing: true,
            last_updated: Some(now),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.video_id.is_none()
    }
}

/// Player settings for a venue.
///
/// Each settings command mutates only the fields it names; the whole record
/// is still persisted as one JSON value inside the venue document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSettings {
    pub repeat_mode: RepeatMode,
    pub shuffle_enabled: bool,
    pub shuffle_seed: Option<u64>,
    pub crossfade_seconds: u8,
    /// Master volume, 0-100.
    pub volume: u8,
    pub muted: bool,
    pub player_ready: bool,
    pub last_command: Option<String>,
    pub command_timestamp: Option<DateTime<Utc>>,
    pub last_ready_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub error_timestamp: Option<DateTime<Utc>>,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            repeat_mode: RepeatMode::Off,
            shuffle_enabled: false,
            shuffle_seed: None,
            crossfade_seconds: 3,
            volume: 80,
            muted: false,
            player_ready: false,
            last_command: None,
            command_timestamp: None,
            last_ready_at: None,
            last_error: None,
            error_timestamp: None,
        }
    }
}

/// An event scheduled against a venue, executed by the maintenance sweep
/// once its `scheduled_at` time has passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub change: ScheduledChange,
    pub scheduled_at: DateTime<Utc>,
    pub processed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ScheduledChange {
    PlaylistChange { playlist_id: String },
    ContentUpdate { items: JsonValue },
}

// =============================================================================
// Venue
// =============================================================================

/// The root aggregate: one tenant's playback context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub venue_id: String,
    pub owner_id: String,
    pub state: PlaybackStatus,
    pub now_playing: NowPlaying,
    /// Playlist-sourced background queue, consumed only when the priority
    /// queue is empty.
    pub active_queue: Vec<Track>,
    /// User-requested tracks, always consumed first.
    pub priority_queue: Vec<Track>,
    pub current_track_index: i64,
    pub player_settings: PlayerSettings,
    pub is_shuffled: bool,
    pub active_player_instance_id: Option<String>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_command_at: Option<DateTime<Utc>>,
    pub last_queue_update: Option<DateTime<Utc>>,
    /// Maintained exclusively by the liveness audit.
    pub player_connected: bool,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub reconnected_at: Option<DateTime<Utc>>,
    pub scheduled_events: Vec<ScheduledEvent>,
    pub created_at: DateTime<Utc>,
}

impl Venue {
    /// A fresh venue document with default settings and empty queues.
    pub fn new(venue_id: String, owner_id: String, created_at: DateTime<Utc>) -> Self {
        Self {
            venue_id,
            owner_id,
            state: PlaybackStatus::Idle,
            now_playing: NowPlaying::empty(),
            active_queue: Vec::new(),
            priority_queue: Vec::new(),
            current_track_index: -1,
            player_settings: PlayerSettings::default(),
            is_shuffled: false,
            active_player_instance_id: None,
            last_heartbeat_at: None,
            last_updated: None,
            last_command_at: None,
            last_queue_update: None,
            player_connected: false,
            disconnected_at: None,
            reconnected_at: None,
            scheduled_events: Vec::new(),
            created_at,
        }
    }
}

/// The raw JSON text of a venue's encoded columns, for integrity checking.
#[derive(Debug, Clone)]
pub struct RawVenueFields {
    pub venue_id: String,
    pub now_playing: Option<String>,
    pub active_queue: String,
    pub priority_queue: String,
    pub player_settings: String,
}

// =============================================================================
// Player instances
// =============================================================================

/// One connected playback surface bound to a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInstance {
    pub instance_id: String,
    pub venue_id: String,
    pub is_connected: bool,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub heartbeat_count: i64,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PlayerInstance {
    /// A new instance created on first heartbeat.
    pub fn connected(instance_id: String, venue_id: String, now: DateTime<Utc>) -> Self {
        Self {
            instance_id,
            venue_id,
            is_connected: true,
            last_heartbeat_at: Some(now),
            heartbeat_count: 1,
            disconnected_at: None,
            created_at: now,
        }
    }
}

// =============================================================================
// Activity log
// =============================================================================

/// An immutable audit record of a state-changing event.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityLogEntry {
    pub id: i64,
    pub event_type: String,
    pub venue_id: String,
    pub user_id: Option<String>,
    pub payload: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// A log entry waiting to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivityEntry {
    pub event_type: String,
    pub venue_id: String,
    pub user_id: Option<String>,
    pub payload: JsonValue,
}

impl NewActivityEntry {
    pub fn new(event_type: &str, venue_id: &str, payload: JsonValue) -> Self {
        Self {
            event_type: event_type.to_string(),
            venue_id: venue_id.to_string(),
            user_id: None,
            payload,
        }
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }
}

// =============================================================================
// Playlists and gallery (external collaborators, contract-level only)
// =============================================================================

/// A playlist owned by a venue. Only the read side is modeled here; playlist
/// editing happens in another system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub playlist_id: String,
    pub venue_id: String,
    pub name: String,
    pub tracks: Vec<Track>,
}

/// Venue reference of a playlist, for orphan detection.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistRef {
    pub playlist_id: String,
    pub venue_id: String,
}

/// A content gallery item, modeled only as far as retention cleanup needs.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryItem {
    pub item_id: String,
    pub venue_id: String,
    pub active: bool,
    pub last_used_at: DateTime<Utc>,
}

// =============================================================================
// Job bookkeeping
// =============================================================================

/// Status of a background job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunStatus {
    Running,
    Completed,
    Failed,
}

impl JobRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRunStatus::Running => "running",
            JobRunStatus::Completed => "completed",
            JobRunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(JobRunStatus::Running),
            "completed" => Some(JobRunStatus::Completed),
            "failed" => Some(JobRunStatus::Failed),
            _ => None,
        }
    }
}

/// One recorded execution of a background job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub id: i64,
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: JobRunStatus,
    pub error_message: Option<String>,
    pub triggered_by: String,
}

/// Persisted next-run bookkeeping for interval-scheduled jobs.
#[derive(Debug, Clone)]
pub struct JobScheduleState {
    pub job_id: String,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Kind of job audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAuditEventType {
    Started,
    Completed,
    Failed,
}

impl JobAuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobAuditEventType::Started => "started",
            JobAuditEventType::Completed => "completed",
            JobAuditEventType::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_mode_cycles_through_all_modes() {
        assert_eq!(RepeatMode::Off.cycled(), RepeatMode::One);
        assert_eq!(RepeatMode::One.cycled(), RepeatMode::All);
        assert_eq!(RepeatMode::All.cycled(), RepeatMode::Off);
    }

    #[test]
    fn playback_status_roundtrips_through_text() {
        for status in [
            PlaybackStatus::Idle,
            PlaybackStatus::Ready,
            PlaybackStatus::Playing,
            PlaybackStatus::Paused,
        ] {
            assert_eq!(PlaybackStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PlaybackStatus::parse("bogus"), None);
    }

    #[test]
    fn empty_now_playing_is_sentinel() {
        let empty = NowPlaying::empty();
        assert!(empty.is_empty());
        assert!(!empty.is_playing);
        assert_eq!(empty.current_time, 0.0);
    }

    #[test]
    fn now_playing_from_track_starts_at_zero_and_playing() {
        let track = Track {
            video_id: "v1".to_string(),
            title: "Song".to_string(),
            channel: "Artist".to_string(),
            thumbnail: None,
            duration: 180.0,
        };
        let np = NowPlaying::from_track(&track, Utc::now());
        assert!(!np.is_empty());
        assert!(np.is_playing);
        assert_eq!(np.current_time, 0.0);
        assert_eq!(np.video_id.as_deref(), Some("v1"));
    }

    #[test]
    fn scheduled_change_serializes_tagged() {
        let change = ScheduledChange::PlaylistChange {
            playlist_id: "pl-1".to_string(),
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["type"], "playlist_change");
        assert_eq!(json["payload"]["playlist_id"], "pl-1");
    }

    #[test]
    fn new_venue_starts_idle_with_empty_queues() {
        let venue = Venue::new("venue-1".to_string(), "owner-1".to_string(), Utc::now());
        assert_eq!(venue.state, PlaybackStatus::Idle);
        assert!(venue.now_playing.is_empty());
        assert!(venue.active_queue.is_empty());
        assert!(venue.priority_queue.is_empty());
        assert_eq!(venue.current_track_index, -1);
        assert!(!venue.player_connected);
    }
}
