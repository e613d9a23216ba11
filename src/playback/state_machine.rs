//! The authoritative venue transition function.
//!
//! Given the current venue document and a validated command or player
//! event, this produces the next document plus one activity-log entry.
//! Nothing here touches the store: callers persist the returned venue as a
//! single document write and append the activity entry afterwards, so
//! concurrent readers never observe a half-applied transition.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::venue_store::{
    NewActivityEntry, NowPlaying, PlaybackStatus, Playlist, Venue,
};

use super::commands::{PlaybackCommand, PlaybackError};
use super::events::PlayerEvent;
use super::queue;

/// The result of one transition: the next venue document and the audit
/// entry describing what happened.
#[derive(Debug, Clone)]
pub struct Transition {
    pub venue: Venue,
    pub activity: NewActivityEntry,
}

/// Applies a playback command to a venue.
///
/// `playlist` carries the pre-fetched playlist for `loadPlaylist` (None when
/// the lookup found nothing). Returns an error without producing a
/// transition on any validation failure, so rejection is all-or-nothing.
pub fn apply_command(
    venue: &Venue,
    command: &PlaybackCommand,
    playlist: Option<&Playlist>,
    user_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Transition, PlaybackError> {
    let mut next = venue.clone();
    next.last_command_at = Some(now);
    next.last_updated = Some(now);

    let mut detail = json!({});

    match command {
        PlaybackCommand::Play => {
            next.state = PlaybackStatus::Playing;
            next.now_playing.is_playing = true;
            next.now_playing.last_updated = Some(now);
        }
        PlaybackCommand::Pause => {
            next.state = PlaybackStatus::Paused;
            next.now_playing.is_playing = false;
            next.now_playing.last_updated = Some(now);
        }
        PlaybackCommand::Skip => {
            detail = advance_now_playing(&mut next, now);
            next.last_queue_update = Some(now);
        }
        PlaybackCommand::Previous => {
            // No queue history is kept; previous restarts the current track
            next.now_playing.current_time = 0.0;
            next.now_playing.last_updated = Some(now);
        }
        PlaybackCommand::Seek { time } => {
            next.now_playing.current_time = *time;
            next.now_playing.last_updated = Some(now);
            detail = json!({ "time": time });
        }
        PlaybackCommand::Mute { muted } => {
            let muted = muted.unwrap_or(!next.player_settings.muted);
            next.player_settings.muted = muted;
            stamp_settings(&mut next, command, now);
            detail = json!({ "muted": muted });
        }
        PlaybackCommand::Volume { volume } => {
            next.player_settings.volume = *volume;
            stamp_settings(&mut next, command, now);
            detail = json!({ "volume": volume });
        }
        PlaybackCommand::Shuffle { enabled } => {
            let enabled = enabled.unwrap_or(!next.player_settings.shuffle_enabled);
            if enabled && !next.player_settings.shuffle_enabled {
                next.player_settings.shuffle_seed = Some(rand::random());
            } else if !enabled {
                next.player_settings.shuffle_seed = None;
            }
            next.player_settings.shuffle_enabled = enabled;
            next.is_shuffled = enabled;
            stamp_settings(&mut next, command, now);
            detail = json!({ "enabled": enabled });
        }
        PlaybackCommand::Repeat { mode } => {
            let mode = mode.unwrap_or_else(|| next.player_settings.repeat_mode.cycled());
            next.player_settings.repeat_mode = mode;
            stamp_settings(&mut next, command, now);
            detail = json!({ "mode": mode });
        }
        PlaybackCommand::LoadPlaylist { playlist_id } => {
            let playlist = playlist
                .ok_or_else(|| PlaybackError::PlaylistNotFound(playlist_id.clone()))?;
            if playlist.venue_id != venue.venue_id {
                return Err(PlaybackError::PlaylistNotOwned {
                    playlist_id: playlist.playlist_id.clone(),
                    venue_id: venue.venue_id.clone(),
                });
            }
            queue::load_playlist(&mut next, playlist);
            if next.state == PlaybackStatus::Idle && !next.active_queue.is_empty() {
                next.state = PlaybackStatus::Ready;
            }
            next.last_queue_update = Some(now);
            detail = json!({
                "playlist_id": playlist.playlist_id,
                "track_count": playlist.tracks.len(),
            });
        }
        PlaybackCommand::AddToQueue {
            track,
            priority,
            position,
        } => {
            queue::add_to_queue(&mut next, track.clone(), *priority, *position);
            next.last_queue_update = Some(now);
            detail = json!({ "video_id": track.video_id, "priority": priority });
        }
        PlaybackCommand::RemoveFromQueue { index, priority } => {
            let removed = queue::remove_from_queue(&mut next, *index, *priority)?;
            next.last_queue_update = Some(now);
            detail = json!({
                "video_id": removed.video_id,
                "index": index,
                "priority": priority,
            });
        }
        PlaybackCommand::ClearQueue { priority } => {
            let dropped = queue::clear_queue(&mut next, *priority);
            next.last_queue_update = Some(now);
            detail = json!({ "dropped": dropped, "priority": priority });
        }
        PlaybackCommand::ReorderQueue { order, priority } => {
            queue::reorder(&mut next, order, *priority)?;
            next.last_queue_update = Some(now);
            detail = json!({ "length": order.len(), "priority": priority });
        }
    }

    let activity = NewActivityEntry::new(
        "command_issued",
        &venue.venue_id,
        json!({
            "command": command.name(),
            "state": next.state,
            "detail": detail,
        }),
    )
    .with_user(user_id.map(|s| s.to_string()));

    Ok(Transition {
        venue: next,
        activity,
    })
}

/// Applies a player-originated event to a venue.
///
/// `instance_id` is the reporting player instance, if the event named one;
/// a heartbeat binds it as the venue's active instance. Player events carry
/// no user input that could fail validation, so this is infallible.
pub fn apply_player_event(
    venue: &Venue,
    event: &PlayerEvent,
    instance_id: Option<&str>,
    now: DateTime<Utc>,
) -> Transition {
    let mut next = venue.clone();
    next.last_updated = Some(now);

    let mut detail = json!({});

    match event {
        PlayerEvent::Heartbeat => {
            next.last_heartbeat_at = Some(now);
            if let Some(id) = instance_id {
                next.active_player_instance_id = Some(id.to_string());
            }
        }
        PlayerEvent::StateChange {
            position,
            is_playing,
        } => {
            if let Some(position) = position {
                next.now_playing.current_time = *position;
            }
            if let Some(is_playing) = is_playing {
                next.now_playing.is_playing = *is_playing;
            }
            next.now_playing.last_updated = Some(now);
            detail = json!({ "position": position, "is_playing": is_playing });
        }
        PlayerEvent::VideoEnded => {
            detail = advance_now_playing(&mut next, now);
            next.last_queue_update = Some(now);
        }
        PlayerEvent::PlayerReady => {
            next.player_settings.player_ready = true;
            next.player_settings.last_ready_at = Some(now);
        }
        PlayerEvent::PlayerError { message } => {
            // Advisory only: playback state is left for the client to
            // explicitly pause or stop
            next.player_settings.player_ready = false;
            next.player_settings.last_error = Some(message.clone());
            next.player_settings.error_timestamp = Some(now);
            detail = json!({ "message": message });
        }
    }

    let activity = NewActivityEntry::new(
        "player_event",
        &venue.venue_id,
        json!({
            "event_type": event.name(),
            "instance_id": instance_id,
            "detail": detail,
        }),
    );

    Transition {
        venue: next,
        activity,
    }
}

/// Advances the queues into `now_playing`: next track starts playing from
/// zero, or the empty sentinel plus idle state when both queues are drained.
fn advance_now_playing(next: &mut Venue, now: DateTime<Utc>) -> serde_json::Value {
    match queue::advance(next) {
        Some((track, source)) => {
            next.now_playing = NowPlaying::from_track(&track, now);
            next.state = PlaybackStatus::Playing;
            json!({ "advanced_to": track.video_id, "source": source.as_str() })
        }
        None => {
            next.now_playing = NowPlaying::empty();
            next.state = PlaybackStatus::Idle;
            json!({ "advanced_to": null })
        }
    }
}

fn stamp_settings(next: &mut Venue, command: &PlaybackCommand, now: DateTime<Utc>) {
    next.player_settings.last_command = Some(command.name().to_string());
    next.player_settings.command_timestamp = Some(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue_store::{RepeatMode, Track};

    fn make_track(id: &str) -> Track {
        Track {
            video_id: id.to_string(),
            title: format!("Title {}", id),
            channel: "Channel".to_string(),
            thumbnail: None,
            duration: 100.0,
        }
    }

    fn make_venue(priority: &[&str], active: &[&str]) -> Venue {
        let mut venue = Venue::new("v1".to_string(), "owner".to_string(), Utc::now());
        venue.priority_queue = priority.iter().map(|id| make_track(id)).collect();
        venue.active_queue = active.iter().map(|id| make_track(id)).collect();
        venue
    }

    fn apply(venue: &Venue, command: PlaybackCommand) -> Transition {
        apply_command(venue, &command, None, None, Utc::now()).unwrap()
    }

    #[test]
    fn play_sets_playing_state() {
        let venue = make_venue(&[], &[]);
        let t = apply(&venue, PlaybackCommand::Play);
        assert_eq!(t.venue.state, PlaybackStatus::Playing);
        assert!(t.venue.now_playing.is_playing);
        assert!(t.venue.last_command_at.is_some());
        assert_eq!(t.activity.event_type, "command_issued");
    }

    #[test]
    fn pause_is_idempotent() {
        let venue = make_venue(&[], &[]);
        let once = apply(&venue, PlaybackCommand::Pause).venue;
        let twice = apply(&once, PlaybackCommand::Pause).venue;

        assert_eq!(once.state, PlaybackStatus::Paused);
        assert_eq!(twice.state, PlaybackStatus::Paused);
        assert!(!twice.now_playing.is_playing);
        assert_eq!(once.active_queue, twice.active_queue);
        assert_eq!(once.priority_queue, twice.priority_queue);
    }

    #[test]
    fn skip_consumes_priority_before_active() {
        let venue = make_venue(&["p1"], &["a1", "a2"]);

        let first = apply(&venue, PlaybackCommand::Skip).venue;
        assert_eq!(first.now_playing.video_id.as_deref(), Some("p1"));
        assert_eq!(first.state, PlaybackStatus::Playing);
        assert!(first.priority_queue.is_empty());
        assert_eq!(first.active_queue.len(), 2);

        let second = apply(&first, PlaybackCommand::Skip).venue;
        assert_eq!(second.now_playing.video_id.as_deref(), Some("a1"));
        assert_eq!(second.active_queue.len(), 1);
    }

    #[test]
    fn skip_on_empty_queues_goes_idle_with_sentinel() {
        let venue = make_venue(&[], &[]);
        let t = apply(&venue, PlaybackCommand::Skip);
        assert_eq!(t.venue.state, PlaybackStatus::Idle);
        assert!(t.venue.now_playing.is_empty());
        assert!(!t.venue.now_playing.is_playing);
    }

    #[test]
    fn previous_restarts_current_track() {
        let mut venue = make_venue(&[], &["a1"]);
        venue.now_playing = NowPlaying::from_track(&make_track("cur"), Utc::now());
        venue.now_playing.current_time = 55.0;

        let t = apply(&venue, PlaybackCommand::Previous);
        assert_eq!(t.venue.now_playing.current_time, 0.0);
        assert_eq!(t.venue.now_playing.video_id.as_deref(), Some("cur"));
        assert_eq!(t.venue.active_queue.len(), 1);
    }

    #[test]
    fn seek_updates_position_without_state_change() {
        let mut venue = make_venue(&[], &[]);
        venue.state = PlaybackStatus::Playing;

        let t = apply(&venue, PlaybackCommand::Seek { time: 93.5 });
        assert_eq!(t.venue.now_playing.current_time, 93.5);
        assert_eq!(t.venue.state, PlaybackStatus::Playing);
    }

    #[test]
    fn volume_touches_only_its_settings_field() {
        let mut venue = make_venue(&[], &[]);
        venue.player_settings.muted = true;
        venue.player_settings.repeat_mode = RepeatMode::All;

        let t = apply(&venue, PlaybackCommand::Volume { volume: 30 });
        assert_eq!(t.venue.player_settings.volume, 30);
        assert!(t.venue.player_settings.muted);
        assert_eq!(t.venue.player_settings.repeat_mode, RepeatMode::All);
        assert_eq!(
            t.venue.player_settings.last_command.as_deref(),
            Some("volume")
        );
        assert!(t.venue.player_settings.command_timestamp.is_some());
    }

    #[test]
    fn mute_toggles_when_no_value_given() {
        let venue = make_venue(&[], &[]);
        let muted = apply(&venue, PlaybackCommand::Mute { muted: None }).venue;
        assert!(muted.player_settings.muted);
        let unmuted = apply(&muted, PlaybackCommand::Mute { muted: None }).venue;
        assert!(!unmuted.player_settings.muted);

        let explicit = apply(&venue, PlaybackCommand::Mute { muted: Some(false) }).venue;
        assert!(!explicit.player_settings.muted);
    }

    #[test]
    fn shuffle_toggle_sets_seed_and_venue_flag() {
        let venue = make_venue(&[], &[]);
        let on = apply(&venue, PlaybackCommand::Shuffle { enabled: None }).venue;
        assert!(on.player_settings.shuffle_enabled);
        assert!(on.is_shuffled);
        assert!(on.player_settings.shuffle_seed.is_some());

        let off = apply(&on, PlaybackCommand::Shuffle { enabled: Some(false) }).venue;
        assert!(!off.player_settings.shuffle_enabled);
        assert!(!off.is_shuffled);
        assert!(off.player_settings.shuffle_seed.is_none());
    }

    #[test]
    fn repeat_cycles_when_no_mode_given() {
        let venue = make_venue(&[], &[]);
        let one = apply(&venue, PlaybackCommand::Repeat { mode: None }).venue;
        assert_eq!(one.player_settings.repeat_mode, RepeatMode::One);
        let all = apply(&one, PlaybackCommand::Repeat { mode: None }).venue;
        assert_eq!(all.player_settings.repeat_mode, RepeatMode::All);
        let off = apply(&all, PlaybackCommand::Repeat { mode: None }).venue;
        assert_eq!(off.player_settings.repeat_mode, RepeatMode::Off);
    }

    #[test]
    fn load_playlist_checks_ownership() {
        let venue = make_venue(&[], &[]);
        let foreign = Playlist {
            playlist_id: "pl".to_string(),
            venue_id: "someone-else".to_string(),
            name: "Set".to_string(),
            tracks: vec![make_track("x")],
        };

        let err = apply_command(
            &venue,
            &PlaybackCommand::LoadPlaylist {
                playlist_id: "pl".to_string(),
            },
            Some(&foreign),
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, PlaybackError::PlaylistNotOwned { .. }));
    }

    #[test]
    fn load_playlist_missing_lookup_is_not_found() {
        let venue = make_venue(&[], &[]);
        let err = apply_command(
            &venue,
            &PlaybackCommand::LoadPlaylist {
                playlist_id: "ghost".to_string(),
            },
            None,
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, PlaybackError::PlaylistNotFound("ghost".to_string()));
    }

    #[test]
    fn load_playlist_then_skip_plays_its_first_track() {
        let venue = make_venue(&[], &[]);
        let playlist = Playlist {
            playlist_id: "pl".to_string(),
            venue_id: "v1".to_string(),
            name: "Set".to_string(),
            tracks: vec![make_track("first"), make_track("second")],
        };

        let loaded = apply_command(
            &venue,
            &PlaybackCommand::LoadPlaylist {
                playlist_id: "pl".to_string(),
            },
            Some(&playlist),
            None,
            Utc::now(),
        )
        .unwrap()
        .venue;
        assert_eq!(loaded.state, PlaybackStatus::Ready);
        assert_eq!(loaded.current_track_index, 0);

        let playing = apply(&loaded, PlaybackCommand::Skip).venue;
        assert_eq!(playing.now_playing.video_id.as_deref(), Some("first"));
        assert_eq!(playing.state, PlaybackStatus::Playing);
        assert_eq!(playing.active_queue.len(), 1);
    }

    #[test]
    fn failed_remove_leaves_no_transition() {
        let venue = make_venue(&[], &["a"]);
        let err = apply_command(
            &venue,
            &PlaybackCommand::RemoveFromQueue {
                index: 5,
                priority: false,
            },
            None,
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, PlaybackError::IndexOutOfBounds { index: 5, len: 1 });
    }

    #[test]
    fn heartbeat_binds_reporting_instance() {
        let venue = make_venue(&[], &[]);
        let t = apply_player_event(&venue, &PlayerEvent::Heartbeat, Some("inst-7"), Utc::now());
        assert!(t.venue.last_heartbeat_at.is_some());
        assert_eq!(t.venue.active_player_instance_id.as_deref(), Some("inst-7"));
        assert_eq!(t.activity.event_type, "player_event");
    }

    #[test]
    fn video_ended_advances_like_skip() {
        let venue = make_venue(&["p1"], &[]);
        let t = apply_player_event(&venue, &PlayerEvent::VideoEnded, None, Utc::now());
        assert_eq!(t.venue.now_playing.video_id.as_deref(), Some("p1"));
        assert_eq!(t.venue.state, PlaybackStatus::Playing);
    }

    #[test]
    fn state_change_refreshes_snapshot_only() {
        let mut venue = make_venue(&[], &[]);
        venue.state = PlaybackStatus::Playing;
        venue.now_playing = NowPlaying::from_track(&make_track("cur"), Utc::now());

        let t = apply_player_event(
            &venue,
            &PlayerEvent::StateChange {
                position: Some(77.0),
                is_playing: Some(false),
            },
            None,
            Utc::now(),
        );
        assert_eq!(t.venue.now_playing.current_time, 77.0);
        assert!(!t.venue.now_playing.is_playing);
        // Command-driven state stays authoritative
        assert_eq!(t.venue.state, PlaybackStatus::Playing);
    }

    #[test]
    fn player_ready_marks_settings() {
        let venue = make_venue(&[], &[]);
        let t = apply_player_event(&venue, &PlayerEvent::PlayerReady, None, Utc::now());
        assert!(t.venue.player_settings.player_ready);
        assert!(t.venue.player_settings.last_ready_at.is_some());
    }

    #[test]
    fn player_error_leaves_playback_state_untouched() {
        let mut venue = make_venue(&[], &[]);
        venue.state = PlaybackStatus::Playing;
        venue.player_settings.player_ready = true;

        let t = apply_player_event(
            &venue,
            &PlayerEvent::PlayerError {
                message: "embed blocked".to_string(),
            },
            None,
            Utc::now(),
        );
        assert_eq!(t.venue.state, PlaybackStatus::Playing);
        assert!(!t.venue.player_settings.player_ready);
        assert_eq!(
            t.venue.player_settings.last_error.as_deref(),
            Some("embed blocked")
        );
        assert!(t.venue.player_settings.error_timestamp.is_some());
    }
}
