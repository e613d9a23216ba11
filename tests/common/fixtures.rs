//! Test data builders seeded directly through the store.

use chrono::{Duration, Utc};
use djamms_venue_server::venue_store::{Playlist, Track, Venue, VenueStore};

pub fn make_track(id: &str) -> Track {
    Track {
        video_id: id.to_string(),
        title: format!("Title {}", id),
        channel: "Test Channel".to_string(),
        thumbnail: None,
        duration: 180.0,
    }
}

pub fn track_json(id: &str) -> serde_json::Value {
    serde_json::json!({
        "video_id": id,
        "title": format!("Title {}", id),
        "channel": "Test Channel",
        "duration": 180.0
    })
}

/// Creates a venue with the given queues directly in the store.
pub fn seed_venue(store: &dyn VenueStore, venue_id: &str, priority: &[&str], active: &[&str]) {
    let mut venue = Venue::new(venue_id.to_string(), "owner-1".to_string(), Utc::now());
    venue.priority_queue = priority.iter().map(|id| make_track(id)).collect();
    venue.active_queue = active.iter().map(|id| make_track(id)).collect();
    store.create_venue(&venue).unwrap();
}

/// Creates a venue whose last heartbeat is `minutes` minutes old and whose
/// player is currently marked connected.
pub fn seed_connected_venue(store: &dyn VenueStore, venue_id: &str, heartbeat_age_minutes: i64) {
    let now = Utc::now();
    let mut venue = Venue::new(venue_id.to_string(), "owner-1".to_string(), now);
    venue.player_connected = true;
    venue.last_heartbeat_at = Some(now - Duration::minutes(heartbeat_age_minutes));
    store.create_venue(&venue).unwrap();
}

pub fn seed_playlist(store: &dyn VenueStore, playlist_id: &str, venue_id: &str, track_ids: &[&str]) {
    store
        .create_playlist(&Playlist {
            playlist_id: playlist_id.to_string(),
            venue_id: venue_id.to_string(),
            name: format!("Playlist {}", playlist_id),
            tracks: track_ids.iter().map(|id| make_track(id)).collect(),
        })
        .unwrap();
}
