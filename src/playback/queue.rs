//! Two-tier queue arbitration.
//!
//! Every venue carries a user-requested priority queue and a
//! playlist-sourced background queue. Advancement always drains the
//! priority queue first; there is no interleaving or weighting between the
//! two tiers. Index-based operations reject out-of-range requests without
//! touching either queue.

use crate::venue_store::{Playlist, Track, Venue};

use super::commands::PlaybackError;

/// Which queue produced an advanced track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceSource {
    Priority,
    Active,
}

impl AdvanceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdvanceSource::Priority => "priority",
            AdvanceSource::Active => "active",
        }
    }
}

/// Pops the next track to play: priority head first, then active head,
/// then nothing. Sets `current_track_index` to -1 once both queues drain.
pub fn advance(venue: &mut Venue) -> Option<(Track, AdvanceSource)> {
    let popped = if !venue.priority_queue.is_empty() {
        Some((venue.priority_queue.remove(0), AdvanceSource::Priority))
    } else if !venue.active_queue.is_empty() {
        Some((venue.active_queue.remove(0), AdvanceSource::Active))
    } else {
        None
    };

    if venue.priority_queue.is_empty() && venue.active_queue.is_empty() {
        venue.current_track_index = -1;
    }
    popped
}

/// Replaces the background queue wholesale with the playlist's tracks.
/// The priority queue is never touched by a playlist load.
pub fn load_playlist(venue: &mut Venue, playlist: &Playlist) {
    venue.active_queue = playlist.tracks.clone();
    venue.current_track_index = if playlist.tracks.is_empty() { -1 } else { 0 };
}

/// Appends the track, or inserts at `position` clamped to `[0, len]`.
pub fn add_to_queue(venue: &mut Venue, track: Track, priority: bool, position: Option<usize>) {
    let queue = queue_mut(venue, priority);
    match position {
        Some(position) => {
            let position = position.min(queue.len());
            queue.insert(position, track);
        }
        None => queue.push(track),
    }
}

/// Removes and returns the track at `index`, rejecting out-of-range
/// indices without mutating the queue.
pub fn remove_from_queue(
    venue: &mut Venue,
    index: usize,
    priority: bool,
) -> Result<Track, PlaybackError> {
    let queue = queue_mut(venue, priority);
    if index >= queue.len() {
        return Err(PlaybackError::IndexOutOfBounds {
            index,
            len: queue.len(),
        });
    }
    Ok(queue.remove(index))
}

/// Empties the selected queue, returning how many tracks were dropped.
pub fn clear_queue(venue: &mut Venue, priority: bool) -> usize {
    let queue = queue_mut(venue, priority);
    let dropped = queue.len();
    queue.clear();
    dropped
}

/// Applies a full permutation to the selected queue.
///
/// `order[i]` names the original index of the track that ends up at
/// position `i`. Anything short of a complete, duplicate-free, in-range
/// permutation is rejected whole; partial reorders are not supported.
pub fn reorder(venue: &mut Venue, order: &[usize], priority: bool) -> Result<(), PlaybackError> {
    let queue = queue_mut(venue, priority);

    if order.len() != queue.len() {
        return Err(PlaybackError::InvalidPermutation(format!(
            "permutation has {} entries for a queue of length {}",
            order.len(),
            queue.len()
        )));
    }

    let mut seen = vec![false; queue.len()];
    for &original_index in order {
        if original_index >= queue.len() {
            return Err(PlaybackError::InvalidPermutation(format!(
                "index {} is out of range for a queue of length {}",
                original_index,
                queue.len()
            )));
        }
        if seen[original_index] {
            return Err(PlaybackError::InvalidPermutation(format!(
                "index {} appears more than once",
                original_index
            )));
        }
        seen[original_index] = true;
    }

    let reordered: Vec<Track> = order.iter().map(|&i| queue[i].clone()).collect();
    *queue = reordered;
    Ok(())
}

fn queue_mut(venue: &mut Venue, priority: bool) -> &mut Vec<Track> {
    if priority {
        &mut venue.priority_queue
    } else {
        &mut venue.active_queue
    }
}
