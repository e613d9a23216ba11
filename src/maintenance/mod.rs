//! Scheduled maintenance over the venue fleet.
//!
//! One sweep runs four phases in order: a liveness audit, execution of due
//! scheduled events, retention cleanup and a data-integrity check. Phases
//! are independent: a failure in one is recorded in the run summary and the
//! remaining phases still run. Every phase bounds its document-store work
//! (venue pages, cleanup batches, integrity samples) so a sweep terminates
//! no matter how large the fleet grows.

pub mod liveness;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::playback::queue;
use crate::venue_locks::VenueLocks;
use crate::venue_store::{
    NewActivityEntry, PlaybackStatus, ScheduledChange, Venue, VenueStore,
};

/// Tuning for one sweep run. Batch sizes bound each phase.
#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub venue_page_size: usize,
    pub cleanup_batch_size: usize,
    pub integrity_sample_size: usize,
    pub activity_retention_days: u64,
    pub gallery_retention_days: u64,
    pub instance_retention_days: u64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            #[cfg(not(feature = "fast-sweep"))]
            venue_page_size: 200,
            #[cfg(feature = "fast-sweep")]
            venue_page_size: 3,
            cleanup_batch_size: 500,
            integrity_sample_size: 50,
            activity_retention_days: 30,
            gallery_retention_days: 90,
            instance_retention_days: 7,
        }
    }
}

/// Summary of one sweep run, also what the maintenance endpoint returns.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub connection_audits: usize,
    pub scheduled_events: usize,
    pub cleanup_operations: usize,
    pub notifications_sent: usize,
    pub integrity_issues: usize,
    pub errors: Vec<String>,
}

impl SweepSummary {
    pub fn status(&self) -> &'static str {
        if self.errors.is_empty() {
            "success"
        } else {
            "completed_with_errors"
        }
    }
}

/// The sweep runner. Shared between the background scheduler and the
/// maintenance HTTP endpoint.
pub struct MaintenanceSweep {
    store: Arc<dyn VenueStore>,
    locks: Arc<VenueLocks>,
    settings: SweepSettings,
}

impl MaintenanceSweep {
    pub fn new(store: Arc<dyn VenueStore>, locks: Arc<VenueLocks>, settings: SweepSettings) -> Self {
        Self {
            store,
            locks,
            settings,
        }
    }

    /// Runs all phases, isolating failures per phase and per venue.
    pub fn run(&self) -> SweepSummary {
        let now = Utc::now();
        let mut summary = SweepSummary::default();

        let liveness_report =
            liveness::audit_all(&*self.store, &self.locks, self.settings.venue_page_size, now);
        summary.connection_audits = liveness_report.transitions();
        summary.errors.extend(liveness_report.errors);

        self.run_scheduled_events(now, &mut summary);
        self.run_retention_cleanup(now, &mut summary);
        self.run_integrity_check(&mut summary);

        info!(
            "Maintenance sweep finished: {} connection audits, {} scheduled events, \
             {} cleanup operations, {} integrity issues, {} errors",
            summary.connection_audits,
            summary.scheduled_events,
            summary.cleanup_operations,
            summary.integrity_issues,
            summary.errors.len()
        );
        summary
    }

    /// Applies every due, unprocessed scheduled event of a bounded venue page.
    fn run_scheduled_events(&self, now: DateTime<Utc>, summary: &mut SweepSummary) {
        let venue_ids = match self.store.list_venue_ids(self.settings.venue_page_size, 0) {
            Ok(ids) => ids,
            Err(e) => {
                summary.errors.push(format!("scheduled events: {}", e));
                return;
            }
        };

        for venue_id in venue_ids {
            match self.process_venue_scheduled_events(&venue_id, now) {
                Ok((applied, notified)) => {
                    summary.scheduled_events += applied;
                    summary.notifications_sent += notified;
                }
                Err(e) => summary
                    .errors
                    .push(format!("scheduled events for {}: {}", venue_id, e)),
            }
        }
    }

    fn process_venue_scheduled_events(
        &self,
        venue_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(usize, usize)> {
        let guard = self.locks.lock_venue(venue_id);
        let _held = guard.enter();

        let Some(mut venue) = self.store.venue_by_id(venue_id)? else {
            return Ok((0, 0));
        };

        let due: Vec<usize> = venue
            .scheduled_events
            .iter()
            .enumerate()
            .filter(|(_, event)| !event.processed && event.scheduled_at <= now)
            .map(|(i, _)| i)
            .collect();

        if due.is_empty() {
            return Ok((0, 0));
        }

        let mut applied = 0;
        let mut notified = 0;
        for index in due {
            let change = venue.scheduled_events[index].change.clone();
            match change {
                ScheduledChange::PlaylistChange { playlist_id } => {
                    let Some(playlist) = self.store.playlist_by_id(&playlist_id)? else {
                        // Mark processed anyway so a deleted playlist does not
                        // wedge the event forever
                        venue.scheduled_events[index].processed = true;
                        warn!(
                            "Venue {}: scheduled playlist {} no longer exists",
                            venue_id, playlist_id
                        );
                        continue;
                    };
                    apply_scheduled_playlist(&mut venue, &playlist, now);
                    venue.scheduled_events[index].processed = true;
                    applied += 1;

                    if self
                        .store
                        .append_activity(
                            &NewActivityEntry::new(
                                "scheduled_playlist_applied",
                                venue_id,
                                json!({
                                    "playlist_id": playlist.playlist_id,
                                    "track_count": playlist.tracks.len(),
                                }),
                            ),
                        )
                        .is_ok()
                    {
                        notified += 1;
                    }
                }
                ScheduledChange::ContentUpdate { items } => {
                    // Gallery storage is external; the update is acknowledged
                    // and audited here
                    venue.scheduled_events[index].processed = true;
                    applied += 1;

                    if self
                        .store
                        .append_activity(&NewActivityEntry::new(
                            "scheduled_content_update",
                            venue_id,
                            json!({ "items": items }),
                        ))
                        .is_ok()
                    {
                        notified += 1;
                    }
                }
            }
        }

        self.store.update_venue(&venue)?;
        Ok((applied, notified))
    }

    /// Deletes expired records in bounded batches.
    fn run_retention_cleanup(&self, now: DateTime<Utc>, summary: &mut SweepSummary) {
        let batch = self.settings.cleanup_batch_size;

        let activity_cutoff = now - Duration::days(self.settings.activity_retention_days as i64);
        match self.store.cleanup_old_activity(activity_cutoff, batch) {
            Ok(deleted) => summary.cleanup_operations += deleted,
            Err(e) => summary.errors.push(format!("activity cleanup: {}", e)),
        }

        let gallery_cutoff = now - Duration::days(self.settings.gallery_retention_days as i64);
        match self
            .store
            .cleanup_inactive_gallery_items(gallery_cutoff, batch)
        {
            Ok(deleted) => summary.cleanup_operations += deleted,
            Err(e) => summary.errors.push(format!("gallery cleanup: {}", e)),
        }

        let instance_cutoff = now - Duration::days(self.settings.instance_retention_days as i64);
        match self
            .store
            .prune_disconnected_instances(instance_cutoff, batch)
        {
            Ok(deleted) => summary.cleanup_operations += deleted,
            Err(e) => summary.errors.push(format!("instance cleanup: {}", e)),
        }
    }

    /// Parses the JSON-encoded fields of a venue sample and flags orphaned
    /// playlists. Issues are recorded, never repaired.
    fn run_integrity_check(&self, summary: &mut SweepSummary) {
        let venue_ids = match self
            .store
            .list_venue_ids(self.settings.integrity_sample_size, 0)
        {
            Ok(ids) => ids,
            Err(e) => {
                summary.errors.push(format!("integrity check: {}", e));
                return;
            }
        };

        for venue_id in &venue_ids {
            match self.store.raw_venue_fields(venue_id) {
                Ok(Some(raw)) => {
                    let mut check = |field: &str, text: Option<&str>| {
                        let Some(text) = text else { return };
                        if serde_json::from_str::<serde_json::Value>(text).is_err() {
                            warn!("Venue {}: field {} holds malformed JSON", venue_id, field);
                            summary.integrity_issues += 1;
                            let _ = self.store.append_activity(&NewActivityEntry::new(
                                "integrity_issue",
                                venue_id,
                                json!({ "field": field, "kind": "malformed_json" }),
                            ));
                        }
                    };
                    check("now_playing", raw.now_playing.as_deref());
                    check("active_queue", Some(&raw.active_queue));
                    check("priority_queue", Some(&raw.priority_queue));
                    check("player_settings", Some(&raw.player_settings));
                }
                Ok(None) => {}
                Err(e) => summary
                    .errors
                    .push(format!("integrity check for {}: {}", venue_id, e)),
            }
        }

        match self.store.list_playlist_refs() {
            Ok(refs) => {
                for playlist_ref in refs {
                    match self.store.raw_venue_fields(&playlist_ref.venue_id) {
                        Ok(Some(_)) => {}
                        Ok(None) => {
                            warn!(
                                "Playlist {} references missing venue {}",
                                playlist_ref.playlist_id, playlist_ref.venue_id
                            );
                            summary.integrity_issues += 1;
                            let _ = self.store.append_activity(&NewActivityEntry::new(
                                "integrity_issue",
                                &playlist_ref.venue_id,
                                json!({
                                    "kind": "orphaned_playlist",
                                    "playlist_id": playlist_ref.playlist_id,
                                }),
                            ));
                        }
                        Err(e) => summary.errors.push(format!(
                            "orphan check for playlist {}: {}",
                            playlist_ref.playlist_id, e
                        )),
                    }
                }
            }
            Err(e) => summary.errors.push(format!("orphan check: {}", e)),
        }
    }
}

/// Scheduled playlist changes reuse the load-playlist queue semantics.
fn apply_scheduled_playlist(venue: &mut Venue, playlist: &crate::venue_store::Playlist, now: DateTime<Utc>) {
    queue::load_playlist(venue, playlist);
    if venue.state == PlaybackStatus::Idle && !venue.active_queue.is_empty() {
        venue.state = PlaybackStatus::Ready;
    }
    venue.last_queue_update = Some(now);
    venue.last_updated = Some(now);
}
