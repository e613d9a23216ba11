mod models;
mod schema;
mod sqlite_venue_store;

pub use models::*;
pub use schema::VENUE_VERSIONED_SCHEMAS;
pub use sqlite_venue_store::SqliteVenueStore;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

/// Contract against the backing document store.
///
/// One venue document is the unit of consistency: `update_venue` replaces
/// the whole document in a single write, so a transition's queue and
/// now-playing changes become visible together. There are no cross-document
/// transactions; the activity log is append-only and safe for unsynchronized
/// concurrent writers.
pub trait VenueStore: Send + Sync {
    // Venues
    fn venue_by_id(&self, venue_id: &str) -> Result<Option<Venue>>;
    fn create_venue(&self, venue: &Venue) -> Result<()>;
    /// Persists the full venue document as one write.
    fn update_venue(&self, venue: &Venue) -> Result<()>;
    /// Page of venue ids ordered by creation, for bounded sweeps.
    fn list_venue_ids(&self, limit: usize, offset: usize) -> Result<Vec<String>>;
    /// The raw JSON text of a venue's encoded columns, for integrity checks.
    fn raw_venue_fields(&self, venue_id: &str) -> Result<Option<RawVenueFields>>;

    // Player instances
    fn instance_by_id(&self, instance_id: &str) -> Result<Option<PlayerInstance>>;
    fn upsert_instance(&self, instance: &PlayerInstance) -> Result<()>;
    fn instances_for_venue(&self, venue_id: &str) -> Result<Vec<PlayerInstance>>;
    /// Marks every connected instance of the venue disconnected.
    /// Returns how many rows changed.
    fn disconnect_venue_instances(&self, venue_id: &str, at: DateTime<Utc>) -> Result<usize>;
    /// Deletes disconnected instances whose disconnect time is before the
    /// cutoff, up to `limit` rows.
    fn prune_disconnected_instances(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<usize>;

    // Activity log
    fn append_activity(&self, entry: &NewActivityEntry) -> Result<i64>;
    fn activity_for_venue(&self, venue_id: &str, limit: usize) -> Result<Vec<ActivityLogEntry>>;
    /// Deletes entries older than the cutoff, up to `limit` rows.
    fn cleanup_old_activity(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<usize>;

    // Playlists (read-side contract)
    fn playlist_by_id(&self, playlist_id: &str) -> Result<Option<Playlist>>;
    fn create_playlist(&self, playlist: &Playlist) -> Result<()>;
    fn list_playlist_refs(&self) -> Result<Vec<PlaylistRef>>;

    // Content gallery (cleanup contract)
    fn insert_gallery_item(&self, item: &GalleryItem) -> Result<()>;
    /// Deletes inactive items unused since the cutoff, up to `limit` rows.
    fn cleanup_inactive_gallery_items(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<usize>;

    // Job bookkeeping
    fn record_job_start(&self, job_id: &str, triggered_by: &str) -> Result<i64>;
    fn record_job_finish(
        &self,
        run_id: i64,
        status: JobRunStatus,
        error_message: Option<String>,
    ) -> Result<()>;
    fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>>;
    /// Marks runs still recorded as running (from a crashed process) failed.
    fn mark_stale_jobs_failed(&self) -> Result<usize>;
    fn get_schedule_state(&self, job_id: &str) -> Result<Option<JobScheduleState>>;
    fn update_schedule_state(&self, state: &JobScheduleState) -> Result<()>;
    fn log_job_audit(
        &self,
        job_id: &str,
        event_type: JobAuditEventType,
        duration_ms: Option<i64>,
        details: Option<&JsonValue>,
        error: Option<&str>,
    ) -> Result<i64>;
}
