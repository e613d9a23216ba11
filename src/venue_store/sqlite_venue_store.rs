use super::models::*;
use super::schema::VENUE_VERSIONED_SCHEMAS;
use super::VenueStore;
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// SQLite-backed venue store.
///
/// Nested venue fields are encoded as JSON text on write and decoded to
/// native structs on read, so nothing outside this file sees the encoding.
pub struct SqliteVenueStore {
    conn: Arc<Mutex<Connection>>,
}

/// Raw venue row as read from SQLite, before JSON decoding.
struct VenueRow {
    venue_id: String,
    owner_id: String,
    state: String,
    now_playing: Option<String>,
    active_queue: String,
    priority_queue: String,
    current_track_index: i64,
    player_settings: String,
    is_shuffled: bool,
    active_player_instance_id: Option<String>,
    last_heartbeat_at: Option<String>,
    last_updated: Option<String>,
    last_command_at: Option<String>,
    last_queue_update: Option<String>,
    player_connected: bool,
    disconnected_at: Option<String>,
    reconnected_at: Option<String>,
    scheduled_events: String,
    created_at: String,
}

const VENUE_COLUMNS: &str = "venue_id, owner_id, state, now_playing, active_queue, \
    priority_queue, current_track_index, player_settings, is_shuffled, \
    active_player_instance_id, last_heartbeat_at, last_updated, last_command_at, \
    last_queue_update, player_connected, disconnected_at, reconnected_at, \
    scheduled_events, created_at";

impl SqliteVenueStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let conn = Connection::open(path).context("Failed to open venue database")?;

        if is_new_db {
            info!("Creating new venue database at {:?}", path);
            VENUE_VERSIONED_SCHEMAS
                .last()
                .expect("at least one schema version")
                .create(&conn)?;
        } else {
            let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
            let db_version = raw_version - BASE_DB_VERSION as i64;

            let schema = VENUE_VERSIONED_SCHEMAS
                .iter()
                .find(|s| s.version as i64 == db_version)
                .with_context(|| format!("Unknown venue database version {}", db_version))?;
            schema.validate(&conn).with_context(|| {
                format!(
                    "Venue database schema validation failed for version {}",
                    db_version
                )
            })?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .with_context(|| format!("Invalid stored timestamp {:?}", s))
    }

    fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
        s.as_deref().map(Self::parse_datetime).transpose()
    }

    fn row_to_venue_row(row: &rusqlite::Row) -> rusqlite::Result<VenueRow> {
        Ok(VenueRow {
            venue_id: row.get("venue_id")?,
            owner_id: row.get("owner_id")?,
            state: row.get("state")?,
            now_playing: row.get("now_playing")?,
            active_queue: row.get("active_queue")?,
            priority_queue: row.get("priority_queue")?,
            current_track_index: row.get("current_track_index")?,
            player_settings: row.get("player_settings")?,
            is_shuffled: row.get::<_, i64>("is_shuffled")? != 0,
            active_player_instance_id: row.get("active_player_instance_id")?,
            last_heartbeat_at: row.get("last_heartbeat_at")?,
            last_updated: row.get("last_updated")?,
            last_command_at: row.get("last_command_at")?,
            last_queue_update: row.get("last_queue_update")?,
            player_connected: row.get::<_, i64>("player_connected")? != 0,
            disconnected_at: row.get("disconnected_at")?,
            reconnected_at: row.get("reconnected_at")?,
            scheduled_events: row.get("scheduled_events")?,
            created_at: row.get("created_at")?,
        })
    }

    fn decode_venue(row: VenueRow) -> Result<Venue> {
        let now_playing = match row.now_playing {
            Some(json) => serde_json::from_str(&json)
                .with_context(|| format!("Venue {}: malformed now_playing", row.venue_id))?,
            None => NowPlaying::empty(),
        };
        let active_queue: Vec<Track> = serde_json::from_str(&row.active_queue)
            .with_context(|| format!("Venue {}: malformed active_queue", row.venue_id))?;
        let priority_queue: Vec<Track> = serde_json::from_str(&row.priority_queue)
            .with_context(|| format!("Venue {}: malformed priority_queue", row.venue_id))?;
        let player_settings: PlayerSettings = serde_json::from_str(&row.player_settings)
            .with_context(|| format!("Venue {}: malformed player_settings", row.venue_id))?;
        let scheduled_events: Vec<ScheduledEvent> = serde_json::from_str(&row.scheduled_events)
            .with_context(|| format!("Venue {}: malformed scheduled_events", row.venue_id))?;
        let state = PlaybackStatus::parse(&row.state)
            .with_context(|| format!("Venue {}: unknown state {:?}", row.venue_id, row.state))?;

        Ok(Venue {
            state,
            now_playing,
            active_queue,
            priority_queue,
            current_track_index: row.current_track_index,
            player_settings,
            is_shuffled: row.is_shuffled,
            active_player_instance_id: row.active_player_instance_id,
            last_heartbeat_at: Self::parse_optional_datetime(row.last_heartbeat_at)?,
            last_updated: Self::parse_optional_datetime(row.last_updated)?,
            last_command_at: Self::parse_optional_datetime(row.last_command_at)?,
            last_queue_update: Self::parse_optional_datetime(row.last_queue_update)?,
            player_connected: row.player_connected,
            disconnected_at: Self::parse_optional_datetime(row.disconnected_at)?,
            reconnected_at: Self::parse_optional_datetime(row.reconnected_at)?,
            scheduled_events,
            created_at: Self::parse_datetime(&row.created_at)?,
            venue_id: row.venue_id,
            owner_id: row.owner_id,
        })
    }

    fn row_to_instance(row: &rusqlite::Row) -> rusqlite::Result<PlayerInstance> {
        let last_heartbeat_at: Option<String> = row.get("last_heartbeat_at")?;
        let disconnected_at: Option<String> = row.get("disconnected_at")?;
        let created_at: String = row.get("created_at")?;

        Ok(PlayerInstance {
            instance_id: row.get("instance_id")?,
            venue_id: row.get("venue_id")?,
            is_connected: row.get::<_, i64>("is_connected")? != 0,
            last_heartbeat_at: last_heartbeat_at
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            heartbeat_count: row.get("heartbeat_count")?,
            disconnected_at: disconnected_at
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    fn row_to_job_run(row: &rusqlite::Row) -> rusqlite::Result<JobRun> {
        let status_str: String = row.get("status")?;
        let started_at: String = row.get("started_at")?;
        let finished_at: Option<String> = row.get("finished_at")?;

        Ok(JobRun {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            started_at: DateTime::parse_from_rfc3339(&started_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            finished_at: finished_at
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            status: JobRunStatus::parse(&status_str).unwrap_or(JobRunStatus::Failed),
            error_message: row.get("error_message")?,
            triggered_by: row.get("triggered_by")?,
        })
    }
}

impl VenueStore for SqliteVenueStore {
    fn venue_by_id(&self, venue_id: &str) -> Result<Option<Venue>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM venues WHERE venue_id = ?1", VENUE_COLUMNS),
                params![venue_id],
                Self::row_to_venue_row,
            )
            .optional()?;
        row.map(Self::decode_venue).transpose()
    }

    fn create_venue(&self, venue: &Venue) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO venues (venue_id, owner_id, state, now_playing, active_queue,
                priority_queue, current_track_index, player_settings, is_shuffled,
                active_player_instance_id, last_heartbeat_at, last_updated, last_command_at,
                last_queue_update, player_connected, disconnected_at, reconnected_at,
                scheduled_events, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                venue.venue_id,
                venue.owner_id,
                venue.state.as_str(),
                serde_json::to_string(&venue.now_playing)?,
                serde_json::to_string(&venue.active_queue)?,
                serde_json::to_string(&venue.priority_queue)?,
                venue.current_track_index,
                serde_json::to_string(&venue.player_settings)?,
                venue.is_shuffled as i64,
                venue.active_player_instance_id,
                venue.last_heartbeat_at.as_ref().map(Self::format_datetime),
                venue.last_updated.as_ref().map(Self::format_datetime),
                venue.last_command_at.as_ref().map(Self::format_datetime),
                venue.last_queue_update.as_ref().map(Self::format_datetime),
                venue.player_connected as i64,
                venue.disconnected_at.as_ref().map(Self::format_datetime),
                venue.reconnected_at.as_ref().map(Self::format_datetime),
                serde_json::to_string(&venue.scheduled_events)?,
                Self::format_datetime(&venue.created_at),
            ],
        )
        .context("Failed to insert venue")?;
        Ok(())
    }

    fn update_venue(&self, venue: &Venue) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE venues SET owner_id = ?2, state = ?3, now_playing = ?4,
                    active_queue = ?5, priority_queue = ?6, current_track_index = ?7,
                    player_settings = ?8, is_shuffled = ?9, active_player_instance_id = ?10,
                    last_heartbeat_at = ?11, last_updated = ?12, last_command_at = ?13,
                    last_queue_update = ?14, player_connected = ?15, disconnected_at = ?16,
                    reconnected_at = ?17, scheduled_events = ?18
                 WHERE venue_id = ?1",
                params![
                    venue.venue_id,
                    venue.owner_id,
                    venue.state.as_str(),
                    serde_json::to_string(&venue.now_playing)?,
                    serde_json::to_string(&venue.active_queue)?,
                    serde_json::to_string(&venue.priority_queue)?,
                    venue.current_track_index,
                    serde_json::to_string(&venue.player_settings)?,
                    venue.is_shuffled as i64,
                    venue.active_player_instance_id,
                    venue.last_heartbeat_at.as_ref().map(Self::format_datetime),
                    venue.last_updated.as_ref().map(Self::format_datetime),
                    venue.last_command_at.as_ref().map(Self::format_datetime),
                    venue.last_queue_update.as_ref().map(Self::format_datetime),
                    venue.player_connected as i64,
                    venue.disconnected_at.as_ref().map(Self::format_datetime),
                    venue.reconnected_at.as_ref().map(Self::format_datetime),
                    serde_json::to_string(&venue.scheduled_events)?,
                ],
            )
            .context("Failed to update venue")?;
        if changed == 0 {
            anyhow::bail!("Venue {} does not exist", venue.venue_id);
        }
        Ok(())
    }

    fn list_venue_ids(&self, limit: usize, offset: usize) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT venue_id FROM venues ORDER BY created_at, venue_id LIMIT ?1 OFFSET ?2",
        )?;
        let ids = stmt
            .query_map(params![limit as i64, offset as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn raw_venue_fields(&self, venue_id: &str) -> Result<Option<RawVenueFields>> {
        let conn = self.conn.lock().unwrap();
        let fields = conn
            .query_row(
                "SELECT venue_id, now_playing, active_queue, priority_queue, player_settings
                 FROM venues WHERE venue_id = ?1",
                params![venue_id],
                |row| {
                    Ok(RawVenueFields {
                        venue_id: row.get(0)?,
                        now_playing: row.get(1)?,
                        active_queue: row.get(2)?,
                        priority_queue: row.get(3)?,
                        player_settings: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(fields)
    }

    fn instance_by_id(&self, instance_id: &str) -> Result<Option<PlayerInstance>> {
        let conn = self.conn.lock().unwrap();
        let instance = conn
            .query_row(
                "SELECT instance_id, venue_id, is_connected, last_heartbeat_at,
                    heartbeat_count, disconnected_at, created_at
                 FROM player_instances WHERE instance_id = ?1",
                params![instance_id],
                Self::row_to_instance,
            )
            .optional()?;
        Ok(instance)
    }

    fn upsert_instance(&self, instance: &PlayerInstance) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO player_instances (instance_id, venue_id, is_connected,
                last_heartbeat_at, heartbeat_count, disconnected_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(instance_id) DO UPDATE SET
                venue_id = excluded.venue_id,
                is_connected = excluded.is_connected,
                last_heartbeat_at = excluded.last_heartbeat_at,
                heartbeat_count = excluded.heartbeat_count,
                disconnected_at = excluded.disconnected_at",
            params![
                instance.instance_id,
                instance.venue_id,
                instance.is_connected as i64,
                instance.last_heartbeat_at.as_ref().map(Self::format_datetime),
                instance.heartbeat_count,
                instance.disconnected_at.as_ref().map(Self::format_datetime),
                Self::format_datetime(&instance.created_at),
            ],
        )
        .context("Failed to upsert player instance")?;
        Ok(())
    }

    fn instances_for_venue(&self, venue_id: &str) -> Result<Vec<PlayerInstance>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT instance_id, venue_id, is_connected, last_heartbeat_at,
                heartbeat_count, disconnected_at, created_at
             FROM player_instances WHERE venue_id = ?1 ORDER BY created_at",
        )?;
        let instances = stmt
            .query_map(params![venue_id], Self::row_to_instance)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(instances)
    }

    fn disconnect_venue_instances(&self, venue_id: &str, at: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE player_instances SET is_connected = 0, disconnected_at = ?2
             WHERE venue_id = ?1 AND is_connected = 1",
            params![venue_id, Self::format_datetime(&at)],
        )?;
        Ok(changed)
    }

    fn prune_disconnected_instances(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM player_instances WHERE rowid IN (
                SELECT rowid FROM player_instances
                WHERE is_connected = 0 AND disconnected_at IS NOT NULL AND disconnected_at < ?1
                LIMIT ?2)",
            params![Self::format_datetime(&cutoff), limit as i64],
        )?;
        Ok(deleted)
    }

    fn append_activity(&self, entry: &NewActivityEntry) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO activity_log (event_type, venue_id, user_id, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.event_type,
                entry.venue_id,
                entry.user_id,
                serde_json::to_string(&entry.payload)?,
                Self::format_datetime(&Utc::now()),
            ],
        )
        .context("Failed to append activity log entry")?;
        Ok(conn.last_insert_rowid())
    }

    fn activity_for_venue(&self, venue_id: &str, limit: usize) -> Result<Vec<ActivityLogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, event_type, venue_id, user_id, payload, created_at
             FROM activity_log WHERE venue_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![venue_id, limit as i64], |row| {
                let payload: String = row.get("payload")?;
                let created_at: String = row.get("created_at")?;
                Ok(ActivityLogEntry {
                    id: row.get("id")?,
                    event_type: row.get("event_type")?,
                    venue_id: row.get("venue_id")?,
                    user_id: row.get("user_id")?,
                    payload: serde_json::from_str(&payload).unwrap_or(JsonValue::Null),
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn cleanup_old_activity(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM activity_log WHERE id IN (
                SELECT id FROM activity_log WHERE created_at < ?1 LIMIT ?2)",
            params![Self::format_datetime(&cutoff), limit as i64],
        )?;
        Ok(deleted)
    }

    fn playlist_by_id(&self, playlist_id: &str) -> Result<Option<Playlist>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT playlist_id, venue_id, name, tracks FROM playlists WHERE playlist_id = ?1",
                params![playlist_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(playlist_id, venue_id, name, tracks_json)| {
            let tracks: Vec<Track> = serde_json::from_str(&tracks_json)
                .with_context(|| format!("Playlist {}: malformed tracks", playlist_id))?;
            Ok(Playlist {
                playlist_id,
                venue_id,
                name,
                tracks,
            })
        })
        .transpose()
    }

    fn create_playlist(&self, playlist: &Playlist) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO playlists (playlist_id, venue_id, name, tracks) VALUES (?1, ?2, ?3, ?4)",
            params![
                playlist.playlist_id,
                playlist.venue_id,
                playlist.name,
                serde_json::to_string(&playlist.tracks)?,
            ],
        )
        .context("Failed to insert playlist")?;
        Ok(())
    }

    fn list_playlist_refs(&self) -> Result<Vec<PlaylistRef>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT playlist_id, venue_id FROM playlists")?;
        let refs = stmt
            .query_map([], |row| {
                Ok(PlaylistRef {
                    playlist_id: row.get(0)?,
                    venue_id: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(refs)
    }

    fn insert_gallery_item(&self, item: &GalleryItem) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO gallery_items (item_id, venue_id, active, last_used_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                item.item_id,
                item.venue_id,
                item.active as i64,
                Self::format_datetime(&item.last_used_at),
            ],
        )?;
        Ok(())
    }

    fn cleanup_inactive_gallery_items(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM gallery_items WHERE item_id IN (
                SELECT item_id FROM gallery_items
                WHERE active = 0 AND last_used_at < ?1 LIMIT ?2)",
            params![Self::format_datetime(&cutoff), limit as i64],
        )?;
        Ok(deleted)
    }

    fn record_job_start(&self, job_id: &str, triggered_by: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_runs (job_id, started_at, status, triggered_by)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                job_id,
                Self::format_datetime(&Utc::now()),
                JobRunStatus::Running.as_str(),
                triggered_by,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn record_job_finish(
        &self,
        run_id: i64,
        status: JobRunStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE job_runs SET finished_at = ?2, status = ?3, error_message = ?4 WHERE id = ?1",
            params![
                run_id,
                Self::format_datetime(&Utc::now()),
                status.as_str(),
                error_message,
            ],
        )?;
        Ok(())
    }

    fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>> {
        let conn = self.conn.lock().unwrap();
        let run = conn
            .query_row(
                "SELECT id, job_id, started_at, finished_at, status, error_message, triggered_by
                 FROM job_runs WHERE job_id = ?1 ORDER BY started_at DESC, id DESC LIMIT 1",
                params![job_id],
                Self::row_to_job_run,
            )
            .optional()?;
        Ok(run)
    }

    fn mark_stale_jobs_failed(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE job_runs SET status = ?1, finished_at = ?2,
                error_message = 'Interrupted by server restart'
             WHERE status = ?3",
            params![
                JobRunStatus::Failed.as_str(),
                Self::format_datetime(&Utc::now()),
                JobRunStatus::Running.as_str(),
            ],
        )?;
        Ok(changed)
    }

    fn get_schedule_state(&self, job_id: &str) -> Result<Option<JobScheduleState>> {
        let conn = self.conn.lock().unwrap();
        let state = conn
            .query_row(
                "SELECT job_id, next_run_at, last_run_at FROM job_schedules WHERE job_id = ?1",
                params![job_id],
                |row| {
                    let next_run_at: String = row.get(1)?;
                    let last_run_at: Option<String> = row.get(2)?;
                    Ok(JobScheduleState {
                        job_id: row.get(0)?,
                        next_run_at: DateTime::parse_from_rfc3339(&next_run_at)
                            .map(|dt| dt.with_timezone(&Utc))
                            .unwrap_or_else(|_| Utc::now()),
                        last_run_at: last_run_at
                            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                            .map(|dt| dt.with_timezone(&Utc)),
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    fn update_schedule_state(&self, state: &JobScheduleState) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_schedules (job_id, next_run_at, last_run_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(job_id) DO UPDATE SET
                next_run_at = excluded.next_run_at,
                last_run_at = excluded.last_run_at",
            params![
                state.job_id,
                Self::format_datetime(&state.next_run_at),
                state.last_run_at.as_ref().map(Self::format_datetime),
            ],
        )?;
        Ok(())
    }

    fn log_job_audit(
        &self,
        job_id: &str,
        event_type: JobAuditEventType,
        duration_ms: Option<i64>,
        details: Option<&JsonValue>,
        error: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_audit_log (job_id, event_type, timestamp, duration_ms, details, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                job_id,
                event_type.as_str(),
                Self::format_datetime(&Utc::now()),
                duration_ms,
                details.map(|d| d.to_string()),
                error,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

#[cfg(test)]
impl SqliteVenueStore {
    /// Test helper: overwrite a venue's stored settings with invalid JSON,
    /// as a buggy writer would.
    pub fn corrupt_player_settings_for_test(&self, venue_id: &str) {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE venues SET player_settings = '{not json' WHERE venue_id = ?1",
            params![venue_id],
        )
        .unwrap();
    }
}
