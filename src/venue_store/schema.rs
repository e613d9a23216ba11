//! SQLite schema for the venue database.
//!
//! Nested venue structures (`now_playing`, both queues, `player_settings`,
//! `scheduled_events`) live in JSON TEXT columns; everything else is a plain
//! scalar column. Timestamps are RFC 3339 text.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

/// Venues table - one row per tenant playback context
const VENUES_TABLE_V1: Table = Table {
    name: "venues",
    columns: &[
        sqlite_column!("venue_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("owner_id", &SqlType::Text, non_null = true),
        sqlite_column!("state", &SqlType::Text, non_null = true),
        sqlite_column!("now_playing", &SqlType::Text), // JSON, NULL when nothing was ever played
        sqlite_column!("active_queue", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("priority_queue", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("current_track_index", &SqlType::Integer, non_null = true),
        sqlite_column!("player_settings", &SqlType::Text, non_null = true), // JSON
        sqlite_column!("is_shuffled", &SqlType::Integer, non_null = true),
        sqlite_column!("active_player_instance_id", &SqlType::Text),
        sqlite_column!("last_heartbeat_at", &SqlType::Text),
        sqlite_column!("last_updated", &SqlType::Text),
        sqlite_column!("last_command_at", &SqlType::Text),
        sqlite_column!("last_queue_update", &SqlType::Text),
        sqlite_column!("player_connected", &SqlType::Integer, non_null = true),
        sqlite_column!("disconnected_at", &SqlType::Text),
        sqlite_column!("reconnected_at", &SqlType::Text),
        sqlite_column!("scheduled_events", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_venues_owner_id", "owner_id"),
        ("idx_venues_player_connected", "player_connected"),
    ],
};

/// Player instances table - connected playback surfaces
const PLAYER_INSTANCES_TABLE_V1: Table = Table {
    name: "player_instances",
    columns: &[
        sqlite_column!("instance_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("venue_id", &SqlType::Text, non_null = true),
        sqlite_column!("is_connected", &SqlType::Integer, non_null = true),
        sqlite_column!("last_heartbeat_at", &SqlType::Text),
        sqlite_column!("heartbeat_count", &SqlType::Integer, non_null = true),
        sqlite_column!("disconnected_at", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_player_instances_venue", "venue_id"),
        ("idx_player_instances_connected", "is_connected"),
    ],
};

/// Activity log table - append-only audit trail
const ACTIVITY_LOG_TABLE_V1: Table = Table {
    name: "activity_log",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!("event_type", &SqlType::Text, non_null = true),
        sqlite_column!("venue_id", &SqlType::Text, non_null = true),
        sqlite_column!("user_id", &SqlType::Text),
        sqlite_column!("payload", &SqlType::Text, non_null = true), // JSON
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_activity_log_venue_created", "venue_id, created_at DESC"),
        ("idx_activity_log_created_at", "created_at"),
    ],
};

/// Playlists table - read-side contract for loadPlaylist and orphan checks
const PLAYLISTS_TABLE_V1: Table = Table {
    name: "playlists",
    columns: &[
        sqlite_column!("playlist_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("venue_id", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("tracks", &SqlType::Text, non_null = true), // JSON array
    ],
    indices: &[("idx_playlists_venue", "venue_id")],
};

/// Gallery items table - modeled only as far as retention cleanup needs
const GALLERY_ITEMS_TABLE_V1: Table = Table {
    name: "gallery_items",
    columns: &[
        sqlite_column!("item_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("venue_id", &SqlType::Text, non_null = true),
        sqlite_column!("active", &SqlType::Integer, non_null = true),
        sqlite_column!("last_used_at", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_gallery_items_active_used", "active, last_used_at")],
};

/// Job runs table - history of background job executions
const JOB_RUNS_TABLE_V1: Table = Table {
    name: "job_runs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!("job_id", &SqlType::Text, non_null = true),
        sqlite_column!("started_at", &SqlType::Text, non_null = true),
        sqlite_column!("finished_at", &SqlType::Text),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("triggered_by", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_job_runs_job_id_started", "job_id, started_at DESC")],
};

/// Job schedules table - next run times for interval jobs
const JOB_SCHEDULES_TABLE_V1: Table = Table {
    name: "job_schedules",
    columns: &[
        sqlite_column!("job_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("next_run_at", &SqlType::Text, non_null = true),
        sqlite_column!("last_run_at", &SqlType::Text),
    ],
    indices: &[],
};

/// Job audit log table - per-run detail records (sweep summaries land here)
const JOB_AUDIT_LOG_TABLE_V1: Table = Table {
    name: "job_audit_log",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!("job_id", &SqlType::Text, non_null = true),
        sqlite_column!("event_type", &SqlType::Text, non_null = true),
        sqlite_column!("timestamp", &SqlType::Text, non_null = true),
        sqlite_column!("duration_ms", &SqlType::Integer),
        sqlite_column!("details", &SqlType::Text),
        sqlite_column!("error", &SqlType::Text),
    ],
    indices: &[("idx_job_audit_log_job_id", "job_id")],
};

/// All versioned schemas for the venue database.
///
/// Version 1: initial layout.
pub const VENUE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        VENUES_TABLE_V1,
        PLAYER_INSTANCES_TABLE_V1,
        ACTIVITY_LOG_TABLE_V1,
        PLAYLISTS_TABLE_V1,
        GALLERY_ITEMS_TABLE_V1,
        JOB_RUNS_TABLE_V1,
        JOB_SCHEDULES_TABLE_V1,
        JOB_AUDIT_LOG_TABLE_V1,
    ],
    migration: None,
}];

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn v1_schema_creates_and_validates() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = &VENUE_VERSIONED_SCHEMAS[0];
        schema.create(&conn).unwrap();
        schema.validate(&conn).unwrap();
    }

    #[test]
    fn venue_indices_created() {
        let conn = Connection::open_in_memory().unwrap();
        VENUE_VERSIONED_SCHEMAS[0].create(&conn).unwrap();

        for index in [
            "idx_venues_owner_id",
            "idx_player_instances_venue",
            "idx_activity_log_venue_created",
            "idx_job_runs_job_id_started",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name=?1",
                    [index],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing index {}", index);
        }
    }

    #[test]
    fn venue_row_accepts_json_columns() {
        let conn = Connection::open_in_memory().unwrap();
        VENUE_VERSIONED_SCHEMAS[0].create(&conn).unwrap();

        conn.execute(
            "INSERT INTO venues (venue_id, owner_id, state, active_queue, priority_queue,
                current_track_index, player_settings, is_shuffled, player_connected,
                scheduled_events, created_at)
             VALUES ('v1', 'u1', 'idle', '[]', '[]', -1, '{}', 0, 0, '[]', '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let (state, queue): (String, String) = conn
            .query_row(
                "SELECT state, active_queue FROM venues WHERE venue_id = 'v1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(state, "idle");
        assert_eq!(queue, "[]");
    }
}
