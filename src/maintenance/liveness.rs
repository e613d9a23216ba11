//! Heartbeat-based liveness classification.
//!
//! A venue is considered live while its last heartbeat is younger than the
//! timeout; a missing heartbeat counts as infinitely old. The audit is
//! level-triggered: it writes only when a venue crosses the boundary in
//! either direction, so repeated sweeps over a quiet fleet stay read-only.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::venue_locks::VenueLocks;
use crate::venue_store::{NewActivityEntry, VenueStore};

/// Heartbeats older than this mark the venue's player as disconnected.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::minutes(5);

/// What a single venue audit did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessTransition {
    /// Venue crossed above the timeout: marked disconnected, with this many
    /// player instances cascaded.
    Disconnected { instances: usize },
    /// Venue came back under the timeout while marked disconnected.
    Reconnected,
}

/// Aggregate outcome of one liveness pass.
#[derive(Debug, Default)]
pub struct LivenessReport {
    pub audited: usize,
    pub disconnected: usize,
    pub reconnected: usize,
    pub instances_disconnected: usize,
    pub errors: Vec<String>,
}

impl LivenessReport {
    /// Number of connection-state transitions applied.
    pub fn transitions(&self) -> usize {
        self.disconnected + self.reconnected
    }
}

/// Audits one venue under its write lock.
pub fn audit_venue(
    store: &dyn VenueStore,
    locks: &VenueLocks,
    venue_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<LivenessTransition>> {
    let guard = locks.lock_venue(venue_id);
    let _held = guard.enter();

    let Some(mut venue) = store.venue_by_id(venue_id)? else {
        return Ok(None);
    };

    let timed_out = match venue.last_heartbeat_at {
        Some(last) => now - last > HEARTBEAT_TIMEOUT,
        None => true,
    };

    let transition = if timed_out && venue.player_connected {
        venue.player_connected = false;
        venue.disconnected_at = Some(now);
        store.update_venue(&venue)?;

        let instances = store.disconnect_venue_instances(venue_id, now)?;
        info!(
            "Venue {} disconnected after heartbeat timeout ({} instances cascaded)",
            venue_id, instances
        );
        append_activity(
            store,
            NewActivityEntry::new(
                "player_disconnected",
                venue_id,
                json!({ "reason": "heartbeat_timeout", "instances": instances }),
            ),
        );
        Some(LivenessTransition::Disconnected { instances })
    } else if !timed_out && !venue.player_connected {
        venue.player_connected = true;
        venue.reconnected_at = Some(now);
        store.update_venue(&venue)?;

        info!("Venue {} reconnected (fresh heartbeat)", venue_id);
        append_activity(
            store,
            NewActivityEntry::new("player_reconnected", venue_id, json!({})),
        );
        Some(LivenessTransition::Reconnected)
    } else {
        None
    };

    Ok(transition)
}

/// Audits up to `page_size` venues. A per-venue failure is recorded and the
/// pass continues with the next venue.
pub fn audit_all(
    store: &dyn VenueStore,
    locks: &VenueLocks,
    page_size: usize,
    now: DateTime<Utc>,
) -> LivenessReport {
    let mut report = LivenessReport::default();

    let venue_ids = match store.list_venue_ids(page_size, 0) {
        Ok(ids) => ids,
        Err(e) => {
            report.errors.push(format!("listing venues: {}", e));
            return report;
        }
    };

    for venue_id in venue_ids {
        report.audited += 1;
        match audit_venue(store, locks, &venue_id, now) {
            Ok(Some(LivenessTransition::Disconnected { instances })) => {
                report.disconnected += 1;
                report.instances_disconnected += instances;
            }
            Ok(Some(LivenessTransition::Reconnected)) => report.reconnected += 1,
            Ok(None) => {}
            Err(e) => report.errors.push(format!("venue {}: {}", venue_id, e)),
        }
    }

    report
}

// Audit-trail writes never fail the audit itself
fn append_activity(store: &dyn VenueStore, entry: NewActivityEntry) {
    if let Err(e) = store.append_activity(&entry) {
        warn!("Failed to append liveness activity entry: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue_store::{PlayerInstance, SqliteVenueStore, Venue};
    use tempfile::tempdir;

    fn make_store() -> (tempfile::TempDir, SqliteVenueStore, VenueLocks) {
        let dir = tempdir().unwrap();
        let store = SqliteVenueStore::new(dir.path().join("venue.db")).unwrap();
        (dir, store, VenueLocks::new())
    }

    fn seed_venue(store: &SqliteVenueStore, id: &str, connected: bool, heartbeat_age_minutes: Option<i64>) {
        let now = Utc::now();
        let mut venue = Venue::new(id.to_string(), "owner".to_string(), now);
        venue.player_connected = connected;
        venue.last_heartbeat_at = heartbeat_age_minutes.map(|m| now - Duration::minutes(m));
        store.create_venue(&venue).unwrap();
    }

    #[test]
    fn stale_connected_venue_is_disconnected_with_cascade() {
        let (_dir, store, locks) = make_store();
        let now = Utc::now();
        seed_venue(&store, "v1", true, Some(6));
        store
            .upsert_instance(&PlayerInstance::connected(
                "i1".to_string(),
                "v1".to_string(),
                now,
            ))
            .unwrap();

        let transition = audit_venue(&store, &locks, "v1", now).unwrap();
        assert_eq!(
            transition,
            Some(LivenessTransition::Disconnected { instances: 1 })
        );

        let venue = store.venue_by_id("v1").unwrap().unwrap();
        assert!(!venue.player_connected);
        assert!(venue.disconnected_at.is_some());
        let instance = store.instance_by_id("i1").unwrap().unwrap();
        assert!(!instance.is_connected);
    }

    #[test]
    fn missing_heartbeat_counts_as_infinite_age() {
        let (_dir, store, locks) = make_store();
        seed_venue(&store, "v1", true, None);

        let transition = audit_venue(&store, &locks, "v1", Utc::now()).unwrap();
        assert!(matches!(
            transition,
            Some(LivenessTransition::Disconnected { .. })
        ));
    }

    #[test]
    fn fresh_disconnected_venue_reconnects() {
        let (_dir, store, locks) = make_store();
        seed_venue(&store, "v1", false, Some(1));

        let transition = audit_venue(&store, &locks, "v1", Utc::now()).unwrap();
        assert_eq!(transition, Some(LivenessTransition::Reconnected));

        let venue = store.venue_by_id("v1").unwrap().unwrap();
        assert!(venue.player_connected);
        assert!(venue.reconnected_at.is_some());
    }

    #[test]
    fn audit_is_level_triggered() {
        let (_dir, store, locks) = make_store();
        let now = Utc::now();
        seed_venue(&store, "v1", true, Some(6));

        // First pass flips the state, second pass sees no boundary crossing
        assert!(audit_venue(&store, &locks, "v1", now).unwrap().is_some());
        assert!(audit_venue(&store, &locks, "v1", now).unwrap().is_none());
    }

    #[test]
    fn connected_fresh_venue_is_untouched() {
        let (_dir, store, locks) = make_store();
        seed_venue(&store, "v1", true, Some(1));
        assert!(audit_venue(&store, &locks, "v1", Utc::now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn disconnect_then_fresh_heartbeat_reconnects() {
        let (_dir, store, locks) = make_store();
        let now = Utc::now();
        seed_venue(&store, "v1", true, Some(6));

        audit_venue(&store, &locks, "v1", now).unwrap();

        // A fresh heartbeat arrives
        let mut venue = store.venue_by_id("v1").unwrap().unwrap();
        venue.last_heartbeat_at = Some(now);
        store.update_venue(&venue).unwrap();

        let transition = audit_venue(&store, &locks, "v1", now).unwrap();
        assert_eq!(transition, Some(LivenessTransition::Reconnected));
        assert!(store.venue_by_id("v1").unwrap().unwrap().player_connected);
    }

    #[test]
    fn audit_all_reports_counts_and_respects_page_size() {
        let (_dir, store, locks) = make_store();
        seed_venue(&store, "a-stale", true, Some(10));
        seed_venue(&store, "b-fresh", false, Some(1));
        seed_venue(&store, "c-quiet", false, None);

        let report = audit_all(&store, &locks, 10, Utc::now());
        assert_eq!(report.audited, 3);
        assert_eq!(report.disconnected, 1);
        assert_eq!(report.reconnected, 1);
        assert!(report.errors.is_empty());

        let bounded = audit_all(&store, &locks, 2, Utc::now());
        assert_eq!(bounded.audited, 2);
    }
}
