//! Per-venue single-writer arbitration.
//!
//! The backing store offers per-document writes but no read-modify-write
//! synchronization, so two concurrent commands for the same venue could each
//! read the same document and silently drop the other's update. Handlers
//! acquire the venue's lock for the duration of read, transition and write;
//! different venues never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Registry of one mutex per venue, created on first use.
#[derive(Default)]
pub struct VenueLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Holds a venue's write lock for the lifetime of the guard.
pub struct VenueGuard {
    lock: Arc<Mutex<()>>,
}

impl VenueLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the write lock for a venue, blocking until it is free.
    pub fn lock_venue(&self, venue_id: &str) -> VenueGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap();
            locks
                .entry(venue_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        VenueGuard { lock }
    }

    /// Number of venues with a registered lock, for diagnostics.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().unwrap().is_empty()
    }
}

impl VenueGuard {
    /// Enters the critical section. The returned guard must be held across
    /// the whole read-modify-write of the venue document.
    pub fn enter(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap()
    }
}
