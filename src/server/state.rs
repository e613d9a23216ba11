use axum::extract::FromRef;

use crate::maintenance::MaintenanceSweep;
use crate::venue_locks::VenueLocks;
use crate::venue_store::VenueStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedVenueStore = Arc<dyn VenueStore>;
pub type GuardedVenueLocks = Arc<VenueLocks>;
pub type GuardedSweep = Arc<MaintenanceSweep>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub venue_store: GuardedVenueStore,
    pub venue_locks: GuardedVenueLocks,
    pub sweep: GuardedSweep,
}

impl FromRef<ServerState> for GuardedVenueStore {
    fn from_ref(input: &ServerState) -> Self {
        input.venue_store.clone()
    }
}

impl FromRef<ServerState> for GuardedVenueLocks {
    fn from_ref(input: &ServerState) -> Self {
        input.venue_locks.clone()
    }
}

impl FromRef<ServerState> for GuardedSweep {
    fn from_ref(input: &ServerState) -> Self {
        input.sweep.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
