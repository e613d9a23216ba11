use crate::venue_locks::VenueLocks;
use crate::venue_store::VenueStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Access to the venue document store.
    pub store: Arc<dyn VenueStore>,

    /// Per-venue write locks shared with the HTTP handlers.
    pub locks: Arc<VenueLocks>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        store: Arc<dyn VenueStore>,
        locks: Arc<VenueLocks>,
    ) -> Self {
        Self {
            cancellation_token,
            store,
            locks,
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
