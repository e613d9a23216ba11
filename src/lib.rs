//! DJAMMS Venue Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod background_jobs;
pub mod config;
pub mod maintenance;
pub mod playback;
pub mod server;
pub mod sqlite_persistence;
pub mod venue_locks;
pub mod venue_store;

// Re-export commonly used types for convenience
pub use server::{run_server, RequestsLoggingLevel};
pub use venue_locks::VenueLocks;
pub use venue_store::{SqliteVenueStore, VenueStore};
