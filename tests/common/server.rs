//! Test server lifecycle management.
//!
//! Each test gets an isolated server on a random port backed by its own
//! temporary SQLite database.

use djamms_venue_server::maintenance::{MaintenanceSweep, SweepSettings};
use djamms_venue_server::server::server::make_app;
use djamms_venue_server::server::{RequestsLoggingLevel, ServerConfig};
use djamms_venue_server::venue_locks::VenueLocks;
use djamms_venue_server::venue_store::{SqliteVenueStore, VenueStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with an isolated database.
///
/// Dropping it shuts the server down and removes the temp directory.
pub struct TestServer {
    /// Base URL for requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Store handle for direct seeding and assertions.
    pub store: Arc<dyn VenueStore>,

    _temp_db_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a server on a random port and waits until it answers.
    pub async fn spawn() -> Self {
        let temp_db_dir = TempDir::new().expect("Failed to create temp dir");
        let store: Arc<dyn VenueStore> = Arc::new(
            SqliteVenueStore::new(temp_db_dir.path().join("venue.db"))
                .expect("Failed to open venue store"),
        );
        let locks = Arc::new(VenueLocks::new());
        let sweep = Arc::new(MaintenanceSweep::new(
            store.clone(),
            locks.clone(),
            SweepSettings::default(),
        ));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener.local_addr().expect("No local address").port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
        };
        let app = make_app(config, store.clone(), locks, sweep);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server crashed");
        });

        let server = Self {
            base_url,
            store,
            _temp_db_dir: temp_db_dir,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_until_ready().await;
        server
    }

    async fn wait_until_ready(&self) {
        let client = reqwest::Client::new();
        for _ in 0..50 {
            if let Ok(response) = client.get(&self.base_url).send().await {
                if response.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Server did not become ready in time");
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
