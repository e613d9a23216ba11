use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use djamms_venue_server::background_jobs::{
    jobs::{ConnectionAuditJob, MaintenanceSweepJob},
    JobContext, JobScheduler,
};
use djamms_venue_server::config::{AppConfig, CliConfig, FileConfig};
use djamms_venue_server::maintenance::MaintenanceSweep;
use djamms_venue_server::server::{run_server, RequestsLoggingLevel, ServerConfig};
use djamms_venue_server::venue_locks::VenueLocks;
use djamms_venue_server::venue_store::{SqliteVenueStore, VenueStore};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the venue SQLite database.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to an optional TOML config file. File values override CLI values.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3080)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Minutes between full maintenance sweeps.
    #[clap(long, default_value_t = 60)]
    pub sweep_interval_minutes: u64,

    /// Minutes between heartbeat connection audits.
    #[clap(long, default_value_t = 1)]
    pub connection_audit_interval_minutes: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = cli_args.config.as_ref().map(FileConfig::load).transpose()?;
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir,
        port: cli_args.port,
        logging_level: cli_args.logging_level,
        sweep_interval_minutes: cli_args.sweep_interval_minutes,
        connection_audit_interval_minutes: cli_args.connection_audit_interval_minutes,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening venue database at {:?}...", config.venue_db_path());
    let venue_store: Arc<dyn VenueStore> =
        Arc::new(SqliteVenueStore::new(config.venue_db_path())?);
    let venue_locks = Arc::new(VenueLocks::new());
    let sweep = Arc::new(MaintenanceSweep::new(
        venue_store.clone(),
        venue_locks.clone(),
        config.maintenance.clone(),
    ));

    let shutdown_token = CancellationToken::new();

    let job_context = JobContext::new(
        shutdown_token.clone(),
        venue_store.clone(),
        venue_locks.clone(),
    );
    let mut scheduler =
        JobScheduler::new(venue_store.clone(), shutdown_token.clone(), job_context);
    scheduler.register_job(Arc::new(MaintenanceSweepJob::new(
        config.sweep_interval_minutes,
        config.maintenance.clone(),
    )));
    scheduler.register_job(Arc::new(ConnectionAuditJob::new(
        config.connection_audit_interval_minutes,
        config.maintenance.venue_page_size,
    )));
    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            signal_token.cancel();
        }
    });

    let server_config = ServerConfig {
        port: config.port,
        requests_logging_level: config.logging_level.clone(),
    };

    info!("Ready to serve at port {}!", config.port);
    run_server(
        server_config,
        venue_store,
        venue_locks,
        sweep,
        shutdown_token.clone(),
    )
    .await?;

    shutdown_token.cancel();
    let _ = scheduler_handle.await;
    Ok(())
}
