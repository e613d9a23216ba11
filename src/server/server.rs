use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::maintenance::MaintenanceSweep;
use crate::playback::{self, PlaybackCommand, PlaybackError, PlayerEvent};
use crate::venue_locks::VenueLocks;
use crate::venue_store::{NewActivityEntry, PlayerInstance, Venue, VenueStore};

use super::{log_requests, state::*, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CommandBody {
    pub command: String,
    pub venue_id: String,
    pub user_id: Option<String>,
    /// Remaining fields are the command-specific payload
    #[serde(flatten)]
    pub data: serde_json::Map<String, JsonValue>,
}

#[derive(Serialize)]
struct CommandResponse {
    success: bool,
    data: JsonValue,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PlayerEventBody {
    pub venue_id: String,
    pub event_type: String,
    #[serde(default)]
    pub event_data: JsonValue,
    pub player_instance_id: Option<String>,
}

#[derive(Serialize)]
struct EventResponse {
    success: bool,
    message: String,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CreateVenueBody {
    pub venue_id: Option<String>,
    pub owner_id: String,
}

#[derive(Deserialize, Debug)]
struct ActivityParams {
    limit: Option<usize>,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(json!({ "success": false, "error": error }))).into_response()
}

fn playback_error_response(err: &PlaybackError) -> Response {
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::BAD_REQUEST
    };
    error_response(status, err.to_string())
}

fn venue_snapshot(venue: &Venue) -> JsonValue {
    json!({
        "venueId": venue.venue_id,
        "state": venue.state,
        "nowPlaying": venue.now_playing,
        "priorityQueueLength": venue.priority_queue.len(),
        "activeQueueLength": venue.active_queue.len(),
        "playerConnected": venue.player_connected,
    })
}

// The audit trail never fails the primary operation
fn append_activity_best_effort(store: &dyn VenueStore, entry: &NewActivityEntry) {
    if let Err(e) = store.append_activity(entry) {
        warn!(
            "Failed to append activity entry for venue {}: {}",
            entry.venue_id, e
        );
    }
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    Json(stats)
}

async fn post_command(State(state): State<ServerState>, Json(body): Json<CommandBody>) -> Response {
    let guard = state.venue_locks.lock_venue(&body.venue_id);
    let _held = guard.enter();

    let venue = match state.venue_store.venue_by_id(&body.venue_id) {
        Ok(Some(venue)) => venue,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("venue {} not found", body.venue_id),
            )
        }
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };

    let payload = JsonValue::Object(body.data);
    let command = match PlaybackCommand::parse(&body.command, &payload) {
        Ok(command) => command,
        Err(err) => return playback_error_response(&err),
    };

    // loadPlaylist needs the referenced playlist document up front
    let playlist = match &command {
        PlaybackCommand::LoadPlaylist { playlist_id } => {
            match state.venue_store.playlist_by_id(playlist_id) {
                Ok(playlist) => playlist,
                Err(err) => {
                    return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                }
            }
        }
        _ => None,
    };

    let transition = match playback::apply_command(
        &venue,
        &command,
        playlist.as_ref(),
        body.user_id.as_deref(),
        Utc::now(),
    ) {
        Ok(transition) => transition,
        Err(err) => return playback_error_response(&err),
    };

    if let Err(err) = state.venue_store.update_venue(&transition.venue) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
    }
    append_activity_best_effort(&*state.venue_store, &transition.activity);

    Json(CommandResponse {
        success: true,
        data: venue_snapshot(&transition.venue),
        timestamp: Utc::now(),
    })
    .into_response()
}

async fn post_player_event(
    State(state): State<ServerState>,
    Json(body): Json<PlayerEventBody>,
) -> Response {
    let guard = state.venue_locks.lock_venue(&body.venue_id);
    let _held = guard.enter();

    let venue = match state.venue_store.venue_by_id(&body.venue_id) {
        Ok(Some(venue)) => venue,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("venue {} not found", body.venue_id),
            )
        }
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };

    let event = match PlayerEvent::parse(&body.event_type, &body.event_data) {
        Ok(event) => event,
        Err(err) => return playback_error_response(&err),
    };

    let now = Utc::now();
    let transition = playback::apply_player_event(
        &venue,
        &event,
        body.player_instance_id.as_deref(),
        now,
    );

    if let Err(err) = state.venue_store.update_venue(&transition.venue) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
    }

    // A heartbeat also upserts the reporting player instance
    if event == PlayerEvent::Heartbeat {
        if let Some(instance_id) = body.player_instance_id.as_deref() {
            if let Err(err) = touch_instance(&*state.venue_store, instance_id, &body.venue_id, now)
            {
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
            }
        }
    }

    append_activity_best_effort(&*state.venue_store, &transition.activity);

    Json(EventResponse {
        success: true,
        message: format!("{} processed", event.name()),
        timestamp: Utc::now(),
    })
    .into_response()
}

/// Creates the instance on first heartbeat, otherwise refreshes its
/// heartbeat stamp and reconnects it.
fn touch_instance(
    store: &dyn VenueStore,
    instance_id: &str,
    venue_id: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let instance = match store.instance_by_id(instance_id)? {
        Some(mut instance) => {
            instance.is_connected = true;
            instance.last_heartbeat_at = Some(now);
            instance.heartbeat_count += 1;
            instance.disconnected_at = None;
            instance
        }
        None => PlayerInstance::connected(instance_id.to_string(), venue_id.to_string(), now),
    };
    store.upsert_instance(&instance)
}

async fn post_venue(
    State(state): State<ServerState>,
    Json(body): Json<CreateVenueBody>,
) -> Response {
    let venue_id = body
        .venue_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let guard = state.venue_locks.lock_venue(&venue_id);
    let _held = guard.enter();

    match state.venue_store.venue_by_id(&venue_id) {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                format!("venue {} already exists", venue_id),
            )
        }
        Ok(None) => {}
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }

    let venue = Venue::new(venue_id, body.owner_id, Utc::now());
    if let Err(err) = state.venue_store.create_venue(&venue) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
    }

    append_activity_best_effort(
        &*state.venue_store,
        &NewActivityEntry::new("venue_created", &venue.venue_id, json!({})),
    );

    (StatusCode::CREATED, Json(venue)).into_response()
}

async fn get_venue(
    State(venue_store): State<GuardedVenueStore>,
    Path(id): Path<String>,
) -> Response {
    match venue_store.venue_by_id(&id) {
        Ok(Some(venue)) => Json(venue).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("venue {} not found", id)),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

async fn get_venue_activity(
    State(venue_store): State<GuardedVenueStore>,
    Path(id): Path<String>,
    Query(params): Query<ActivityParams>,
) -> Response {
    let limit = params.limit.unwrap_or(50).min(500);
    match venue_store.activity_for_venue(&id, limit) {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

async fn post_maintenance_run(State(sweep): State<GuardedSweep>) -> Response {
    let summary = match tokio::task::spawn_blocking(move || sweep.run()).await {
        Ok(summary) => summary,
        Err(err) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("sweep task failed: {}", err),
            )
        }
    };

    Json(json!({
        "success": true,
        "status": summary.status(),
        "results": summary,
    }))
    .into_response()
}

pub fn make_app(
    config: ServerConfig,
    venue_store: Arc<dyn VenueStore>,
    venue_locks: Arc<VenueLocks>,
    sweep: Arc<MaintenanceSweep>,
) -> Router {
    let state = ServerState {
        config,
        start_time: Instant::now(),
        venue_store,
        venue_locks,
        sweep,
    };

    let v1_routes: Router<ServerState> = Router::new()
        .route("/commands", post(post_command))
        .route("/player-events", post(post_player_event))
        .route("/maintenance/run", post(post_maintenance_run))
        .route("/venues", post(post_venue))
        .route("/venues/{id}", get(get_venue))
        .route("/venues/{id}/activity", get(get_venue_activity));

    Router::new()
        .route("/", get(home))
        .nest("/v1", v1_routes)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

pub async fn run_server(
    config: ServerConfig,
    venue_store: Arc<dyn VenueStore>,
    venue_locks: Arc<VenueLocks>,
    sweep: Arc<MaintenanceSweep>,
    shutdown_token: CancellationToken,
) -> anyhow::Result<()> {
    let port = config.port;
    let app = make_app(config, venue_store, venue_locks, sweep);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await?;
    Ok(())
}
