//! End-to-end tests for the player event endpoint.

mod common;

use common::fixtures::seed_venue;
use common::server::TestServer;
use serde_json::{json, Value};

async fn send_event(server: &TestServer, body: Value) -> (reqwest::StatusCode, Value) {
    let response = reqwest::Client::new()
        .post(server.url("/v1/player-events"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status();
    let body: Value = response.json().await.unwrap();
    (status, body)
}

#[tokio::test]
async fn heartbeat_creates_instance_and_stamps_venue() {
    let server = TestServer::spawn().await;
    seed_venue(&*server.store, "venue-1", &[], &[]);

    let (status, body) = send_event(
        &server,
        json!({
            "venueId": "venue-1",
            "eventType": "heartbeat",
            "playerInstanceId": "inst-1"
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert!(body["message"].as_str().unwrap().contains("heartbeat"));

    let venue = server.store.venue_by_id("venue-1").unwrap().unwrap();
    assert!(venue.last_heartbeat_at.is_some());
    assert_eq!(venue.active_player_instance_id.as_deref(), Some("inst-1"));

    let instance = server.store.instance_by_id("inst-1").unwrap().unwrap();
    assert!(instance.is_connected);
    assert_eq!(instance.heartbeat_count, 1);
    assert_eq!(instance.venue_id, "venue-1");
}

#[tokio::test]
async fn repeated_heartbeats_increment_instance_count() {
    let server = TestServer::spawn().await;
    seed_venue(&*server.store, "venue-1", &[], &[]);

    for _ in 0..3 {
        send_event(
            &server,
            json!({
                "venueId": "venue-1",
                "eventType": "heartbeat",
                "playerInstanceId": "inst-1"
            }),
        )
        .await;
    }

    let instance = server.store.instance_by_id("inst-1").unwrap().unwrap();
    assert_eq!(instance.heartbeat_count, 3);
}

#[tokio::test]
async fn heartbeat_without_instance_id_still_stamps_venue() {
    let server = TestServer::spawn().await;
    seed_venue(&*server.store, "venue-1", &[], &[]);

    let (status, _) = send_event(
        &server,
        json!({ "venueId": "venue-1", "eventType": "heartbeat" }),
    )
    .await;
    assert_eq!(status, 200);

    let venue = server.store.venue_by_id("venue-1").unwrap().unwrap();
    assert!(venue.last_heartbeat_at.is_some());
    assert!(venue.active_player_instance_id.is_none());
}

#[tokio::test]
async fn video_ended_advances_the_queue() {
    let server = TestServer::spawn().await;
    seed_venue(&*server.store, "venue-1", &["next-up"], &[]);

    let (status, _) = send_event(
        &server,
        json!({ "venueId": "venue-1", "eventType": "videoEnded" }),
    )
    .await;
    assert_eq!(status, 200);

    let venue = server.store.venue_by_id("venue-1").unwrap().unwrap();
    assert_eq!(venue.now_playing.video_id.as_deref(), Some("next-up"));
    assert!(venue.now_playing.is_playing);
    assert!(venue.priority_queue.is_empty());
}

#[tokio::test]
async fn state_change_updates_now_playing_snapshot() {
    let server = TestServer::spawn().await;
    seed_venue(&*server.store, "venue-1", &[], &[]);

    let (status, _) = send_event(
        &server,
        json!({
            "venueId": "venue-1",
            "eventType": "stateChange",
            "eventData": { "position": 42.5, "isPlaying": true }
        }),
    )
    .await;
    assert_eq!(status, 200);

    let venue = server.store.venue_by_id("venue-1").unwrap().unwrap();
    assert_eq!(venue.now_playing.current_time, 42.5);
    assert!(venue.now_playing.is_playing);
}

#[tokio::test]
async fn player_error_records_but_leaves_state() {
    let server = TestServer::spawn().await;
    seed_venue(&*server.store, "venue-1", &["A"], &[]);

    // Start playback first
    reqwest::Client::new()
        .post(server.url("/v1/commands"))
        .json(&json!({ "command": "skip", "venueId": "venue-1", "userId": "u1" }))
        .send()
        .await
        .unwrap();

    let (status, _) = send_event(
        &server,
        json!({
            "venueId": "venue-1",
            "eventType": "error",
            "eventData": { "message": "embed blocked" }
        }),
    )
    .await;
    assert_eq!(status, 200);

    let venue = server.store.venue_by_id("venue-1").unwrap().unwrap();
    assert_eq!(venue.state.as_str(), "playing");
    assert!(!venue.player_settings.player_ready);
    assert_eq!(
        venue.player_settings.last_error.as_deref(),
        Some("embed blocked")
    );
}

#[tokio::test]
async fn player_ready_marks_settings() {
    let server = TestServer::spawn().await;
    seed_venue(&*server.store, "venue-1", &[], &[]);

    send_event(
        &server,
        json!({ "venueId": "venue-1", "eventType": "playerReady" }),
    )
    .await;

    let venue = server.store.venue_by_id("venue-1").unwrap().unwrap();
    assert!(venue.player_settings.player_ready);
    assert!(venue.player_settings.last_ready_at.is_some());
}

#[tokio::test]
async fn unknown_event_type_is_rejected() {
    let server = TestServer::spawn().await;
    seed_venue(&*server.store, "venue-1", &[], &[]);

    let (status, body) = send_event(
        &server,
        json!({ "venueId": "venue-1", "eventType": "teleport" }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn event_for_missing_venue_is_not_found() {
    let server = TestServer::spawn().await;

    let (status, _) = send_event(
        &server,
        json!({ "venueId": "ghost", "eventType": "heartbeat" }),
    )
    .await;
    assert_eq!(status, 404);
}
