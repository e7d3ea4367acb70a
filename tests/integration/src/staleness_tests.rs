//! Time-driven transitions: staleness detection, heartbeat recovery,
//! join timeouts, and the periodic token-expiry sweep.

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use causeway_core::now_ms;
use causeway_store::{Token, TokenStatus};

use crate::test_utils::TestApp;

fn planted_token(device_id: &str, issued_at_ms: u64, expires_at_ms: u64) -> Token {
    Token {
        id: Uuid::new_v4().to_string(),
        device_id: device_id.to_string(),
        node_name: format!("{device_id}-node"),
        signed_value: format!("signed-{}", Uuid::new_v4()),
        issued_at_ms,
        expires_at_ms,
        status: TokenStatus::Pending,
    }
}

#[tokio::test]
async fn test_silent_joined_device_goes_stale_and_recovers_on_heartbeat() {
    let app = TestApp::spawn().await;
    app.register("edge-1").await;
    let body = app.generate_token("edge-1", 1, false).await;
    let token_id = body["tokenId"].as_str().unwrap().to_string();
    let (status, _) = app.report_join("edge-1", &token_id, "success").await;
    assert_eq!(status, StatusCode::OK);

    // One sweep past the staleness window finds the silence.
    let window_ms = app.config.registry.staleness_window_secs * 1_000;
    app.sweeper().tick(now_ms() + window_ms + 60_000).await.unwrap();

    let (_, device) = app.get("/device/edge-1").await;
    assert_eq!(device["state"], "stale");

    // The next heartbeat brings it back. Stamped slightly ahead so it is
    // strictly newer than the floor the join success set.
    let (status, body) = app
        .post(
            "/heartbeat",
            json!({ "deviceId": "edge-1", "timestamp": now_ms() + 1_000 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, device) = app.get("/device/edge-1").await;
    assert_eq!(device["state"], "joined");
}

#[tokio::test]
async fn test_join_pending_device_fails_when_its_token_times_out() {
    let app = TestApp::spawn().await;
    app.register("edge-2").await;

    let now = now_ms();
    let token = planted_token("edge-2", now - 600_000, now - 1_000);
    {
        let mut store = app.store.lock().await;
        store.issue_token(&token, false).unwrap();
    }
    let (_, device) = app.get("/device/edge-2").await;
    assert_eq!(device["state"], "join_pending");

    app.sweeper().tick(now).await.unwrap();

    let (_, device) = app.get("/device/edge-2").await;
    assert_eq!(device["state"], "failed");

    // A late report against the lapsed token cannot resurrect the join.
    let (status, body) = app.report_join("edge-2", &token.id, "success").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");
}

#[tokio::test]
async fn test_sweep_expires_unclaimed_pending_tokens() {
    let app = TestApp::spawn().await;
    app.register("edge-3").await;

    let now = now_ms();
    let token = planted_token("edge-3", now - 7_200_000, now - 3_600_000);
    {
        let mut store = app.store.lock().await;
        store.issue_token(&token, false).unwrap();
    }

    app.sweeper().tick(now).await.unwrap();

    // Read back at a pre-expiry instant: the sweep, not the lazy read,
    // must have persisted the transition.
    let mut store = app.store.lock().await;
    let stored = store
        .get_token(&token.id, token.issued_at_ms)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TokenStatus::Expired);
}

#[tokio::test]
async fn test_spawned_sweeper_drives_staleness_in_real_time() {
    let app = TestApp::spawn_with(|config| {
        config.registry.staleness_window_secs = 1;
    })
    .await;
    app.register("edge-4").await;
    let body = app.generate_token("edge-4", 1, false).await;
    let token_id = body["tokenId"].as_str().unwrap().to_string();
    let (status, _) = app.report_join("edge-4", &token_id, "success").await;
    assert_eq!(status, StatusCode::OK);

    let handle = app
        .sweeper()
        .with_interval(Duration::from_millis(100))
        .spawn();

    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let (_, device) = app.get("/device/edge-4").await;
    assert_eq!(device["state"], "stale");

    let (status, _) = app
        .post("/heartbeat", json!({ "deviceId": "edge-4", "timestamp": now_ms() }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, device) = app.get("/device/edge-4").await;
    assert_eq!(device["state"], "joined");

    tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
        .await
        .expect("sweeper must stop promptly on shutdown");
}

#[tokio::test]
async fn test_heartbeats_are_non_decreasing() {
    let app = TestApp::spawn().await;
    app.register("edge-5").await;

    let now = now_ms();
    let (status, _) = app
        .post("/heartbeat", json!({ "deviceId": "edge-5", "timestamp": now }))
        .await;
    assert_eq!(status, StatusCode::OK);

    // An older, retried heartbeat is absorbed without lowering the floor.
    let (status, _) = app
        .post(
            "/heartbeat",
            json!({ "deviceId": "edge-5", "timestamp": now - 120_000 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, device) = app.get("/device/edge-5").await;
    assert_eq!(device["lastHeartbeat"].as_u64().unwrap(), now);

    // Heartbeats stamped too far in the future are malformed input.
    let skew_ms = app.config.registry.heartbeat_max_skew_secs * 1_000;
    let (status, body) = app
        .post(
            "/heartbeat",
            json!({ "deviceId": "edge-5", "timestamp": now_ms() + skew_ms + 60_000 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}
