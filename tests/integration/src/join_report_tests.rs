//! Join report handling: duplicate absorption, stale-token rejection,
//! failure retry semantics, and the exactly-once deployment trigger.

use std::time::Duration;

use axum::http::StatusCode;
use causeway_join::deployment_name;

use crate::test_utils::TestApp;

async fn issue_and_poll(app: &TestApp, device_id: &str) -> String {
    app.register(device_id).await;
    let body = app.generate_token(device_id, 1, false).await;
    let token_id = body["tokenId"].as_str().unwrap().to_string();
    let (status, _) = app.get(&format!("/get-token/{device_id}")).await;
    assert_eq!(status, StatusCode::OK);
    token_id
}

#[tokio::test]
async fn test_duplicate_success_reports_deploy_exactly_once() {
    let app = TestApp::spawn().await;
    let token_id = issue_and_poll(&app, "edge-1").await;
    let name = deployment_name("edge-1");

    let (status, body) = app.report_join("edge-1", &token_id, "success").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["accepted"], true);

    assert!(
        app.control_plane
            .wait_for_applies(&name, 1, Duration::from_secs(3))
            .await,
        "first success must submit the deployment"
    );

    // The duplicate is accepted but absorbed.
    let (status, body) = app.report_join("edge-1", &token_id, "success").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], true);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(app.control_plane.apply_count(&name).await, 1);

    let (_, device) = app.get("/device/edge-1").await;
    assert_eq!(device["state"], "joined");
    assert_eq!(device["deployment"]["status"], "submitted");

    // Both reports landed in the audit trail.
    let store = app.store.lock().await;
    assert_eq!(store.join_attempts("edge-1").unwrap().len(), 2);
}

#[tokio::test]
async fn test_stale_report_leaves_device_and_token_untouched() {
    let app = TestApp::spawn().await;
    app.register("edge-2").await;

    let first = app.generate_token("edge-2", 1, false).await;
    let old_id = first["tokenId"].as_str().unwrap().to_string();
    let second = app.generate_token("edge-2", 1, true).await;
    let current_id = second["tokenId"].as_str().unwrap().to_string();

    let (status, body) = app.report_join("edge-2", &old_id, "success").await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "stale_token");

    // Device still waits on the current token; nothing was deployed.
    let (_, device) = app.get("/device/edge-2").await;
    assert_eq!(device["state"], "join_pending");
    assert_eq!(device["currentTokenId"], current_id.as_str());
    assert!(app.control_plane.applies().await.is_empty());

    // The current token remains usable.
    let (status, body) = app.report_join("edge-2", &current_id, "success").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (_, device) = app.get("/device/edge-2").await;
    assert_eq!(device["state"], "joined");
}

#[tokio::test]
async fn test_failure_keeps_token_issued_for_retry() {
    let app = TestApp::spawn().await;
    let token_id = issue_and_poll(&app, "edge-3").await;

    let (status, body) = app.report_join("edge-3", &token_id, "failure").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["accepted"], true);

    let (_, device) = app.get("/device/edge-3").await;
    assert_eq!(device["state"], "failed");

    // The token was not consumed; the agent can retry with it.
    let (status, body) = app.get("/get-token/edge-3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "issued");

    let (status, _) = app.report_join("edge-3", &token_id, "success").await;
    assert_eq!(status, StatusCode::OK);
    let (_, device) = app.get("/device/edge-3").await;
    assert_eq!(device["state"], "joined");
}

#[tokio::test]
async fn test_failure_after_success_cannot_regress_the_join() {
    let app = TestApp::spawn().await;
    let token_id = issue_and_poll(&app, "edge-4").await;

    let (status, _) = app.report_join("edge-4", &token_id, "success").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.report_join("edge-4", &token_id, "failure").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");

    let (_, device) = app.get("/device/edge-4").await;
    assert_eq!(device["state"], "joined");
}

#[tokio::test]
async fn test_report_for_unknown_device_is_not_found() {
    let app = TestApp::spawn().await;
    let (status, body) = app.report_join("ghost", "some-token", "success").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_rejected_reports_still_reach_the_audit_trail() {
    let app = TestApp::spawn().await;
    app.register("edge-5").await;

    let first = app.generate_token("edge-5", 1, false).await;
    let old_id = first["tokenId"].as_str().unwrap().to_string();
    app.generate_token("edge-5", 1, true).await;

    let (status, _) = app.report_join("edge-5", &old_id, "success").await;
    assert_eq!(status, StatusCode::GONE);

    let store = app.store.lock().await;
    let attempts = store.join_attempts("edge-5").unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].token_id, old_id);
}
