//! The full issue → poll → join → deploy scenario over the real HTTP
//! surface, with descriptor-level assertions against the mock control
//! plane.

use std::time::Duration;

use axum::http::StatusCode;
use causeway_join::deployment_name;
use causeway_store::DeviceState;

use crate::test_utils::TestApp;

#[tokio::test]
async fn test_full_join_lifecycle_over_http() {
    let app = TestApp::spawn().await;

    // Registration creates the device in Registered.
    app.register("edge-1").await;
    let (_, device) = app.get("/device/edge-1").await;
    assert_eq!(device["state"], "registered");

    // Issue a one-hour token.
    let issued = app.generate_token("edge-1", 1, false).await;
    assert_eq!(issued["deviceId"], "edge-1");
    assert_eq!(issued["nodeName"], "edge-1-node");
    let token_value = issued["token"].as_str().unwrap().to_string();
    let token_id = issued["tokenId"].as_str().unwrap().to_string();

    // The signed value carries verifiable claims for this device.
    {
        let mut issuer = app.state.issuer.lock().await;
        let claims = issuer.verify_value(&token_value).unwrap();
        assert_eq!(claims.token_id, token_id);
        assert_eq!(claims.device_id, "edge-1");
        assert_eq!(claims.node_name, "edge-1-node");
    }

    // The agent polls and receives the same token value.
    let (status, poll) = app.get("/get-token/edge-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(poll["status"], "pending");
    assert_eq!(poll["token"], token_value.as_str());

    // The join succeeds; the device is Joined and the token consumed.
    let (status, body) = app.report_join("edge-1", &token_id, "success").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["accepted"], true);

    let (_, device) = app.get("/device/edge-1").await;
    assert_eq!(device["state"], DeviceState::Joined.as_str());

    let (status, poll) = app.get("/get-token/edge-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(poll["status"], "not_found");

    // Exactly one deployment reaches the control plane, parameterized by
    // the device identity.
    let name = deployment_name("edge-1");
    assert!(
        app.control_plane
            .wait_for_applies(&name, 1, Duration::from_secs(3))
            .await
    );
    let applies = app.control_plane.applies().await;
    let (applied_name, descriptor) = &applies[0];
    assert_eq!(applied_name, &name);
    assert_eq!(descriptor["metadata"]["name"], name.as_str());
    assert_eq!(
        descriptor["metadata"]["namespace"],
        app.config.deploy.namespace.as_str()
    );
    assert_eq!(
        descriptor["metadata"]["labels"]["causeway.io/device-id"],
        "edge-1"
    );
    assert_eq!(
        descriptor["spec"]["template"]["spec"]["containers"][0]["image"],
        app.config.deploy.agent_image.as_str()
    );

    // The identical report again: accepted, state unchanged, no second
    // deployment.
    let (status, body) = app.report_join("edge-1", &token_id, "success").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], true);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(app.control_plane.apply_count(&name).await, 1);

    let (_, device) = app.get("/device/edge-1").await;
    assert_eq!(device["state"], "joined");
    assert_eq!(device["deployment"]["status"], "submitted");
}

#[tokio::test]
async fn test_reissue_after_join_restarts_the_cycle() {
    let app = TestApp::spawn().await;
    app.register("edge-2").await;

    let first = app.generate_token("edge-2", 1, false).await;
    let first_id = first["tokenId"].as_str().unwrap().to_string();
    app.report_join("edge-2", &first_id, "success").await;

    let name = deployment_name("edge-2");
    assert!(
        app.control_plane
            .wait_for_applies(&name, 1, Duration::from_secs(3))
            .await
    );

    // A fresh issuance puts the joined device back into JoinPending and
    // re-arms the deployment guard for the new generation.
    let second = app.generate_token("edge-2", 1, true).await;
    let second_id = second["tokenId"].as_str().unwrap().to_string();
    assert_ne!(second_id, first_id);

    let (_, device) = app.get("/device/edge-2").await;
    assert_eq!(device["state"], "join_pending");
    assert_eq!(device["deployment"]["status"], "none");

    let (status, _) = app.report_join("edge-2", &second_id, "success").await;
    assert_eq!(status, StatusCode::OK);

    // The second generation deploys again; idempotent overwrite at the
    // control plane, same deployment name.
    assert!(
        app.control_plane
            .wait_for_applies(&name, 2, Duration::from_secs(3))
            .await
    );
}
