//! HTTP surface of the orchestrator.
//!
//! Wire field names are camelCase. Polling responses are fully
//! self-describing: `/get-token` always answers 200 and carries a status
//! the agent can act on without any session state between polls.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use causeway_core::error::Error;
use causeway_core::time::now_ms;
use causeway_store::{Device, JoinOutcome, TokenStatus};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTokenRequest {
    pub device_id: String,
    pub node_name: String,
    pub ttl_hours: Option<u32>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteJoinRequest {
    pub device_id: String,
    pub token_id: String,
    /// "success" or "failure"
    pub status: String,
    /// Agent output captured in the join audit trail
    pub output: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    pub device_id: String,
    pub hostname: String,
    pub ip_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub device_id: String,
    /// Unix milliseconds as stamped by the device
    pub timestamp: u64,
}

pub async fn generate_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateTokenRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let token = {
        let mut issuer = state.issuer.lock().await;
        issuer
            .issue(&req.device_id, &req.node_name, req.ttl_hours, req.force)
            .await?
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "token": token.signed_value,
            "tokenId": token.id,
            "deviceId": token.device_id,
            "nodeName": token.node_name,
            "expiresAt": token.expires_at_ms,
        })),
    ))
}

/// The polling read path. Always 200; the body alone tells the agent what
/// to do next. The first read of a Pending token is its delivery: the
/// stored status moves to Issued while the response reports the status the
/// poll found. Consumed or absent tokens are `not_found` (nothing actionable
/// for the agent); an expired token reports `expired` without the value.
pub async fn get_token(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let now = now_ms();
    let mut store = state.store.lock().await;

    let Some(token) = store.current_token(&device_id, now)? else {
        return Ok(Json(json!({ "status": "not_found" })));
    };

    let body = match token.status {
        TokenStatus::Pending => {
            store.mark_delivered(&token.id)?;
            json!({
                "status": "pending",
                "token": token.signed_value,
                "tokenId": token.id,
            })
        }
        TokenStatus::Issued => json!({
            "status": "issued",
            "token": token.signed_value,
            "tokenId": token.id,
        }),
        TokenStatus::Expired => json!({ "status": "expired" }),
        TokenStatus::Consumed | TokenStatus::Revoked => json!({ "status": "not_found" }),
    };
    Ok(Json(body))
}

pub async fn execute_join(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExecuteJoinRequest>,
) -> Result<Json<Value>, ApiError> {
    let outcome = JoinOutcome::parse(&req.status).ok_or_else(|| {
        Error::InvalidRequest(format!(
            "status must be \"success\" or \"failure\", got \"{}\"",
            req.status
        ))
    })?;

    let mut reporter = state.reporter.lock().await;
    reporter
        .report(&req.device_id, &req.token_id, outcome, req.output.as_deref())
        .await?;

    Ok(Json(json!({ "accepted": true })))
}

pub async fn register_device(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterDeviceRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .registry
        .register(&req.device_id, &req.hostname, &req.ip_address)
        .await?;
    Ok(Json(json!({ "accepted": true })))
}

pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<Value>, ApiError> {
    state.registry.heartbeat(&req.device_id, req.timestamp).await?;
    Ok(Json(json!({ "accepted": true })))
}

pub async fn device_status(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let device = state.registry.device(&device_id).await?;
    Ok(Json(device_json(&device)))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "causeway-gateway",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

fn device_json(device: &Device) -> Value {
    json!({
        "deviceId": device.device_id,
        "nodeName": device.node_name,
        "ipAddress": device.ip_address,
        "state": device.state,
        "currentTokenId": device.current_token_id,
        "lastHeartbeat": device.last_heartbeat_ms,
        "registeredAt": device.registered_at_ms,
        "deployment": {
            "status": device.deployment.status,
            "detail": device.deployment.detail,
            "updatedAt": device.deployment.updated_at_ms,
        },
    })
}
