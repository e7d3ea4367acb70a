//! HTTP surface of the Causeway join orchestrator.
//!
//! Exposed as a library so integration tests can build the real router
//! against an in-memory wiring; the binary in `main.rs` adds config
//! loading, logging, and graceful shutdown around it.

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub mod error;
pub mod handlers;
pub mod state;

pub use state::AppState;

/// The full route table over a wired application state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/generate-token", post(handlers::generate_token))
        .route("/get-token/:device_id", get(handlers::get_token))
        .route("/execute-join", post(handlers::execute_join))
        .route("/register-device", post(handlers::register_device))
        .route("/heartbeat", post(handlers::heartbeat))
        .route("/device/:device_id", get(handlers::device_status))
        .with_state(state)
}
