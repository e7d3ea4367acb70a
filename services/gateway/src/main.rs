use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{info, warn};

use causeway_core::config::Config;
use causeway_core::logging;
use causeway_gateway::{build_router, AppState};
use causeway_join::{ControlPlaneClient, DeploymentPool};
use causeway_registry::StalenessSweeper;
use causeway_store::Store;
use causeway_token::TokenSigner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("CAUSEWAY_LOG_FORMAT").as_deref() == Ok("json") {
        logging::init_json();
    } else {
        logging::init();
    }

    let config = match std::env::var("CAUSEWAY_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading configuration");
            Config::from_file(&path)?
        }
        Err(_) => {
            warn!("CAUSEWAY_CONFIG not set, using default configuration");
            Config::default_config()
        }
    };

    let store = Arc::new(Mutex::new(Store::open(&config.store.db_path)?));

    let signer = match &config.signing.key_path {
        Some(path) => TokenSigner::load_or_generate(path)?,
        None => TokenSigner::generate(),
    };
    info!(key_id = %signer.key_id(), "Token signing key ready");

    let client = ControlPlaneClient::new(&config.deploy)?;
    let pool = DeploymentPool::spawn(
        Arc::clone(&store),
        client,
        config.deploy.workers,
        config.deploy.queue_depth,
    );

    let sweeper = StalenessSweeper::new(Arc::clone(&store), &config.registry).spawn();

    let state = Arc::new(AppState::new(&config, store, signer, pool.handle()));
    let app = build_router(state);

    let bind_addr = format!("{}:{}", config.server.bind_addr, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Causeway gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    // Stop the time-driven sweep first, then let queued deployment
    // submissions drain; neither can corrupt device state mid-flight.
    sweeper.shutdown().await;
    pool.shutdown().await;
    info!("Causeway gateway stopped");

    Ok(())
}
