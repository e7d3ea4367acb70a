use std::sync::Arc;

use causeway_core::config::Config;
use causeway_join::{DeploymentHandle, JoinReporter};
use causeway_registry::DeviceRegistry;
use causeway_store::Store;
use causeway_token::{IssuePolicy, TokenIssuer};
use tokio::sync::Mutex;

/// Shared state behind every handler. The issuer and reporter carry their
/// own metrics so they sit behind mutexes; the registry is read-mostly and
/// locks the store only per call.
pub struct AppState {
    pub store: Arc<Mutex<Store>>,
    pub issuer: Arc<Mutex<TokenIssuer>>,
    pub registry: DeviceRegistry,
    pub reporter: Arc<Mutex<JoinReporter>>,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<Mutex<Store>>,
        signer: causeway_token::TokenSigner,
        deployments: DeploymentHandle,
    ) -> Self {
        let policy = IssuePolicy::from_config(&config.tokens);
        let issuer = TokenIssuer::new(Arc::clone(&store), signer, policy);
        let registry = DeviceRegistry::new(Arc::clone(&store), &config.registry);
        let reporter = JoinReporter::new(Arc::clone(&store), deployments);

        Self {
            store,
            issuer: Arc::new(Mutex::new(issuer)),
            registry,
            reporter: Arc::new(Mutex::new(reporter)),
        }
    }
}
