//! Configuration management for Causeway.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub tokens: TokenConfig,
    pub signing: SigningConfig,
    pub registry: RegistryConfig,
    pub deploy: DeployConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub min_ttl_hours: u32,
    pub max_ttl_hours: u32,
    pub default_ttl_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Hex-encoded Ed25519 seed file. Generated on first boot when absent.
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Maximum heartbeat gap before a Joined device is considered stale.
    pub staleness_window_secs: u64,
    /// Cadence of the staleness/expiry sweep.
    pub sweep_interval_secs: u64,
    /// Heartbeats stamped further than this in the future are rejected.
    pub heartbeat_max_skew_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Control-plane API base, e.g. "http://control-plane:6443/apis/causeway".
    pub api_base: String,
    pub namespace: String,
    /// Agent image applied by the post-join deployment.
    pub agent_image: String,
    pub workers: usize,
    pub queue_depth: usize,
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate().map_err(|e| anyhow::anyhow!(e))?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "0.0.0.0".to_string(),
                port: 8440,
            },
            store: StoreConfig {
                db_path: "data/causeway.db".to_string(),
            },
            tokens: TokenConfig {
                min_ttl_hours: 1,
                max_ttl_hours: 72,
                default_ttl_hours: 24,
            },
            signing: SigningConfig {
                key_path: Some("data/signing.key".to_string()),
            },
            registry: RegistryConfig {
                staleness_window_secs: 300,
                sweep_interval_secs: 30,
                heartbeat_max_skew_secs: 30,
            },
            deploy: DeployConfig {
                api_base: "http://127.0.0.1:6440".to_string(),
                namespace: "edge-system".to_string(),
                agent_image: "registry.local/causeway/edge-agent:stable".to_string(),
                workers: 2,
                queue_depth: 64,
                request_timeout_secs: 10,
            },
        }
    }

    /// Reject configurations the rest of the system cannot honor.
    pub fn validate(&self) -> Result<(), String> {
        if self.tokens.min_ttl_hours == 0 {
            return Err("tokens.min_ttl_hours must be at least 1".to_string());
        }
        if self.tokens.min_ttl_hours > self.tokens.max_ttl_hours {
            return Err(format!(
                "tokens.min_ttl_hours {} exceeds tokens.max_ttl_hours {}",
                self.tokens.min_ttl_hours, self.tokens.max_ttl_hours
            ));
        }
        if self.tokens.default_ttl_hours < self.tokens.min_ttl_hours
            || self.tokens.default_ttl_hours > self.tokens.max_ttl_hours
        {
            return Err(format!(
                "tokens.default_ttl_hours {} outside [{}, {}]",
                self.tokens.default_ttl_hours,
                self.tokens.min_ttl_hours,
                self.tokens.max_ttl_hours
            ));
        }
        if self.registry.sweep_interval_secs == 0 {
            return Err("registry.sweep_interval_secs must be nonzero".to_string());
        }
        if self.registry.staleness_window_secs == 0 {
            return Err("registry.staleness_window_secs must be nonzero".to_string());
        }
        if self.deploy.workers == 0 {
            return Err("deploy.workers must be nonzero".to_string());
        }
        if self.deploy.queue_depth == 0 {
            return Err("deploy.queue_depth must be nonzero".to_string());
        }
        Ok(())
    }
}
