//! Core functionality for the Causeway join orchestrator.
//!
//! This crate provides the error taxonomy, configuration, logging, and time
//! utilities shared across the Causeway workspace.

pub mod config;
pub mod error;
pub mod logging;
pub mod time;

pub use config::{
    Config, DeployConfig, RegistryConfig, ServerConfig, SigningConfig, StoreConfig, TokenConfig,
};
pub use error::{Error, Result};
pub use time::{hours_to_ms, now_ms, secs_to_ms};
