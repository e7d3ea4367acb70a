//! Service-wide error taxonomy.
//!
//! Every component maps its failures onto this one enum so the gateway can
//! translate outcomes uniformly. Input validation errors surface
//! synchronously to the caller; concurrency races are resolved inside the
//! store and only reach this taxonomy when policy forbids the resolution
//! (e.g. an active-token conflict without `force`).

use thiserror::Error;

/// Core error type for Causeway
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or out-of-range input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An active token already exists and force was not permitted
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unknown device or token identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation is illegal for the current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Join report references a superseded token generation
    #[error("Stale token: {0}")]
    StaleToken(String),

    /// Caller identity rejected by the outer auth layer
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Persistence layer failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Token signing or verification failure
    #[error("Signing error: {0}")]
    Signing(String),

    /// Control-plane submission failure
    #[error("Deployment error: {0}")]
    Deployment(String),

    /// Configuration load or validation failure
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures of the caller's making (4xx at the HTTP surface).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidRequest(_)
                | Error::Conflict(_)
                | Error::NotFound(_)
                | Error::InvalidState(_)
                | Error::StaleToken(_)
                | Error::Unauthorized(_)
        )
    }
}
