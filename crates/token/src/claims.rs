//! Claims carried inside a signed join token.

use serde::{Deserialize, Serialize};

use causeway_core::{Error, Result};

/// The signed content of a join token.
///
/// Field order is part of the signing contract: `serialize_for_signing`
/// emits the fields in declaration order, so equal claims always produce
/// equal bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Unique token identifier (uuid v4)
    pub token_id: String,
    /// Device the token authorizes
    pub device_id: String,
    /// Cluster node name the device joins as
    pub node_name: String,
    /// Issuance timestamp (Unix milliseconds)
    pub issued_at_ms: u64,
    /// Expiry timestamp (Unix milliseconds)
    pub expires_at_ms: u64,
}

impl TokenClaims {
    /// Structural validation. TTL bounds are the issuer's policy; expiry
    /// against wall-clock time is the store's concern.
    pub fn validate(&self) -> Result<()> {
        if self.token_id.is_empty() {
            return Err(Error::InvalidRequest(
                "token_id must not be empty".to_string(),
            ));
        }
        if self.device_id.is_empty() {
            return Err(Error::InvalidRequest(
                "device_id must not be empty".to_string(),
            ));
        }
        if self.node_name.is_empty() {
            return Err(Error::InvalidRequest(
                "node_name must not be empty".to_string(),
            ));
        }
        if self.expires_at_ms <= self.issued_at_ms {
            return Err(Error::InvalidRequest(format!(
                "expiry {} must come after issuance {}",
                self.expires_at_ms, self.issued_at_ms
            )));
        }
        Ok(())
    }

    /// Deterministic serialized bytes for signing.
    pub fn serialize_for_signing(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::Signing(format!("claims serialization failed: {e}")))
    }
}
