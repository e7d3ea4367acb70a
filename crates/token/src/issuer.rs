//! Token issuance: TTL policy, claims construction, signing, and the
//! delegated atomic store write.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use causeway_core::{hours_to_ms, now_ms, Error, Result, TokenConfig};
use causeway_store::{Store, Token, TokenStatus};

use crate::claims::TokenClaims;
use crate::signer::TokenSigner;

/// TTL bounds applied to issuance requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuePolicy {
    pub min_ttl_hours: u32,
    pub max_ttl_hours: u32,
    pub default_ttl_hours: u32,
}

impl IssuePolicy {
    pub fn from_config(cfg: &TokenConfig) -> Self {
        Self {
            min_ttl_hours: cfg.min_ttl_hours,
            max_ttl_hours: cfg.max_ttl_hours,
            default_ttl_hours: cfg.default_ttl_hours,
        }
    }

    /// Resolve a requested TTL against the policy bounds. `None` takes the
    /// default; out-of-range values are rejected rather than clamped.
    pub fn resolve_ttl_hours(&self, requested: Option<u32>) -> Result<u32> {
        let ttl = requested.unwrap_or(self.default_ttl_hours);
        if ttl < self.min_ttl_hours || ttl > self.max_ttl_hours {
            return Err(Error::InvalidRequest(format!(
                "ttlHours {ttl} outside the allowed range [{}, {}]",
                self.min_ttl_hours, self.max_ttl_hours
            )));
        }
        Ok(ttl)
    }
}

/// Issues signed join tokens, one active token per device.
pub struct TokenIssuer {
    store: Arc<Mutex<Store>>,
    signer: TokenSigner,
    policy: IssuePolicy,
}

impl TokenIssuer {
    pub fn new(store: Arc<Mutex<Store>>, signer: TokenSigner, policy: IssuePolicy) -> Self {
        Self {
            store,
            signer,
            policy,
        }
    }

    /// Issue a new token for a registered device.
    ///
    /// Validates the request, signs the claims, and delegates the atomic
    /// revoke-then-insert to the store. With `force`, a live prior token is
    /// revoked in the same transaction; without it, a live prior token is a
    /// `Conflict`. An unregistered device is `NotFound`.
    pub async fn issue(
        &mut self,
        device_id: &str,
        node_name: &str,
        ttl_hours: Option<u32>,
        force: bool,
    ) -> Result<Token> {
        if device_id.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "deviceId must not be empty".to_string(),
            ));
        }
        if node_name.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "nodeName must not be empty".to_string(),
            ));
        }
        let ttl_hours = self.policy.resolve_ttl_hours(ttl_hours)?;

        let issued_at_ms = now_ms();
        let claims = TokenClaims {
            token_id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            node_name: node_name.to_string(),
            issued_at_ms,
            expires_at_ms: issued_at_ms + hours_to_ms(ttl_hours),
        };
        let signed_value = self.signer.sign_claims(&claims)?;

        let token = Token {
            id: claims.token_id,
            device_id: claims.device_id,
            node_name: claims.node_name,
            signed_value,
            issued_at_ms: claims.issued_at_ms,
            expires_at_ms: claims.expires_at_ms,
            status: TokenStatus::Pending,
        };

        let stored = {
            let mut store = self.store.lock().await;
            store.issue_token(&token, force)?
        };

        info!(
            device_id = %stored.device_id,
            token_id = %stored.id,
            ttl_hours,
            force,
            "Issued join token"
        );

        Ok(stored)
    }

    /// Verify a compact token value against the active signing key.
    pub fn verify_value(&mut self, value: &str) -> Result<TokenClaims> {
        self.signer.verify_value(value)
    }

    /// Identifier of the active signing key.
    pub fn key_id(&self) -> &str {
        self.signer.key_id()
    }
}
