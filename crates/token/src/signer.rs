//! Process-wide Ed25519 signer for join tokens.
//!
//! The compact wire value is `base64url(claims_json) "." base64url(signature)`
//! (unpadded). Verification checks the signature and the structural validity
//! of the claims; TTL enforcement stays in the store, which owns time.
//!
//! Private key material never leaves this module. Seed buffers are zeroized
//! after the key is constructed.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use std::path::Path;
use tracing::info;
use zeroize::Zeroize;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use causeway_core::{Error, Result};

use crate::claims::TokenClaims;

/// Observability counters for the signer.
#[derive(Debug, Default)]
pub struct SignerMetrics {
    pub tokens_signed_total: u64,
    pub values_verified_total: u64,
    pub verify_failures_total: u64,
}

/// Ed25519 token signer with a stable key identifier.
pub struct TokenSigner {
    signing_key: SigningKey,
    key_id: String,
    metrics: SignerMetrics,
}

impl TokenSigner {
    /// Create a signer with a freshly generated key.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Self::from_signing_key(signing_key)
    }

    /// Create a signer from an existing 32-byte seed. The caller's buffer is
    /// copied and the copy is zeroized after key construction.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        if seed.len() != 32 {
            return Err(Error::Signing(format!(
                "invalid seed length: {} (expected 32)",
                seed.len()
            )));
        }
        let mut seed_array = [0u8; 32];
        seed_array.copy_from_slice(seed);
        let signing_key = SigningKey::from_bytes(&seed_array);
        seed_array.zeroize();
        Ok(Self::from_signing_key(signing_key))
    }

    /// Load the signing seed from a hex file, generating and persisting a
    /// fresh one on first boot so restarts keep the same key.
    pub fn load_or_generate(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let mut hex_seed = std::fs::read_to_string(path)?;
            let mut seed = hex::decode(hex_seed.trim()).map_err(|e| {
                Error::Signing(format!("invalid key file {}: {e}", path.display()))
            })?;
            hex_seed.zeroize();
            let signer = Self::from_seed(&seed)?;
            seed.zeroize();
            info!(path = %path.display(), key_id = %signer.key_id, "Loaded signing key");
            return Ok(signer);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        use rand::RngCore;
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        std::fs::write(path, hex::encode(seed))?;
        let signer = Self::from_seed(&seed)?;
        seed.zeroize();
        info!(path = %path.display(), key_id = %signer.key_id, "Generated signing key");
        Ok(signer)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let key_id = derive_key_id(&signing_key.verifying_key());
        Self {
            signing_key,
            key_id,
            metrics: SignerMetrics::default(),
        }
    }

    /// Stable identifier of the active key.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Public key bytes for out-of-band distribution.
    pub fn public_key(&self) -> Vec<u8> {
        self.signing_key.verifying_key().to_bytes().to_vec()
    }

    /// Sign validated claims into the compact wire value.
    pub fn sign_claims(&mut self, claims: &TokenClaims) -> Result<String> {
        claims.validate()?;
        let message = claims.serialize_for_signing()?;
        let signature = self.signing_key.sign(&message);
        self.metrics.tokens_signed_total += 1;
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&message),
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }

    /// Verify a compact wire value and return its claims.
    ///
    /// Rejects malformed values, bad signatures, and structurally invalid
    /// claims with `Unauthorized`. Does not check expiry.
    pub fn verify_value(&mut self, value: &str) -> Result<TokenClaims> {
        let outcome = self.verify_inner(value);
        match outcome {
            Ok(_) => self.metrics.values_verified_total += 1,
            Err(_) => self.metrics.verify_failures_total += 1,
        }
        outcome
    }

    fn verify_inner(&self, value: &str) -> Result<TokenClaims> {
        let (claims_part, signature_part) = value
            .split_once('.')
            .ok_or_else(|| Error::Unauthorized("malformed token value".to_string()))?;

        let message = URL_SAFE_NO_PAD
            .decode(claims_part)
            .map_err(|e| Error::Unauthorized(format!("malformed token claims: {e}")))?;
        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature_part)
            .map_err(|e| Error::Unauthorized(format!("malformed token signature: {e}")))?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|e| Error::Unauthorized(format!("invalid signature: {e}")))?;

        self.signing_key
            .verifying_key()
            .verify(&message, &signature)
            .map_err(|_| Error::Unauthorized("token signature verification failed".to_string()))?;

        let claims: TokenClaims = serde_json::from_slice(&message)
            .map_err(|e| Error::Unauthorized(format!("invalid token claims: {e}")))?;
        claims.validate()?;
        Ok(claims)
    }

    /// Snapshot of the signer counters.
    pub fn metrics(&self) -> &SignerMetrics {
        &self.metrics
    }
}

/// Stable key identifier: first 16 bytes of the BLAKE3 hash of the public
/// key, hex encoded.
fn derive_key_id(verifying_key: &VerifyingKey) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(verifying_key.as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash.as_bytes()[..16])
}
