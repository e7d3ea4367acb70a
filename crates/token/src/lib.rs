//! Join-token claims, the process-wide Ed25519 signer, and the issuer that
//! ties policy, signing, and the persisted lifecycle together.

pub mod claims;
pub mod issuer;
pub mod signer;

pub use claims::TokenClaims;
pub use issuer::{IssuePolicy, TokenIssuer};
pub use signer::{SignerMetrics, TokenSigner};
