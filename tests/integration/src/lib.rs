//! End-to-end tests for the Causeway join orchestrator.
//!
//! This suite wires the real components together (SQLite store, signer,
//! issuer, registry, reporter, deployment pool, axum router) against a
//! mock control-plane server and exercises the externally observable
//! guarantees:
//! - at most one active token per device, under force reissue and
//!   concurrent issuance
//! - a revoked token can never become consumed
//! - stale or replayed join reports are rejected without side effects
//! - duplicate success reports deploy exactly once
//! - staleness sweep and heartbeat recovery
//! - lazy token expiry on the polling path

pub mod test_utils;


#[cfg(test)]
mod join_report_tests;

#[cfg(test)]
mod staleness_tests;

#[cfg(test)]
mod gateway_scenario_tests;
