//! Join outcome reporting.
//!
//! The edge agent calls back exactly once per join attempt with the token
//! it used and whether the join succeeded. The reporter validates the
//! report against the device's current token generation, applies the
//! resolution through the store, and hands a deployment job to the pool
//! when a fresh success arms the guard. Every report, accepted or not,
//! leaves a `JoinAttempt` audit row.

use std::sync::Arc;

use causeway_core::error::{Error, Result};
use causeway_core::time::now_ms;
use causeway_store::{Device, DeviceState, JoinAttempt, JoinOutcome, Store, TokenStatus};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::worker::{DeploymentHandle, DeploymentJob};

/// Counters for the reporting path.
#[derive(Debug, Clone, Default)]
pub struct ReporterMetrics {
    pub reports_accepted_total: u64,
    pub duplicates_absorbed_total: u64,
    pub stale_rejected_total: u64,
    pub deployments_triggered_total: u64,
}

/// What an accepted report did to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The report resolved the join; `deployment_queued` is set when a
    /// success handed a job to the pool.
    Applied {
        state: DeviceState,
        deployment_queued: bool,
    },
    /// A success re-sent for an already completed join; absorbed without
    /// touching device or token state.
    Duplicate,
}

enum Decision {
    Applied {
        device: Device,
        deployment_armed: bool,
    },
    Duplicate,
}

pub struct JoinReporter {
    store: Arc<Mutex<Store>>,
    deployments: DeploymentHandle,
    metrics: ReporterMetrics,
}

impl JoinReporter {
    pub fn new(store: Arc<Mutex<Store>>, deployments: DeploymentHandle) -> Self {
        Self {
            store,
            deployments,
            metrics: ReporterMetrics::default(),
        }
    }

    /// Validate and apply one join report.
    ///
    /// Rejections, in order: unknown device or a device without a token is
    /// `NotFound`; a token id other than the device's current one is
    /// `StaleToken` (the device is unchanged); a lapsed or revoked token is
    /// `InvalidState`. A success re-sent after consumption is absorbed as a
    /// duplicate, never re-deploying; a failure after consumption is
    /// `InvalidState`. Fresh outcomes resolve the join in one store
    /// transaction, and a success queues the agent deployment if the guard
    /// armed.
    pub async fn report(
        &mut self,
        device_id: &str,
        token_id: &str,
        outcome: JoinOutcome,
        diagnostic: Option<&str>,
    ) -> Result<ReportOutcome> {
        if device_id.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "deviceId must not be empty".to_string(),
            ));
        }
        if token_id.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "tokenId must not be empty".to_string(),
            ));
        }

        let now = now_ms();
        let decision = {
            let mut store = self.store.lock().await;
            Self::evaluate(&mut store, device_id, token_id, outcome, diagnostic, now)
        };

        match decision {
            Ok(Decision::Applied {
                device,
                deployment_armed,
            }) => {
                self.metrics.reports_accepted_total += 1;
                let deployment_queued = if deployment_armed {
                    self.queue_deployment(&device).await
                } else {
                    false
                };
                info!(
                    device_id = %device.device_id,
                    token_id = %token_id,
                    outcome = outcome.as_str(),
                    state = device.state.as_str(),
                    deployment_queued,
                    "Join report applied"
                );
                Ok(ReportOutcome::Applied {
                    state: device.state,
                    deployment_queued,
                })
            }
            Ok(Decision::Duplicate) => {
                self.metrics.reports_accepted_total += 1;
                self.metrics.duplicates_absorbed_total += 1;
                info!(
                    device_id = %device_id,
                    token_id = %token_id,
                    "Duplicate join success absorbed"
                );
                Ok(ReportOutcome::Duplicate)
            }
            Err(err) => {
                if matches!(err, Error::StaleToken(_)) {
                    self.metrics.stale_rejected_total += 1;
                }
                warn!(
                    device_id = %device_id,
                    token_id = %token_id,
                    error = %err,
                    "Join report rejected"
                );
                Err(err)
            }
        }
    }

    pub fn metrics(&self) -> &ReporterMetrics {
        &self.metrics
    }

    /// Hand a deployment job to the pool. A rejected enqueue journals a
    /// Failed mark so the guard re-arms and a later join success retries
    /// the submission.
    async fn queue_deployment(&mut self, device: &Device) -> bool {
        let job = DeploymentJob::new(&device.device_id, &device.node_name);
        let job_id = job.job_id.clone();
        match self.deployments.try_submit(job) {
            Ok(()) => {
                self.metrics.deployments_triggered_total += 1;
                info!(
                    device_id = %device.device_id,
                    job_id = %job_id,
                    "Deployment job queued"
                );
                true
            }
            Err(err) => {
                warn!(
                    device_id = %device.device_id,
                    error = %err,
                    "Deployment enqueue rejected"
                );
                let mut store = self.store.lock().await;
                if let Err(journal_err) =
                    store.mark_deployment_failed(&device.device_id, &err.to_string(), now_ms())
                {
                    error!(
                        device_id = %device.device_id,
                        error = %journal_err,
                        "Failed to journal dropped deployment"
                    );
                }
                false
            }
        }
    }

    /// The validation ladder plus its audit row, under one store lock so a
    /// concurrent reissue cannot slip between the check and the apply.
    fn evaluate(
        store: &mut Store,
        device_id: &str,
        token_id: &str,
        outcome: JoinOutcome,
        diagnostic: Option<&str>,
        now: u64,
    ) -> Result<Decision> {
        let decision = Self::resolve(store, device_id, token_id, outcome, now);

        let note = match &decision {
            Ok(Decision::Applied { .. }) => diagnostic.map(str::to_owned),
            Ok(Decision::Duplicate) => Some("duplicate success absorbed".to_string()),
            Err(err) => Some(err.to_string()),
        };
        store.record_join_attempt(&JoinAttempt {
            device_id: device_id.to_string(),
            token_id: token_id.to_string(),
            outcome,
            reported_at_ms: now,
            diagnostic: note,
        })?;

        decision
    }

    fn resolve(
        store: &mut Store,
        device_id: &str,
        token_id: &str,
        outcome: JoinOutcome,
        now: u64,
    ) -> Result<Decision> {
        let device = store
            .device(device_id)?
            .ok_or_else(|| Error::NotFound(format!("device {device_id} is not registered")))?;
        let current_id = device
            .current_token_id
            .as_deref()
            .ok_or_else(|| Error::NotFound(format!("device {device_id} has no issued token")))?;

        if current_id != token_id {
            return Err(Error::StaleToken(format!(
                "token {token_id} is not the current token for device {device_id}"
            )));
        }

        let token = store.get_token(token_id, now)?.ok_or_else(|| {
            Error::Storage(format!("current token {token_id} missing from the store"))
        })?;

        match token.status {
            TokenStatus::Expired | TokenStatus::Revoked => Err(Error::InvalidState(format!(
                "token {token_id} is {} and cannot resolve a join",
                token.status.as_str()
            ))),
            TokenStatus::Consumed => match outcome {
                JoinOutcome::Success if device.state == DeviceState::Joined => {
                    Ok(Decision::Duplicate)
                }
                JoinOutcome::Success => Err(Error::InvalidState(format!(
                    "token {token_id} already consumed while device {device_id} is {}",
                    device.state.as_str()
                ))),
                JoinOutcome::Failure => Err(Error::InvalidState(format!(
                    "device {device_id} already joined with token {token_id}"
                ))),
            },
            TokenStatus::Pending | TokenStatus::Issued => match outcome {
                JoinOutcome::Success => {
                    let applied = store.apply_join_success(device_id, token_id, now)?;
                    Ok(Decision::Applied {
                        device: applied.device,
                        deployment_armed: applied.deployment_armed,
                    })
                }
                JoinOutcome::Failure => {
                    let device = store.apply_join_failure(device_id)?;
                    Ok(Decision::Applied {
                        device,
                        deployment_armed: false,
                    })
                }
            },
        }
    }
}
