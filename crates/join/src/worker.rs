//! Bounded worker pool draining deployment submissions.
//!
//! Join reports never wait on the control plane: a successful join enqueues
//! a `DeploymentJob` and returns. A fixed set of workers drains the queue
//! and journals the outcome back onto the device row. The queue is bounded;
//! when it is full the submit fails immediately and the caller records a
//! Failed deployment mark instead of blocking.

use std::sync::Arc;

use causeway_core::error::{Error, Result};
use causeway_core::time::now_ms;
use causeway_store::Store;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::deploy::ControlPlaneClient;

/// One deployment submission, created when a join success arms the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentJob {
    pub job_id: String,
    pub device_id: String,
    pub node_name: String,
    pub queued_at_ms: u64,
}

impl DeploymentJob {
    pub fn new(device_id: &str, node_name: &str) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            node_name: node_name.to_string(),
            queued_at_ms: now_ms(),
        }
    }
}

/// Where a job sits in the pool. Queued, Submitted, and Failed are
/// journaled on the device row; InFlight only ever appears in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    InFlight,
    Submitted,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::InFlight => "in_flight",
            JobStatus::Submitted => "submitted",
            JobStatus::Failed => "failed",
        }
    }
}

/// Cloneable enqueue handle held by the join reporter.
#[derive(Clone)]
pub struct DeploymentHandle {
    tx: mpsc::Sender<DeploymentJob>,
}

impl DeploymentHandle {
    /// Handle over a bare queue with nothing draining it.
    #[cfg(test)]
    pub(crate) fn test_pair(depth: usize) -> (Self, mpsc::Receiver<DeploymentJob>) {
        let (tx, rx) = mpsc::channel(depth);
        (Self { tx }, rx)
    }

    /// Hand a job to the pool without waiting. A full or closed queue is
    /// an error the caller journals as a Failed mark; the join path is
    /// never blocked on deployment capacity.
    pub fn try_submit(&self, job: DeploymentJob) -> Result<()> {
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(job)) => Err(Error::Deployment(format!(
                "deployment queue full, job {} for device {} dropped",
                job.job_id, job.device_id
            ))),
            Err(mpsc::error::TrySendError::Closed(job)) => Err(Error::Deployment(format!(
                "deployment pool stopped, job {} for device {} dropped",
                job.job_id, job.device_id
            ))),
        }
    }
}

/// Fixed set of workers over a bounded job queue.
pub struct DeploymentPool {
    tx: mpsc::Sender<DeploymentJob>,
    workers: Vec<JoinHandle<()>>,
}

impl DeploymentPool {
    /// Spawn `workers` tasks draining a queue of `queue_depth` slots.
    pub fn spawn(
        store: Arc<Mutex<Store>>,
        client: ControlPlaneClient,
        workers: usize,
        queue_depth: usize,
    ) -> Self {
        let worker_count = workers.max(1);
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let client = Arc::new(client);

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let rx = Arc::clone(&rx);
            let store = Arc::clone(&store);
            let client = Arc::clone(&client);
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, rx, store, client).await;
            }));
        }

        info!(workers = worker_count, queue_depth, "Deployment pool started");
        Self {
            tx,
            workers: handles,
        }
    }

    pub fn handle(&self) -> DeploymentHandle {
        DeploymentHandle {
            tx: self.tx.clone(),
        }
    }

    /// Close the queue and wait for the workers. Jobs already queued are
    /// drained; each in-flight submission finishes or fails within the
    /// client's request timeout.
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            if let Err(err) = worker.await {
                error!(error = %err, "Deployment worker panicked");
            }
        }
        info!("Deployment pool drained");
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<DeploymentJob>>>,
    store: Arc<Mutex<Store>>,
    client: Arc<ControlPlaneClient>,
) {
    loop {
        // One worker at a time parks on the queue; the receiver lock is
        // released before the job runs so submissions overlap.
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            debug!(worker_id, "Deployment worker stopping, queue closed");
            break;
        };
        run_job(worker_id, &store, &client, job).await;
    }
}

async fn run_job(
    worker_id: usize,
    store: &Arc<Mutex<Store>>,
    client: &ControlPlaneClient,
    job: DeploymentJob,
) {
    debug!(
        worker_id,
        job_id = %job.job_id,
        device_id = %job.device_id,
        status = JobStatus::InFlight.as_str(),
        "Deployment job picked up"
    );

    match client.submit(&job.device_id, &job.node_name).await {
        Ok(()) => {
            let mut store = store.lock().await;
            match store.mark_deployment_submitted(&job.device_id, now_ms()) {
                Ok(()) => info!(
                    job_id = %job.job_id,
                    device_id = %job.device_id,
                    status = JobStatus::Submitted.as_str(),
                    "Agent deployment submitted"
                ),
                Err(err) => error!(
                    job_id = %job.job_id,
                    device_id = %job.device_id,
                    error = %err,
                    "Failed to journal deployment submission"
                ),
            }
        }
        Err(err) => {
            warn!(
                job_id = %job.job_id,
                device_id = %job.device_id,
                status = JobStatus::Failed.as_str(),
                error = %err,
                "Agent deployment failed"
            );
            let mut store = store.lock().await;
            if let Err(journal_err) =
                store.mark_deployment_failed(&job.device_id, &err.to_string(), now_ms())
            {
                error!(
                    job_id = %job.job_id,
                    device_id = %job.device_id,
                    error = %journal_err,
                    "Failed to journal deployment failure"
                );
            }
        }
    }
}
