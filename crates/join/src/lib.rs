//! Join resolution and post-join agent deployment: the reporter that
//! validates agent callbacks, the control-plane client, and the bounded
//! worker pool that submits deployments off the request path.

pub mod deploy;
pub mod reporter;
pub mod worker;

pub use deploy::{deployment_name, render_descriptor, ControlPlaneClient};
pub use reporter::{JoinReporter, ReportOutcome, ReporterMetrics};
pub use worker::{DeploymentHandle, DeploymentJob, DeploymentPool, JobStatus};

pub use causeway_store::JoinOutcome;
