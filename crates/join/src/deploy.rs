//! Post-join agent deployment against the cluster control plane.
//!
//! A successful join hands a rendered deployment descriptor to the control
//! plane. Submission is idempotent: the descriptor is PUT to a name derived
//! from the device id, so re-submitting overwrites rather than duplicates.

use std::time::Duration;

use causeway_core::config::DeployConfig;
use causeway_core::error::{Error, Result};
use serde_json::{json, Value};
use tracing::debug;

/// Deployment object name for a device. One deployment per device; the
/// fixed prefix keeps agent workloads recognizable in the namespace.
pub fn deployment_name(device_id: &str) -> String {
    format!("causeway-agent-{device_id}")
}

/// Render the agent deployment descriptor for a freshly joined device.
///
/// Image and namespace come from configuration; the labels carry the
/// device identity so operators can trace a workload back to its device.
pub fn render_descriptor(device_id: &str, node_name: &str, cfg: &DeployConfig) -> Value {
    let name = deployment_name(device_id);
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": name,
            "namespace": cfg.namespace,
            "labels": {
                "app.kubernetes.io/name": "causeway-agent",
                "app.kubernetes.io/managed-by": "causeway",
                "causeway.io/device-id": device_id,
                "causeway.io/node-name": node_name,
            },
        },
        "spec": {
            "replicas": 1,
            "selector": {
                "matchLabels": { "causeway.io/device-id": device_id },
            },
            "template": {
                "metadata": {
                    "labels": {
                        "app.kubernetes.io/name": "causeway-agent",
                        "causeway.io/device-id": device_id,
                    },
                },
                "spec": {
                    "nodeSelector": { "kubernetes.io/hostname": node_name },
                    "containers": [{
                        "name": "agent",
                        "image": cfg.agent_image,
                        "env": [
                            { "name": "CAUSEWAY_DEVICE_ID", "value": device_id },
                        ],
                    }],
                },
            },
        },
    })
}

/// Thin HTTP client for the deployment endpoint of the control plane.
pub struct ControlPlaneClient {
    http: reqwest::Client,
    api_base: String,
    namespace: String,
    cfg: DeployConfig,
}

impl ControlPlaneClient {
    pub fn new(cfg: &DeployConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| Error::Deployment(format!("control plane client: {e}")))?;
        Ok(Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            namespace: cfg.namespace.clone(),
            cfg: cfg.clone(),
        })
    }

    /// Render and submit the agent deployment for one device.
    pub async fn submit(&self, device_id: &str, node_name: &str) -> Result<()> {
        let descriptor = render_descriptor(device_id, node_name, &self.cfg);
        self.apply(&deployment_name(device_id), &descriptor).await
    }

    /// PUT a descriptor to the control plane. Non-2xx responses and
    /// transport failures both come back as `Error::Deployment`.
    pub async fn apply(&self, name: &str, descriptor: &Value) -> Result<()> {
        let url = format!(
            "{}/namespaces/{}/deployments/{}",
            self.api_base, self.namespace, name
        );
        debug!(url = %url, "Submitting deployment descriptor");

        let response = self
            .http
            .put(&url)
            .json(descriptor)
            .send()
            .await
            .map_err(|e| Error::Deployment(format!("control plane unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Deployment(format!(
                "control plane rejected {name}: {status} {body}"
            )));
        }
        Ok(())
    }
}
