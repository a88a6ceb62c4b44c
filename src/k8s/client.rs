use crate::error::DiscoveryError;
use crate::{Result, TargetwatchError};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::{debug, info};

#[derive(Clone)]
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    /// Build a client from the in-cluster service account or the local
    /// kubeconfig. Failure here means the process is misconfigured.
    pub async fn try_default() -> Result<Self> {
        debug!("Initializing Kubernetes client");

        let client = Client::try_default().await.map_err(|e| {
            TargetwatchError::KubernetesError(format!("Failed to create K8s client: {}", e))
        })?;

        info!("Successfully connected to Kubernetes cluster");

        Ok(Self { client })
    }

    pub fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> std::result::Result<Vec<Pod>, DiscoveryError> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }

        let pod_list =
            self.pods(namespace)
                .list(&params)
                .await
                .map_err(|e| DiscoveryError::ListFailed {
                    namespace: namespace.to_string(),
                    reason: e.to_string(),
                })?;

        Ok(pod_list.items)
    }
}
