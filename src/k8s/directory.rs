//! Agent discovery
//!
//! Resolves the set of agent addresses polled in one cycle. The scheduler
//! only sees the [`AgentDirectory`] trait, so tests can substitute a fixed
//! list for the Kubernetes API.

use crate::config::Config;
use crate::error::DiscoveryError;
use crate::k8s::client::K8sClient;
use crate::k8s::types::{AgentAddress, AgentPod};
use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Current agent addresses. An empty list is a valid answer.
    async fn resolve(&self) -> Result<Vec<AgentAddress>, DiscoveryError>;
}

/// Which pods count as agents and which port they serve on.
#[derive(Debug, Clone)]
pub struct AgentSelector {
    pub name_match: String,
    pub port: u16,
}

impl AgentSelector {
    pub fn from_config(config: &Config) -> Self {
        Self {
            name_match: config.name_match.clone(),
            port: config.agent_port,
        }
    }

    /// Keep matching pods that already have an address, in input order.
    pub fn select(&self, pods: &[AgentPod]) -> Vec<AgentAddress> {
        pods.iter()
            .filter(|pod| pod.name.contains(&self.name_match))
            .filter_map(|pod| {
                let addr = pod.address(self.port);
                if addr.is_none() {
                    debug!(
                        "Skipping agent pod {} (phase {}): no address yet",
                        pod.name, pod.phase
                    );
                }
                addr
            })
            .collect()
    }
}

/// Directory backed by the Kubernetes pod list of one namespace.
pub struct KubeDirectory {
    client: K8sClient,
    namespace: String,
    label_selector: Option<String>,
    selector: AgentSelector,
}

impl KubeDirectory {
    pub fn new(client: K8sClient, config: &Config) -> Self {
        Self {
            client,
            namespace: config.namespace.clone(),
            label_selector: config.label_selector.clone(),
            selector: AgentSelector::from_config(config),
        }
    }
}

#[async_trait]
impl AgentDirectory for KubeDirectory {
    async fn resolve(&self) -> Result<Vec<AgentAddress>, DiscoveryError> {
        let pods = self
            .client
            .list_pods(&self.namespace, self.label_selector.as_deref())
            .await?;

        let pods: Vec<AgentPod> = pods.iter().map(AgentPod::from_k8s_pod).collect();
        let agents = self.selector.select(&pods);

        debug!(
            "Resolved {} agents from {} pods in namespace {}",
            agents.len(),
            pods.len(),
            self.namespace
        );

        Ok(agents)
    }
}

/// Directory with a fixed list of agents.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    agents: Vec<AgentAddress>,
}

impl StaticDirectory {
    pub fn new(agents: Vec<AgentAddress>) -> Self {
        Self { agents }
    }
}

#[async_trait]
impl AgentDirectory for StaticDirectory {
    async fn resolve(&self) -> Result<Vec<AgentAddress>, DiscoveryError> {
        Ok(self.agents.clone())
    }
}
