use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Network endpoint of one scrape agent, valid for a single cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentAddress {
    pub host: String,
    pub port: u16,
    pub pod_name: Option<String>,
}

impl AgentAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            pod_name: None,
        }
    }

    pub fn with_pod_name(mut self, pod_name: impl Into<String>) -> Self {
        self.pod_name = Some(pod_name.into());
        self
    }

    /// Value of the `agent` label for series collected from this agent.
    pub fn agent_id(&self) -> &str {
        &self.host
    }

    pub fn targets_url(&self) -> String {
        format!("http://{}/api/v1/targets", self)
    }
}

impl fmt::Display for AgentAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for AgentAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("missing port in agent address {:?}", s))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(format!("missing host in agent address {:?}", s));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("invalid port in agent address {:?}: {}", s, e))?;
        Ok(Self::new(host, port))
    }
}

/// The subset of a pod's state needed to decide whether it is a pollable agent.
#[derive(Debug, Clone)]
pub struct AgentPod {
    pub name: String,
    pub pod_ip: Option<String>,
    pub phase: String,
    pub terminating: bool,
}

impl AgentPod {
    pub fn from_k8s_pod(pod: &k8s_openapi::api::core::v1::Pod) -> Self {
        let metadata = &pod.metadata;
        let status = pod.status.as_ref();

        Self {
            name: metadata.name.clone().unwrap_or_default(),
            pod_ip: status
                .and_then(|s| s.pod_ip.clone())
                .filter(|ip| !ip.is_empty()),
            phase: status
                .and_then(|s| s.phase.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            terminating: metadata.deletion_timestamp.is_some(),
        }
    }

    /// Address of the agent, or `None` while the pod has no IP or is going away.
    pub fn address(&self, port: u16) -> Option<AgentAddress> {
        if self.terminating {
            return None;
        }
        self.pod_ip
            .as_ref()
            .map(|ip| AgentAddress::new(ip.clone(), port).with_pod_name(self.name.clone()))
    }
}
