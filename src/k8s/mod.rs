pub mod client;
pub mod directory;
pub mod types;

pub use client::K8sClient;
pub use directory::{AgentDirectory, AgentSelector, KubeDirectory, StaticDirectory};
pub use types::{AgentAddress, AgentPod};
