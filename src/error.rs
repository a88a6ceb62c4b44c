use thiserror::Error;

#[derive(Error, Debug)]
pub enum TargetwatchError {
    #[error("Kubernetes error: {0}")]
    KubernetesError(String),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("HTTP client error: {0}")]
    HttpClientError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to bind metrics listener on {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<prometheus::Error> for TargetwatchError {
    fn from(e: prometheus::Error) -> Self {
        TargetwatchError::MetricsError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TargetwatchError>;

/// Failure to resolve the agent directory. Fails a whole cycle.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to list pods in namespace {namespace}: {reason}")]
    ListFailed { namespace: String, reason: String },
}

/// Failure to collect one agent's target status. Scoped to that agent.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{url} reported api status {status:?}")]
    Api { url: String, status: String },
}

impl FetchError {
    /// Short label used for the `kind` dimension of the fetch error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout { .. } => "timeout",
            FetchError::Transport { .. } => "transport",
            FetchError::Status { .. } => "status",
            FetchError::Decode { .. } => "decode",
            FetchError::Api { .. } => "api",
        }
    }
}
