use crate::{Result, TargetwatchError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_NAMESPACE: &str = "monitor";
pub const DEFAULT_NAME_MATCH: &str = "vmagent";
pub const DEFAULT_AGENT_PORT: u16 = 8429;
pub const DEFAULT_SCRAPE_INTERVAL_SECS: u64 = 180;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Runtime configuration, loaded from an optional YAML file and then
/// overridden by command line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Namespace the agents run in
    pub namespace: String,
    /// Substring a pod name must contain to be treated as an agent
    pub name_match: String,
    /// Optional Kubernetes label selector applied to the pod list call
    pub label_selector: Option<String>,
    /// Port the agents serve their status API on
    pub agent_port: u16,
    pub scrape_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Maximum number of agents fetched concurrently within one cycle
    pub fetch_concurrency: usize,
    /// Address the metrics endpoint listens on
    pub listen: SocketAddr,
    /// Evict series that were not refreshed for this many cycles.
    /// `None` keeps the last known value forever.
    pub evict_after_cycles: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            name_match: DEFAULT_NAME_MATCH.to_string(),
            label_selector: None,
            agent_port: DEFAULT_AGENT_PORT,
            scrape_interval_secs: DEFAULT_SCRAPE_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            evict_after_cycles: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, falling back to defaults for
    /// every field the file leaves out.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&raw).map_err(|e| {
            TargetwatchError::ConfigError(format!(
                "Failed to parse {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(TargetwatchError::ConfigError(
                "namespace must not be empty".to_string(),
            ));
        }
        if self.agent_port == 0 {
            return Err(TargetwatchError::ConfigError(
                "agent_port must be non-zero".to_string(),
            ));
        }
        if self.scrape_interval_secs == 0 {
            return Err(TargetwatchError::ConfigError(
                "scrape_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(TargetwatchError::ConfigError(
                "request_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.request_timeout_secs >= self.scrape_interval_secs {
            return Err(TargetwatchError::ConfigError(format!(
                "request_timeout_secs ({}) must be shorter than scrape_interval_secs ({})",
                self.request_timeout_secs, self.scrape_interval_secs
            )));
        }
        if self.fetch_concurrency == 0 {
            return Err(TargetwatchError::ConfigError(
                "fetch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.evict_after_cycles == Some(0) {
            return Err(TargetwatchError::ConfigError(
                "evict_after_cycles must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen.to_string(), DEFAULT_LISTEN);
        assert_eq!(config.scrape_interval(), Duration::from_secs(180));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "namespace: observability\nagent_port: 9429").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.namespace, "observability");
        assert_eq!(config.agent_port, 9429);
        assert_eq!(config.name_match, DEFAULT_NAME_MATCH);
        assert_eq!(config.evict_after_cycles, None);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "namespcae: typo").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, TargetwatchError::ConfigError(_)));
    }

    #[test]
    fn test_timeout_must_be_shorter_than_interval() {
        let config = Config {
            scrape_interval_secs: 10,
            request_timeout_secs: 10,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_zero_values_rejected() {
        for config in [
            Config {
                agent_port: 0,
                ..Config::default()
            },
            Config {
                fetch_concurrency: 0,
                ..Config::default()
            },
            Config {
                namespace: " ".to_string(),
                ..Config::default()
            },
            Config {
                evict_after_cycles: Some(0),
                ..Config::default()
            },
        ] {
            assert!(config.validate().is_err(), "{:?}", config);
        }
    }
}
