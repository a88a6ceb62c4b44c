pub mod commands;

use crate::config::Config;
use crate::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "targetwatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Republishes vmagent target health as Prometheus metrics", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, env = "TARGETWATCH_CONFIG", help = "YAML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(short, long, env = "TARGETWATCH_NAMESPACE", help = "Namespace the agents run in")]
    pub namespace: Option<String>,

    #[arg(
        long,
        env = "TARGETWATCH_NAME_MATCH",
        help = "Substring a pod name must contain to be polled"
    )]
    pub name_match: Option<String>,

    #[arg(
        short,
        long,
        env = "TARGETWATCH_LABEL_SELECTOR",
        help = "Label selector for the agent pods"
    )]
    pub label_selector: Option<String>,

    #[arg(long, env = "TARGETWATCH_AGENT_PORT", help = "Agent status API port")]
    pub agent_port: Option<u16>,

    #[arg(
        long,
        env = "TARGETWATCH_SCRAPE_INTERVAL",
        help = "Seconds between scrape cycles"
    )]
    pub scrape_interval: Option<u64>,

    #[arg(
        long,
        env = "TARGETWATCH_REQUEST_TIMEOUT",
        help = "Per-agent request timeout in seconds"
    )]
    pub request_timeout: Option<u64>,

    #[arg(
        long,
        env = "TARGETWATCH_FETCH_CONCURRENCY",
        help = "Maximum agents fetched in parallel"
    )]
    pub fetch_concurrency: Option<usize>,

    #[arg(long, env = "TARGETWATCH_LISTEN", help = "Metrics listen address")]
    pub listen: Option<SocketAddr>,

    #[arg(
        long,
        env = "TARGETWATCH_EVICT_AFTER_CYCLES",
        help = "Drop series not refreshed for this many cycles"
    )]
    pub evict_after_cycles: Option<u32>,
}

impl Cli {
    /// Resolve the effective configuration: defaults, then the config file,
    /// then command line flags.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(ns) = &self.namespace {
            config.namespace = ns.clone();
        }
        if let Some(m) = &self.name_match {
            config.name_match = m.clone();
        }
        if let Some(selector) = &self.label_selector {
            config.label_selector = Some(selector.clone());
        }
        if let Some(port) = self.agent_port {
            config.agent_port = port;
        }
        if let Some(secs) = self.scrape_interval {
            config.scrape_interval_secs = secs;
        }
        if let Some(secs) = self.request_timeout {
            config.request_timeout_secs = secs;
        }
        if let Some(n) = self.fetch_concurrency {
            config.fetch_concurrency = n;
        }
        if let Some(addr) = self.listen {
            config.listen = addr;
        }
        if let Some(n) = self.evict_after_cycles {
            config.evict_after_cycles = Some(n);
        }
    }
}
