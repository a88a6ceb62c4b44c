//! Periodic discovery → fetch → aggregate loop
//!
//! One cycle resolves the agent directory, fetches every agent with bounded
//! parallelism, folds each successful document into the next snapshot as
//! soon as its fetch resolves, and publishes the snapshot once at the end.
//! Cycles run inline in the loop, so a slow cycle delays the next tick
//! instead of overlapping with it.

use crate::config::Config;
use crate::error::DiscoveryError;
use crate::k8s::AgentDirectory;
use crate::metrics::aggregator;
use crate::metrics::{HealthRegistry, RegistryReader, ScrapeStats, StalenessPolicy};
use crate::targets::TargetSource;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct ScheduleSettings {
    pub period: Duration,
    /// Maximum agent fetches in flight within one cycle
    pub concurrency: usize,
    pub staleness: StalenessPolicy,
}

impl ScheduleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            period: config.scrape_interval(),
            concurrency: config.fetch_concurrency,
            staleness: StalenessPolicy {
                evict_after_cycles: config.evict_after_cycles,
            },
        }
    }
}

/// Outcome of one cycle that got past discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub agents: usize,
    pub fetched: usize,
    pub failed: usize,
    pub upserts: usize,
    pub skipped_targets: usize,
    pub evicted: usize,
    /// False when discovery returned no agents and the registry was left alone
    pub published: bool,
}

pub struct Scheduler<D, S> {
    directory: D,
    source: S,
    registry: HealthRegistry,
    stats: ScrapeStats,
    settings: ScheduleSettings,
}

impl<D, S> Scheduler<D, S>
where
    D: AgentDirectory,
    S: TargetSource,
{
    pub fn new(
        directory: D,
        source: S,
        registry: HealthRegistry,
        stats: ScrapeStats,
        settings: ScheduleSettings,
    ) -> Self {
        Self {
            directory,
            source,
            registry,
            stats,
            settings,
        }
    }

    pub fn reader(&self) -> RegistryReader {
        self.registry.reader()
    }

    /// Run a single cycle. A discovery failure skips the cycle and leaves the
    /// registry untouched.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, DiscoveryError> {
        let started = Instant::now();

        let agents = match self.directory.resolve().await {
            Ok(agents) => agents,
            Err(e) => {
                self.stats.discovery_errors.inc();
                return Err(e);
            }
        };

        self.stats.agents_discovered.set(agents.len() as f64);

        let mut report = CycleReport {
            agents: agents.len(),
            ..Default::default()
        };

        if agents.is_empty() {
            info!("No agents discovered, keeping current registry");
            self.stats.cycles.inc();
            return Ok(report);
        }

        let mut builder = self.registry.begin_cycle();
        let source = &self.source;
        let mut fetches = futures::stream::iter(agents)
            .map(|agent| async move {
                let result = source.fetch(&agent).await;
                (agent, result)
            })
            .buffer_unordered(self.settings.concurrency.max(1));

        while let Some((agent, result)) = fetches.next().await {
            match result {
                Ok(document) => {
                    report.fetched += 1;
                    let aggregation = aggregator::apply(agent.agent_id(), &document);
                    debug!(
                        "Agent {} reported {} targets ({} skipped)",
                        agent,
                        aggregation.upserts.len(),
                        aggregation.skipped
                    );
                    report.upserts += aggregation.upserts.len();
                    report.skipped_targets += aggregation.skipped;
                    aggregation.apply_to(&mut builder);
                }
                Err(e) => {
                    report.failed += 1;
                    self.stats.fetch_errors.with_label_values(&[e.kind()]).inc();
                    warn!(
                        agent = %agent,
                        pod = agent.pod_name.as_deref().unwrap_or(""),
                        kind = e.kind(),
                        "Failed to fetch targets: {}",
                        e
                    );
                }
            }
        }
        drop(fetches);

        let (snapshot, evicted) = builder.finish(self.settings.staleness);
        report.evicted = evicted;
        let series = snapshot.len();
        self.registry.publish(snapshot);
        report.published = true;

        self.stats.targets_skipped.inc_by(report.skipped_targets as u64);
        self.stats.series.set(series as f64);
        self.stats.cycles.inc();
        self.stats
            .cycle_duration
            .observe(started.elapsed().as_secs_f64());

        Ok(report)
    }

    /// Run cycles every period until `shutdown` is cancelled. The first cycle
    /// starts immediately.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            "Starting scrape scheduler (period {:?}, concurrency {})",
            self.settings.period, self.settings.concurrency
        );

        let mut ticker = tokio::time::interval(self.settings.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = self.run_cycle() => match result {
                    Ok(report) => info!(
                        "Scrape cycle finished in {:?}: {} agents, {} fetched, {} failed, {} series updated, {} targets skipped, {} evicted",
                        started.elapsed(),
                        report.agents,
                        report.fetched,
                        report.failed,
                        report.upserts,
                        report.skipped_targets,
                        report.evicted
                    ),
                    Err(e) => warn!("Skipping scrape cycle: {}", e),
                },
            }
        }

        info!("Scrape scheduler stopped");
    }
}
