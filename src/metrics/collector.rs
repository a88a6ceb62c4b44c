use crate::metrics::registry::RegistryReader;
use crate::Result;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{
    Gauge, GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
};
use tracing::warn;

pub const HEALTH_METRIC: &str = "agent_target_health";
pub const STALE_METRIC: &str = "agent_target_stale";
const SERIES_LABELS: [&str; 2] = ["agent", "instance"];

/// Renders the published health snapshot on every gather.
///
/// Gauges are rebuilt from the snapshot on each collect, so series that left
/// the registry disappear from the output and concurrent scrapes never share
/// mutable state.
pub struct HealthCollector {
    reader: RegistryReader,
    descs: Vec<Desc>,
}

impl HealthCollector {
    pub fn new(reader: RegistryReader) -> Result<Self> {
        let (health, stale) = Self::gauges()?;
        let descs = health
            .desc()
            .into_iter()
            .chain(stale.desc())
            .cloned()
            .collect();

        Ok(Self { reader, descs })
    }

    fn gauges() -> prometheus::Result<(GaugeVec, GaugeVec)> {
        let health = GaugeVec::new(
            Opts::new(
                HEALTH_METRIC,
                "Health of each target reported by each agent (1 = up).",
            ),
            &SERIES_LABELS,
        )?;
        let stale = GaugeVec::new(
            Opts::new(
                STALE_METRIC,
                "Whether the health value was not refreshed by the latest scrape cycle.",
            ),
            &SERIES_LABELS,
        )?;
        Ok((health, stale))
    }
}

impl Collector for HealthCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let (health, stale) = match Self::gauges() {
            Ok(gauges) => gauges,
            Err(e) => {
                warn!("Failed to build health gauges: {}", e);
                return Vec::new();
            }
        };

        let snapshot = self.reader.snapshot();
        for (key, state) in snapshot.iter() {
            let labels = [key.agent.as_str(), key.instance.as_str()];
            health.with_label_values(&labels).set(state.value);
            stale
                .with_label_values(&labels)
                .set(if state.is_stale() { 1.0 } else { 0.0 });
        }

        let mut families = health.collect();
        families.extend(stale.collect());
        families
    }
}

/// Counters describing the scrape loop itself.
#[derive(Clone)]
pub struct ScrapeStats {
    pub cycles: IntCounter,
    pub discovery_errors: IntCounter,
    pub fetch_errors: IntCounterVec,
    pub targets_skipped: IntCounter,
    pub agents_discovered: Gauge,
    pub series: Gauge,
    pub cycle_duration: Histogram,
}

impl ScrapeStats {
    pub fn new() -> Result<Self> {
        Ok(Self {
            cycles: IntCounter::new("targetwatch_cycles_total", "Completed scrape cycles.")?,
            discovery_errors: IntCounter::new(
                "targetwatch_discovery_errors_total",
                "Scrape cycles skipped because agent discovery failed.",
            )?,
            fetch_errors: IntCounterVec::new(
                Opts::new(
                    "targetwatch_fetch_errors_total",
                    "Agent target status fetches that failed, by kind.",
                ),
                &["kind"],
            )?,
            targets_skipped: IntCounter::new(
                "targetwatch_targets_skipped_total",
                "Active targets skipped because they have no instance label.",
            )?,
            agents_discovered: Gauge::new(
                "targetwatch_agents_discovered",
                "Agents returned by discovery in the latest cycle.",
            )?,
            series: Gauge::new(
                "targetwatch_series",
                "Series in the published health snapshot.",
            )?,
            cycle_duration: Histogram::with_opts(
                HistogramOpts::new(
                    "targetwatch_cycle_duration_seconds",
                    "Wall time of one scrape cycle.",
                )
                .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.cycles.clone()))?;
        registry.register(Box::new(self.discovery_errors.clone()))?;
        registry.register(Box::new(self.fetch_errors.clone()))?;
        registry.register(Box::new(self.targets_skipped.clone()))?;
        registry.register(Box::new(self.agents_discovered.clone()))?;
        registry.register(Box::new(self.series.clone()))?;
        registry.register(Box::new(self.cycle_duration.clone()))?;
        Ok(())
    }
}
