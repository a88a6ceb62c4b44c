pub mod aggregator;
pub mod collector;
pub mod exporter;
pub mod registry;

pub use collector::{HealthCollector, ScrapeStats};
pub use exporter::PrometheusExporter;
pub use registry::{
    HealthRegistry, HealthSnapshot, RegistryReader, SeriesKey, SeriesState, StalenessPolicy,
};
