//! Maps an agent's target status document to series upserts.

use crate::metrics::registry::{SeriesKey, SnapshotBuilder};
use crate::targets::types::{RawTarget, TargetStatusDocument, HEALTH_UP};
use tracing::debug;

/// Upserts derived from one agent's document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub upserts: Vec<(SeriesKey, f64)>,
    /// Active targets skipped because they carry no `instance` label
    pub skipped: usize,
}

impl Aggregation {
    pub fn apply_to(self, builder: &mut SnapshotBuilder) {
        for (key, value) in self.upserts {
            builder.upsert(key, value);
        }
    }
}

/// Only `"up"` counts as healthy.
pub fn health_value(health: &str) -> f64 {
    if health == HEALTH_UP {
        1.0
    } else {
        0.0
    }
}

fn series_for(agent: &str, target: &RawTarget) -> Option<(SeriesKey, f64)> {
    let instance = target.instance()?;
    Some((SeriesKey::new(agent, instance), health_value(&target.health)))
}

/// Derive upserts from the active targets of `document`. Dropped targets are
/// ignored.
pub fn apply(agent: &str, document: &TargetStatusDocument) -> Aggregation {
    let mut aggregation = Aggregation::default();

    for target in &document.data.active_targets {
        match series_for(agent, target) {
            Some(upsert) => aggregation.upserts.push(upsert),
            None => {
                debug!(
                    "Skipping target without instance label from agent {} (pool {:?})",
                    agent, target.scrape_pool
                );
                aggregation.skipped += 1;
            }
        }
    }

    aggregation
}
