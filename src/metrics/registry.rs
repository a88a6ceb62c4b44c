//! Health registry with atomically published snapshots
//!
//! The scheduler owns the [`HealthRegistry`] and is its only writer. Each
//! cycle starts a [`SnapshotBuilder`] from the current snapshot, applies the
//! upserts of every agent that answered, and publishes the result with a
//! single pointer swap. Readers hold a [`RegistryReader`] and always load a
//! complete snapshot of some finished cycle without taking a lock.

use arc_swap::ArcSwap;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Identifies one published series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub agent: String,
    pub instance: String,
}

impl SeriesKey {
    pub fn new(agent: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            instance: instance.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesState {
    /// 1.0 healthy, 0.0 unhealthy
    pub value: f64,
    /// Consecutive cycles that did not refresh this series
    pub missed_cycles: u32,
}

impl SeriesState {
    pub fn is_stale(&self) -> bool {
        self.missed_cycles > 0
    }
}

/// Immutable view of every known series as of one finished cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthSnapshot {
    cycle: u64,
    series: BTreeMap<SeriesKey, SeriesState>,
}

impl HealthSnapshot {
    /// Number of the cycle that produced this snapshot, 0 before the first.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn get(&self, key: &SeriesKey) -> Option<&SeriesState> {
        self.series.get(key)
    }

    pub fn value(&self, agent: &str, instance: &str) -> Option<f64> {
        self.get(&SeriesKey::new(agent, instance)).map(|s| s.value)
    }

    pub fn stale_count(&self) -> usize {
        self.series.values().filter(|s| s.is_stale()).count()
    }

    /// Series in (agent, instance) order.
    pub fn iter(&self) -> impl Iterator<Item = (&SeriesKey, &SeriesState)> {
        self.series.iter()
    }
}

/// What happens to series the current cycle did not refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StalenessPolicy {
    /// Remove a series after it missed this many consecutive cycles.
    /// `None` keeps it, flagged stale, forever.
    pub evict_after_cycles: Option<u32>,
}

/// Next snapshot under construction. Nothing is visible to readers until
/// [`HealthRegistry::publish`] is called.
#[derive(Debug)]
pub struct SnapshotBuilder {
    cycle: u64,
    series: BTreeMap<SeriesKey, SeriesState>,
    refreshed: HashSet<SeriesKey>,
}

impl SnapshotBuilder {
    pub fn upsert(&mut self, key: SeriesKey, value: f64) {
        self.series.insert(
            key.clone(),
            SeriesState {
                value,
                missed_cycles: 0,
            },
        );
        self.refreshed.insert(key);
    }

    /// Age every series this cycle did not touch and apply the eviction
    /// policy. Returns the snapshot and the number of evicted series.
    pub fn finish(self, policy: StalenessPolicy) -> (HealthSnapshot, usize) {
        let SnapshotBuilder {
            cycle,
            mut series,
            refreshed,
        } = self;

        for (key, state) in series.iter_mut() {
            if !refreshed.contains(key) {
                state.missed_cycles = state.missed_cycles.saturating_add(1);
            }
        }

        let before = series.len();
        if let Some(limit) = policy.evict_after_cycles {
            series.retain(|_, state| state.missed_cycles < limit);
        }
        let evicted = before - series.len();

        (HealthSnapshot { cycle, series }, evicted)
    }
}

/// Writer side of the registry. Owned by the scheduler.
pub struct HealthRegistry {
    current: Arc<ArcSwap<HealthSnapshot>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(HealthSnapshot::default())),
        }
    }

    pub fn reader(&self) -> RegistryReader {
        RegistryReader {
            current: self.current.clone(),
        }
    }

    pub fn snapshot(&self) -> Arc<HealthSnapshot> {
        self.current.load_full()
    }

    /// Start the next cycle from the currently published state.
    pub fn begin_cycle(&self) -> SnapshotBuilder {
        let current = self.current.load();
        SnapshotBuilder {
            cycle: current.cycle + 1,
            series: current.series.clone(),
            refreshed: HashSet::new(),
        }
    }

    pub fn publish(&mut self, snapshot: HealthSnapshot) {
        self.current.store(Arc::new(snapshot));
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only handle handed to the exporter.
#[derive(Clone)]
pub struct RegistryReader {
    current: Arc<ArcSwap<HealthSnapshot>>,
}

impl RegistryReader {
    pub fn snapshot(&self) -> Arc<HealthSnapshot> {
        self.current.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(agent: &str, instance: &str) -> SeriesKey {
        SeriesKey::new(agent, instance)
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = HealthRegistry::new();
        let snapshot = registry.reader().snapshot();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.cycle(), 0);
    }

    #[test]
    fn test_builder_invisible_until_publish() {
        let mut registry = HealthRegistry::new();
        let reader = registry.reader();

        let mut builder = registry.begin_cycle();
        builder.upsert(key("a1", "i1"), 1.0);
        builder.upsert(key("a1", "i2"), 0.0);
        assert!(reader.snapshot().is_empty());

        let (snapshot, evicted) = builder.finish(StalenessPolicy::default());
        assert_eq!(evicted, 0);
        registry.publish(snapshot);

        let snapshot = reader.snapshot();
        assert_eq!(snapshot.cycle(), 1);
        assert_eq!(snapshot.value("a1", "i1"), Some(1.0));
        assert_eq!(snapshot.value("a1", "i2"), Some(0.0));
    }

    #[test]
    fn test_held_snapshot_is_not_mutated_by_publish() {
        let mut registry = HealthRegistry::new();
        let reader = registry.reader();

        let mut builder = registry.begin_cycle();
        builder.upsert(key("a1", "i1"), 1.0);
        builder.upsert(key("a2", "i1"), 1.0);
        registry.publish(builder.finish(StalenessPolicy::default()).0);

        let held = reader.snapshot();

        let mut builder = registry.begin_cycle();
        builder.upsert(key("a1", "i1"), 0.0);
        builder.upsert(key("a2", "i1"), 0.0);
        registry.publish(builder.finish(StalenessPolicy::default()).0);

        assert_eq!(held.value("a1", "i1"), Some(1.0));
        assert_eq!(held.value("a2", "i1"), Some(1.0));
        let latest = reader.snapshot();
        assert_eq!(latest.value("a1", "i1"), Some(0.0));
        assert_eq!(latest.value("a2", "i1"), Some(0.0));
    }

    #[test]
    fn test_unrefreshed_series_kept_and_flagged_stale() {
        let mut registry = HealthRegistry::new();

        let mut builder = registry.begin_cycle();
        builder.upsert(key("a1", "i1"), 1.0);
        builder.upsert(key("a2", "i1"), 1.0);
        registry.publish(builder.finish(StalenessPolicy::default()).0);

        let mut builder = registry.begin_cycle();
        builder.upsert(key("a1", "i1"), 1.0);
        registry.publish(builder.finish(StalenessPolicy::default()).0);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(!snapshot.get(&key("a1", "i1")).unwrap().is_stale());
        let stale = snapshot.get(&key("a2", "i1")).unwrap();
        assert!(stale.is_stale());
        assert_eq!(stale.value, 1.0);
        assert_eq!(snapshot.stale_count(), 1);
    }

    #[test]
    fn test_refresh_clears_stale_flag() {
        let mut registry = HealthRegistry::new();

        let mut builder = registry.begin_cycle();
        builder.upsert(key("a1", "i1"), 1.0);
        registry.publish(builder.finish(StalenessPolicy::default()).0);

        let builder = registry.begin_cycle();
        registry.publish(builder.finish(StalenessPolicy::default()).0);
        assert!(registry.snapshot().get(&key("a1", "i1")).unwrap().is_stale());

        let mut builder = registry.begin_cycle();
        builder.upsert(key("a1", "i1"), 0.0);
        registry.publish(builder.finish(StalenessPolicy::default()).0);
        let state = *registry.snapshot().get(&key("a1", "i1")).unwrap();
        assert_eq!(
            state,
            SeriesState {
                value: 0.0,
                missed_cycles: 0
            }
        );
    }

    #[test]
    fn test_eviction_after_missed_cycles() {
        let policy = StalenessPolicy {
            evict_after_cycles: Some(2),
        };
        let mut registry = HealthRegistry::new();

        let mut builder = registry.begin_cycle();
        builder.upsert(key("a1", "i1"), 1.0);
        registry.publish(builder.finish(policy).0);

        let (snapshot, evicted) = registry.begin_cycle().finish(policy);
        assert_eq!(evicted, 0);
        registry.publish(snapshot);
        assert_eq!(registry.snapshot().len(), 1);

        let (snapshot, evicted) = registry.begin_cycle().finish(policy);
        assert_eq!(evicted, 1);
        registry.publish(snapshot);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_iteration_is_ordered() {
        let mut registry = HealthRegistry::new();
        let mut builder = registry.begin_cycle();
        builder.upsert(key("b", "2"), 1.0);
        builder.upsert(key("a", "9"), 1.0);
        builder.upsert(key("b", "1"), 1.0);
        registry.publish(builder.finish(StalenessPolicy::default()).0);

        let snapshot = registry.snapshot();
        let keys: Vec<_> = snapshot
            .iter()
            .map(|(k, _)| (k.agent.as_str(), k.instance.as_str()))
            .collect();
        assert_eq!(keys, vec![("a", "9"), ("b", "1"), ("b", "2")]);
    }
}
