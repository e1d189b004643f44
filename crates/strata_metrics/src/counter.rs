//! Named counters for tracking storage events

use std::collections::BTreeMap;

/// Monotonic event counters keyed by a static name.
///
/// Keys are kept ordered so snapshots and log output are stable.
#[derive(Debug, Clone, Default)]
pub struct Counter {
    counters: BTreeMap<&'static str, usize>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            counters: BTreeMap::new(),
        }
    }

    pub fn increment(&mut self, name: &'static str, value: usize) {
        *self.counters.entry(name).or_insert(0) += value;
    }

    pub fn set(&mut self, name: &'static str, value: usize) {
        self.counters.insert(name, value);
    }

    pub fn get(&self, name: &str) -> usize {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn reset(&mut self, name: &'static str) {
        self.counters.insert(name, 0);
    }

    pub fn reset_all(&mut self) {
        self.counters.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        self.counters.iter().map(|(name, value)| (*name, *value))
    }

    /// Copy the current values out, ordered by name.
    pub fn snapshot(&self) -> Vec<(&'static str, usize)> {
        self.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates() {
        let mut counter = Counter::new();
        counter.increment("spawned", 1);
        counter.increment("spawned", 2);
        counter.set("archetypes", 4);

        assert_eq!(counter.get("spawned"), 3);
        assert_eq!(counter.get("archetypes"), 4);
        assert_eq!(counter.get("missing"), 0);

        counter.reset("spawned");
        assert_eq!(counter.get("spawned"), 0);
    }

    #[test]
    fn test_snapshot_is_ordered() {
        let mut counter = Counter::new();
        counter.increment("zeta", 1);
        counter.increment("alpha", 2);
        assert_eq!(counter.snapshot(), vec![("alpha", 2), ("zeta", 1)]);

        counter.reset_all();
        assert!(counter.snapshot().is_empty());
    }
}
