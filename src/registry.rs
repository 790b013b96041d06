use std::collections::HashMap;

use crate::dedup::InMemoryDedupFilter;
use crate::error::{CrawlError, Result};
use crate::queue::in_memory::InMemorySchedulerQueue;
use crate::stats::InMemoryStatsCollector;

/// Stands in for the reference implementation's dotted-path plugin loading
/// (`load_object("myproject.middlewares.Foo")`): a static map from a short
/// name to a factory closure, resolved at configuration time rather than by
/// importing an arbitrary string at runtime.
///
/// Built-in queue/dedup/stats variants register under `"memory"` (and,
/// behind the `redis-queue` feature, `"redis"`); callers can add their own
/// before the engine loads.
pub struct Registry<T> {
    factories: HashMap<String, Box<dyn Fn() -> T + Send + Sync>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: impl Fn() -> T + Send + Sync + 'static) {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn resolve(&self, name: &str) -> Result<T> {
        self.factories
            .get(name)
            .map(|f| f())
            .ok_or_else(|| CrawlError::UsageError(format!("no component registered under {name:?}")))
    }
}

/// A registry of in-memory scheduler queues, seeded with the `"memory"`
/// built-in. Queues carry per-instance state, so each resolution is a fresh
/// instance rather than a shared singleton.
pub fn default_queue_registry(pending_threshold: std::time::Duration) -> Registry<InMemorySchedulerQueue> {
    let mut registry = Registry::new();
    registry.register("memory", move || InMemorySchedulerQueue::new(pending_threshold));
    registry
}

pub fn default_dedup_registry() -> Registry<InMemoryDedupFilter> {
    let mut registry = Registry::new();
    registry.register("memory", InMemoryDedupFilter::new);
    registry
}

pub fn default_stats_registry() -> Registry<InMemoryStatsCollector> {
    let mut registry = Registry::new();
    registry.register("memory", InMemoryStatsCollector::new);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_name_is_a_usage_error() {
        let registry: Registry<InMemoryDedupFilter> = default_dedup_registry();
        let err = registry.resolve("bogus").unwrap_err();
        assert!(matches!(err, CrawlError::UsageError(_)));
    }

    #[test]
    fn registered_name_resolves() {
        let registry = default_dedup_registry();
        assert!(registry.resolve("memory").is_ok());
    }
}
