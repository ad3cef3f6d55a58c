//! Pipeline counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCounts {
    pub memory_hits: u64,
    pub store_hits: u64,
    /// Individual candidate fetches, retries included.
    pub network_fetches: u64,
    /// Fallback glyphs served.
    pub fallbacks: u64,
    /// Failed loads answered from an older store copy instead.
    pub stale_hits: u64,
    pub retries_scheduled: u64,
    pub offline_drops: u64,
}

/// Live counters owned by the pipeline; `snapshot` for reading.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    memory_hits: AtomicU64,
    store_hits: AtomicU64,
    network_fetches: AtomicU64,
    fallbacks: AtomicU64,
    stale_hits: AtomicU64,
}

impl Counters {
    pub(crate) fn memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn store_hit(&self) {
        self.store_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn network_fetch(&self) {
        self.network_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stale_hit(&self) {
        self.stale_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Retry figures live in the scheduler and are merged in by the caller.
    pub(crate) fn snapshot(&self) -> PipelineCounts {
        PipelineCounts {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            store_hits: self.store_hits.load(Ordering::Relaxed),
            network_fetches: self.network_fetches.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            retries_scheduled: 0,
            offline_drops: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let counters = Counters::default();
        counters.memory_hit();
        counters.network_fetch();
        counters.network_fetch();
        counters.fallback();
        counters.stale_hit();

        let counts = counters.snapshot();
        assert_eq!(counts.memory_hits, 1);
        assert_eq!(counts.store_hits, 0);
        assert_eq!(counts.network_fetches, 2);
        assert_eq!(counts.fallbacks, 1);
        assert_eq!(counts.stale_hits, 1);
    }

    #[test]
    fn serializes_to_snake_case_fields() {
        let json = serde_json::to_value(PipelineCounts::default()).unwrap();
        assert_eq!(json["network_fetches"], 0);
        assert_eq!(json["offline_drops"], 0);
    }
}
