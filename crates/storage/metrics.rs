use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::debug;

/// Per-engine operation counters.
///
/// Counters are single atomic increments and are always live; `meter`
/// attaches the name prefix they are reported under.
#[derive(Debug, Default)]
pub struct DatabaseMetrics {
    prefix: Mutex<Option<String>>,
    pub reads: AtomicU64,
    pub writes: AtomicU64,
    pub deletes: AtomicU64,
    pub batch_writes: AtomicU64,
    pub batch_items: AtomicU64,
}

impl DatabaseMetrics {
    pub fn install(&self, prefix: &str) {
        debug!(prefix, "installed database metrics");
        if let Ok(mut slot) = self.prefix.lock() {
            *slot = Some(prefix.to_string());
        }
    }

    pub fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_write(&self, items: u64) {
        self.batch_writes.fetch_add(1, Ordering::Relaxed);
        self.batch_items.fetch_add(items, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DatabaseMetricsSnapshot {
        DatabaseMetricsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            batch_writes: self.batch_writes.load(Ordering::Relaxed),
            batch_items: self.batch_items.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseMetricsSnapshot {
    pub reads: u64,
    pub writes: u64,
    pub deletes: u64,
    pub batch_writes: u64,
    pub batch_items: u64,
}

impl std::fmt::Display for DatabaseMetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "reads={} writes={} deletes={} batch_writes={} batch_items={}",
            self.reads, self.writes, self.deletes, self.batch_writes, self.batch_items,
        )
    }
}

/// Hit/miss counters of one namespace cache.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
}

impl CacheMetrics {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = DatabaseMetrics::default();
        metrics.record_read();
        metrics.record_read();
        metrics.record_write();
        metrics.record_batch_write(25);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.reads, 2);
        assert_eq!(snapshot.writes, 1);
        assert_eq!(snapshot.batch_writes, 1);
        assert_eq!(snapshot.batch_items, 25);
    }
}
