//! Counters and timing windows for tile loading and path tracing.
//!
//! [`TileLoadStats`] is always live; the cache and tile sources need it for
//! correct accounting. [`TraceMetrics`] is feature-gated and runtime-toggled
//! to ensure zero overhead when disabled.
//!
//! # Usage
//!
//! ```ignore
//! use octree_tracer::metrics::{TraceMetrics, COLLECT_METRICS};
//!
//! // Compile with --features metrics
//! // Runtime toggle:
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//!
//! metrics.record_search(elapsed_us, &outcome);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::trace::SearchOutcome;

/// Runtime toggle for metrics collection.
/// Set to false to disable metrics gathering at runtime.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// Check if metrics collection is enabled (both compile-time and runtime).
#[inline]
pub fn is_enabled() -> bool {
    #[cfg(feature = "metrics")]
    {
        COLLECT_METRICS.load(Ordering::Relaxed)
    }
    #[cfg(not(feature = "metrics"))]
    {
        false
    }
}

/// Tile load accounting shared by a cache and the sources it drives.
#[derive(Debug, Default)]
pub struct TileLoadStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    /// Requests that waited on another request's in-flight load.
    coalesced: AtomicU64,
    /// Source reads actually started.
    loads: AtomicU64,
    missing: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time copy of [`TileLoadStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileLoadSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub coalesced: u64,
    pub loads: u64,
    pub missing: u64,
    pub failures: u64,
    pub evictions: u64,
}

impl TileLoadStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        Self::bump(&self.cache_hits);
    }

    pub fn record_miss(&self) {
        Self::bump(&self.cache_misses);
    }

    pub fn record_coalesced(&self) {
        Self::bump(&self.coalesced);
    }

    /// Called by tile sources when they start reading storage.
    pub fn record_load(&self) {
        Self::bump(&self.loads);
    }

    pub fn record_missing(&self) {
        Self::bump(&self.missing);
    }

    pub fn record_failure(&self) {
        Self::bump(&self.failures);
    }

    pub fn record_eviction(&self) {
        Self::bump(&self.evictions);
    }

    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TileLoadSnapshot {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        TileLoadSnapshot {
            cache_hits: read(&self.cache_hits),
            cache_misses: read(&self.cache_misses),
            coalesced: read(&self.coalesced),
            loads: read(&self.loads),
            missing: read(&self.missing),
            failures: read(&self.failures),
            evictions: read(&self.evictions),
        }
    }
}

/// Rolling window for storing recent values (e.g., timing history).
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    buffer: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingWindow<T> {
    /// Create a new rolling window with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a new value, evicting the oldest if at capacity.
    pub fn push(&mut self, value: T) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Iterate over values (oldest to newest).
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buffer.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.buffer.back()
    }
}

impl RollingWindow<u64> {
    pub fn sum(&self) -> u64 {
        self.buffer.iter().sum()
    }

    pub fn average(&self) -> f64 {
        if self.buffer.is_empty() {
            0.0
        } else {
            self.sum() as f64 / self.buffer.len() as f64
        }
    }

    pub fn min_max(&self) -> Option<(u64, u64)> {
        let min = *self.buffer.iter().min()?;
        let max = *self.buffer.iter().max()?;
        Some((min, max))
    }
}

impl Default for RollingWindow<u64> {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Search statistics accumulated across trace requests.
#[derive(Debug, Clone, Default)]
pub struct TraceMetrics {
    /// Rolling window of search times in microseconds.
    pub search_timings: RollingWindow<u64>,
    /// Rolling window of nodes expanded per search.
    pub expansions: RollingWindow<u64>,

    pub traced: u64,
    pub timed_out: u64,
    pub no_path: u64,
    pub cancelled: u64,
}

impl TraceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished search.
    pub fn record_search(&mut self, timing_us: u64, outcome: &SearchOutcome) {
        if !is_enabled() {
            return;
        }
        self.search_timings.push(timing_us);
        self.expansions.push(outcome.expanded() as u64);
        match outcome {
            SearchOutcome::Found(_) => self.traced += 1,
            SearchOutcome::TimedOut { .. } => self.timed_out += 1,
            SearchOutcome::NoPathFound { .. } => self.no_path += 1,
            SearchOutcome::Cancelled { .. } => self.cancelled += 1,
        }
    }

    pub fn total_searches(&self) -> u64 {
        self.traced + self.timed_out + self.no_path + self.cancelled
    }

    pub fn avg_search_timing_us(&self) -> f64 {
        self.search_timings.average()
    }
}
