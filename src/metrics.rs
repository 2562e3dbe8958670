// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for ward-sync.
//!
//! Two layers:
//! - free functions over the `metrics` facade, so the host picks the exporter
//!   (Prometheus, OTEL, a debugging recorder in tests);
//! - [`EngineMetrics`], an explicit collector handle with an injected
//!   [`Clock`]. Every engine component receives the same handle, and tests
//!   build as many independent collectors as they like.
//!
//! # Metric Naming Convention
//! - `ward_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `strategy`: cache_first, network_first, navigation, stale_while_revalidate
//! - `source`: network, cache, shell, offline
//! - `outcome`: synced, failed, discarded

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::queue::SyncPassResult;
use crate::router::ResponseSource;

/// Record a served read
pub fn record_served(strategy: &str, source: &str) {
    counter!(
        "ward_sync_requests_total",
        "strategy" => strategy.to_string(),
        "source" => source.to_string()
    )
    .increment(1);
}

/// Record a network failure absorbed by a strategy
pub fn record_fetch_failure(strategy: &str) {
    counter!(
        "ward_sync_fetch_failures_total",
        "strategy" => strategy.to_string()
    )
    .increment(1);
}

/// Record time spent serving a read
pub fn record_route_latency(strategy: &str, duration: Duration) {
    histogram!(
        "ward_sync_route_seconds",
        "strategy" => strategy.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a response written into a cache namespace
pub fn record_cache_write(namespace: &str) {
    counter!(
        "ward_sync_cache_writes_total",
        "namespace" => namespace.to_string()
    )
    .increment(1);
}

/// Record entries removed by a trim or a namespace rotation
pub fn record_cache_evictions(reason: &str, count: usize) {
    counter!(
        "ward_sync_cache_evictions_total",
        "reason" => reason.to_string()
    )
    .increment(count as u64);
}

/// Set mutation queue depth
pub fn set_queue_depth(count: usize) {
    gauge!("ward_sync_queue_depth").set(count as f64);
}

/// Record a mutation appended to the queue
pub fn record_enqueue(table: &str) {
    counter!(
        "ward_sync_enqueued_total",
        "table" => table.to_string()
    )
    .increment(1);
}

/// Record the outcome of one replay pass
pub fn record_sync_pass(result: &SyncPassResult) {
    counter!("ward_sync_sync_passes_total").increment(1);
    counter!("ward_sync_mutations_total", "outcome" => "synced").increment(result.synced as u64);
    counter!("ward_sync_mutations_total", "outcome" => "failed").increment(result.failed as u64);
    counter!("ward_sync_mutations_total", "outcome" => "discarded")
        .increment(result.discarded as u64);
    histogram!("ward_sync_sync_pass_seconds").record(result.duration.as_secs_f64());
}

/// Record a sync trigger skipped because a pass was already running
pub fn record_sync_skipped(trigger: &str) {
    counter!(
        "ward_sync_sync_skipped_total",
        "trigger" => trigger.to_string()
    )
    .increment(1);
}

/// Record a value that could not be opened and was passed through
pub fn record_decrypt_passthrough() {
    counter!("ward_sync_decrypt_passthrough_total").increment(1);
}

/// Record a push event outcome (shown, dropped)
pub fn record_push(outcome: &str) {
    counter!(
        "ward_sync_push_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Track engine state transitions
pub fn set_engine_state(state: &str) {
    counter!(
        "ward_sync_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

/// Set connectivity (1 = online, 0 = offline)
pub fn set_online(online: bool) {
    gauge!("ward_sync_online").set(if online { 1.0 } else { 0.0 });
}

/// A timing guard that records route latency on drop
pub struct LatencyTimer {
    strategy: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(strategy: &'static str) -> Self {
        Self {
            strategy,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_route_latency(self.strategy, self.start.elapsed());
    }
}

/// Point-in-time copy of an [`EngineMetrics`] collector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub cache_served: u64,
    pub offline_served: u64,
    pub enqueued: u64,
    pub synced: u64,
    pub failed: u64,
    pub discarded: u64,
    pub sync_passes: u64,
    pub notifications: u64,
    pub uptime_ms: i64,
    pub idle_ms: i64,
}

/// Engine-wide counters plus an activity timer, driven by an injected clock.
///
/// Each method also forwards to the `metrics` facade.
pub struct EngineMetrics {
    clock: Arc<dyn Clock>,
    started_at: i64,
    last_activity: AtomicI64,
    requests: AtomicU64,
    cache_served: AtomicU64,
    offline_served: AtomicU64,
    enqueued: AtomicU64,
    synced: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
    sync_passes: AtomicU64,
    notifications: AtomicU64,
}

impl EngineMetrics {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        Self {
            clock,
            started_at: now,
            last_activity: AtomicI64::new(now),
            requests: AtomicU64::new(0),
            cache_served: AtomicU64::new(0),
            offline_served: AtomicU64::new(0),
            enqueued: AtomicU64::new(0),
            synced: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            sync_passes: AtomicU64::new(0),
            notifications: AtomicU64::new(0),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Mark the engine as active now.
    pub fn touch(&self) {
        self.last_activity
            .store(self.clock.now_millis(), Ordering::Release);
    }

    pub fn served(&self, strategy: &'static str, source: ResponseSource) {
        self.touch();
        self.requests.fetch_add(1, Ordering::Relaxed);
        match source {
            ResponseSource::Cache | ResponseSource::Shell => {
                self.cache_served.fetch_add(1, Ordering::Relaxed);
            }
            ResponseSource::Offline => {
                self.offline_served.fetch_add(1, Ordering::Relaxed);
            }
            ResponseSource::Network => {}
        }
        record_served(strategy, source.as_str());
    }

    pub fn enqueued(&self, table: &str, depth: usize) {
        self.touch();
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        record_enqueue(table);
        set_queue_depth(depth);
    }

    pub fn sync_pass(&self, result: &SyncPassResult, depth: usize) {
        self.touch();
        self.sync_passes.fetch_add(1, Ordering::Relaxed);
        self.synced.fetch_add(result.synced as u64, Ordering::Relaxed);
        self.failed.fetch_add(result.failed as u64, Ordering::Relaxed);
        self.discarded
            .fetch_add(result.discarded as u64, Ordering::Relaxed);
        record_sync_pass(result);
        set_queue_depth(depth);
    }

    pub fn notification(&self) {
        self.touch();
        self.notifications.fetch_add(1, Ordering::Relaxed);
        record_push("shown");
    }

    /// Time since the last recorded activity.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        let idle = self.clock.now_millis() - self.last_activity.load(Ordering::Acquire);
        Duration::from_millis(idle.max(0) as u64)
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = self.clock.now_millis();
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_served: self.cache_served.load(Ordering::Relaxed),
            offline_served: self.offline_served.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            synced: self.synced.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            sync_passes: self.sync_passes.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            uptime_ms: now - self.started_at,
            idle_ms: now - self.last_activity.load(Ordering::Acquire),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn collector() -> (Arc<ManualClock>, EngineMetrics) {
        let clock = Arc::new(ManualClock::new(1_000));
        let metrics = EngineMetrics::new(clock.clone());
        (clock, metrics)
    }

    #[test]
    fn test_facade_calls_without_recorder() {
        record_served("cache_first", "cache");
        record_fetch_failure("network_first");
        record_cache_write("ward-sync-static-v1");
        record_cache_evictions("trim", 3);
        set_queue_depth(4);
        record_sync_skipped("manual");
        record_decrypt_passthrough();
        set_engine_state("Running");
        set_online(false);
        let _timer = LatencyTimer::new("navigation");
    }

    #[test]
    fn test_served_counts_by_source() {
        let (_clock, metrics) = collector();
        metrics.served("cache_first", ResponseSource::Cache);
        metrics.served("network_first", ResponseSource::Network);
        metrics.served("navigation", ResponseSource::Shell);
        metrics.served("cache_first", ResponseSource::Offline);

        let snap = metrics.snapshot();
        assert_eq!(snap.requests, 4);
        assert_eq!(snap.cache_served, 2);
        assert_eq!(snap.offline_served, 1);
    }

    #[test]
    fn test_sync_pass_accumulates() {
        let (_clock, metrics) = collector();
        let pass = SyncPassResult {
            synced: 3,
            failed: 2,
            discarded: 1,
            duration: Duration::from_millis(12),
        };
        metrics.sync_pass(&pass, 1);
        metrics.sync_pass(&pass, 1);

        let snap = metrics.snapshot();
        assert_eq!(snap.sync_passes, 2);
        assert_eq!(snap.synced, 6);
        assert_eq!(snap.failed, 4);
        assert_eq!(snap.discarded, 2);
    }

    #[test]
    fn test_idle_timer_follows_injected_clock() {
        let (clock, metrics) = collector();
        clock.advance(Duration::from_secs(30));
        assert_eq!(metrics.idle_for(), Duration::from_secs(30));

        metrics.enqueued("vitals", 1);
        assert_eq!(metrics.idle_for(), Duration::ZERO);

        clock.advance(Duration::from_secs(5));
        let snap = metrics.snapshot();
        assert_eq!(snap.idle_ms, 5_000);
        assert_eq!(snap.uptime_ms, 35_000);
    }

    #[test]
    fn test_collectors_are_independent() {
        let (_c1, first) = collector();
        let (_c2, second) = collector();
        first.notification();
        assert_eq!(first.snapshot().notifications, 1);
        assert_eq!(second.snapshot().notifications, 0);
    }
}
