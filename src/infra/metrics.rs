//! Lock-free pipeline metrics
//!
//! Frame, cycle, detector and event counters are plain atomics updated from
//! the ingestion, cycle and sink tasks. `report()` swaps the per-window
//! counters for the periodic log line; `snapshot()` reads the monotonic ones
//! for the Prometheus endpoint.
//!
//! NOTE: Relaxed ordering throughout. These are statistics only and must not
//! drive tracking decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Cycle latency bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Detector round-trip bucket boundaries (milliseconds)
/// Buckets: ≤5, ≤10, ≤20, ≤40, ≤80, ≤160, ≤320, ≤640, ≤1280, ≤2560, >2560 ms
const DETECT_BOUNDS: [u64; 10] = [5, 10, 20, 40, 80, 160, 320, 640, 1280, 2560];

#[inline]
fn bucket_index(bounds: &[u64; 10], value: u64) -> usize {
    bounds.partition_point(|&bound| bound < value)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], bounds: &[u64; 10], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile) as u64).max(1);
    let mut cumulative = 0u64;
    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            // Last bucket has no upper bound; report 2x the last finite one
            return bounds.get(i).copied().unwrap_or(bounds[9] * 2);
        }
    }
    bounds[9] * 2
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method swaps the periodic counters to get a snapshot.
pub struct Metrics {
    /// Frames read from the ingestion connection (monotonic)
    frames_received: AtomicU64,
    /// Frames overwritten in the mailbox before a cycle picked them up (monotonic)
    frames_replaced: AtomicU64,
    /// Frames skipped as undecodable (monotonic)
    frames_skipped: AtomicU64,
    /// Ingestion sessions opened (monotonic)
    sessions_opened: AtomicU64,
    /// Tracking cycles completed (monotonic)
    cycles_total: AtomicU64,
    /// Cycles since last report (reset on report)
    cycles_since_report: AtomicU64,
    /// Sum of cycle latencies in microseconds (reset on report)
    cycle_latency_sum_us: AtomicU64,
    /// Max cycle latency (reset on report)
    cycle_latency_max_us: AtomicU64,
    /// Sum of all cycle latencies (monotonic, for Prometheus)
    cycle_latency_total_us: AtomicU64,
    /// Cycle latency histogram (monotonic, for Prometheus)
    cycle_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Detector round-trip histogram in milliseconds (monotonic)
    detect_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of detector round-trips (monotonic)
    detect_latency_sum_ms: AtomicU64,
    /// Detector transport/protocol failures (monotonic)
    detector_errors: AtomicU64,
    /// Events produced by the tracker (monotonic)
    events_emitted: AtomicU64,
    /// Events dropped because the sink queue was full (monotonic)
    events_dropped: AtomicU64,
    /// Events accepted by the sink with a 2xx (monotonic)
    events_delivered: AtomicU64,
    /// Events that failed delivery (monotonic)
    events_failed: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            frames_replaced: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            sessions_opened: AtomicU64::new(0),
            cycles_total: AtomicU64::new(0),
            cycles_since_report: AtomicU64::new(0),
            cycle_latency_sum_us: AtomicU64::new(0),
            cycle_latency_max_us: AtomicU64::new(0),
            cycle_latency_total_us: AtomicU64::new(0),
            cycle_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            detect_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            detect_latency_sum_ms: AtomicU64::new(0),
            detector_errors: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            events_failed: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frame_replaced(&self) {
        self.frames_replaced.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frame_skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed tracking cycle (lock-free)
    #[inline]
    pub fn record_cycle(&self, latency_us: u64) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        self.cycles_since_report.fetch_add(1, Ordering::Relaxed);
        self.cycle_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.cycle_latency_total_us.fetch_add(latency_us, Ordering::Relaxed);
        self.cycle_latency_buckets[bucket_index(&BUCKET_BOUNDS, latency_us)]
            .fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.cycle_latency_max_us, latency_us);
    }

    /// Record a detector round-trip (lock-free)
    #[inline]
    pub fn record_detect_latency(&self, latency_ms: u64) {
        self.detect_latency_buckets[bucket_index(&DETECT_BOUNDS, latency_ms)]
            .fetch_add(1, Ordering::Relaxed);
        self.detect_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_detector_error(&self) {
        self.detector_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_delivered(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_failed(&self) {
        self.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn cycles_total(&self) -> u64 {
        self.cycles_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events_delivered(&self) -> u64 {
        self.events_delivered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events_failed(&self) -> u64 {
        self.events_failed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped.load(Ordering::Relaxed)
    }

    /// Snapshot of the monotonic counters and histograms (no reset)
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_replaced: self.frames_replaced.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            cycle_lat_buckets: load_buckets(&self.cycle_latency_buckets),
            cycle_lat_sum_us: self.cycle_latency_total_us.load(Ordering::Relaxed),
            detect_lat_buckets: load_buckets(&self.detect_latency_buckets),
            detect_lat_sum_ms: self.detect_latency_sum_ms.load(Ordering::Relaxed),
            detector_errors: self.detector_errors.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_failed: self.events_failed.load(Ordering::Relaxed),
        }
    }

    /// Calculate the periodic summary, then reset periodic counters
    pub fn report(&self) -> MetricsSummary {
        let cycles = self.cycles_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.cycle_latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.cycle_latency_max_us.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let cycles_per_sec =
            if elapsed.as_secs_f64() > 0.0 { cycles as f64 / elapsed.as_secs_f64() } else { 0.0 };
        let avg_latency = if cycles > 0 { latency_sum / cycles } else { 0 };

        let snapshot = self.snapshot();
        MetricsSummary {
            cycles_per_sec,
            avg_cycle_latency_us: avg_latency,
            max_cycle_latency_us: max_latency,
            cycle_p99_us: percentile_from_buckets(&snapshot.cycle_lat_buckets, &BUCKET_BOUNDS, 0.99),
            detect_p95_ms: percentile_from_buckets(&snapshot.detect_lat_buckets, &DETECT_BOUNDS, 0.95),
            snapshot,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;
/// Exported bucket bounds for Prometheus formatting
pub const METRICS_CYCLE_BOUNDS: [u64; 10] = BUCKET_BOUNDS;
pub const METRICS_DETECT_BOUNDS: [u64; 10] = DETECT_BOUNDS;

/// Monotonic counters
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_replaced: u64,
    pub frames_skipped: u64,
    pub sessions_opened: u64,
    pub cycles_total: u64,
    pub cycle_lat_buckets: [u64; NUM_BUCKETS],
    pub cycle_lat_sum_us: u64,
    pub detect_lat_buckets: [u64; NUM_BUCKETS],
    pub detect_lat_sum_ms: u64,
    pub detector_errors: u64,
    pub events_emitted: u64,
    pub events_dropped: u64,
    pub events_delivered: u64,
    pub events_failed: u64,
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub snapshot: MetricsSnapshot,
    pub cycles_per_sec: f64,
    pub avg_cycle_latency_us: u64,
    pub max_cycle_latency_us: u64,
    pub cycle_p99_us: u64,
    pub detect_p95_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        let s = &self.snapshot;
        info!(
            cycles_total = %s.cycles_total,
            cycles_per_sec = format!("{:.1}", self.cycles_per_sec),
            avg_cycle_us = %self.avg_cycle_latency_us,
            max_cycle_us = %self.max_cycle_latency_us,
            cycle_p99_us = %self.cycle_p99_us,
            detect_p95_ms = %self.detect_p95_ms,
            frames = %s.frames_received,
            frames_replaced = %s.frames_replaced,
            frames_skipped = %s.frames_skipped,
            detector_errors = %s.detector_errors,
            events = %s.events_emitted,
            events_dropped = %s.events_dropped,
            events_failed = %s.events_failed,
            "metrics"
        );
    }
}
