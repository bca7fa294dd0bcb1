use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Samples kept per latency history
const HISTORY_LIMIT: usize = 1024;

/// Pipeline stages with timed durations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detect,
    Recognize,
    Translate,
    Erase,
    Compose,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Detect,
        Stage::Recognize,
        Stage::Translate,
        Stage::Erase,
        Stage::Compose,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Detect => "detect",
            Stage::Recognize => "recognize",
            Stage::Translate => "translate",
            Stage::Erase => "erase",
            Stage::Compose => "compose",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Process-wide pipeline metrics.
///
/// Cheap to clone; all clones share the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    frames_received: AtomicUsize,
    frames_dropped: DashMap<&'static str, AtomicUsize>,

    runs_presented: AtomicUsize,
    runs_skipped: DashMap<String, AtomicUsize>,

    translator_calls_total: AtomicUsize,
    translator_calls_failed: AtomicUsize,
    translator_latency_ms: RwLock<Vec<u64>>,

    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    cache_size: AtomicUsize,

    stage_duration_ms: [RwLock<Vec<u64>>; 5],

    circuit_breaker_trips: AtomicUsize,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                frames_received: AtomicUsize::new(0),
                frames_dropped: DashMap::new(),
                runs_presented: AtomicUsize::new(0),
                runs_skipped: DashMap::new(),
                translator_calls_total: AtomicUsize::new(0),
                translator_calls_failed: AtomicUsize::new(0),
                translator_latency_ms: RwLock::new(Vec::new()),
                cache_hits: AtomicUsize::new(0),
                cache_misses: AtomicUsize::new(0),
                cache_size: AtomicUsize::new(0),
                stage_duration_ms: Default::default(),
                circuit_breaker_trips: AtomicUsize::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    // Frame admission
    pub fn record_frame_received(&self) {
        self.inner.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_dropped(&self, reason: &'static str) {
        self.inner
            .frames_dropped
            .entry(reason)
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    // Run outcomes
    pub fn record_run_presented(&self) {
        self.inner.runs_presented.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_skipped(&self, reason: &str) {
        self.inner
            .runs_skipped
            .entry(reason.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    // Translator backend
    pub fn record_translator_call(&self, success: bool, duration: Duration) {
        self.inner.translator_calls_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.translator_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        push_bounded(&self.inner.translator_latency_ms, duration);
    }

    // Fingerprint cache
    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_cache_size(&self, size: usize) {
        self.inner.cache_size.store(size, Ordering::Relaxed);
    }

    pub fn record_stage_duration(&self, stage: Stage, duration: Duration) {
        push_bounded(&self.inner.stage_duration_ms[stage.index()], duration);
    }

    pub fn record_circuit_breaker_trip(&self) {
        self.inner.circuit_breaker_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.inner.translator_latency_ms.read();
        let translator_latency_avg_ms = avg(&latency);
        let translator_latency_p95_ms = percentile(&latency, 0.95);
        drop(latency);

        let stage_avg_ms = Stage::ALL
            .iter()
            .map(|stage| {
                let durations = self.inner.stage_duration_ms[stage.index()].read();
                (stage.as_str().to_string(), avg(&durations))
            })
            .collect();

        let cache_hits = self.inner.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.inner.cache_misses.load(Ordering::Relaxed);
        let cache_total = cache_hits + cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            cache_hits as f64 / cache_total as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            frames_received: self.inner.frames_received.load(Ordering::Relaxed),
            frames_dropped: collect_counters(
                self.inner
                    .frames_dropped
                    .iter()
                    .map(|e| (e.key().to_string(), e.value().load(Ordering::Relaxed))),
            ),
            runs_presented: self.inner.runs_presented.load(Ordering::Relaxed),
            runs_skipped: collect_counters(
                self.inner
                    .runs_skipped
                    .iter()
                    .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed))),
            ),
            translator_calls_total: self.inner.translator_calls_total.load(Ordering::Relaxed),
            translator_calls_failed: self.inner.translator_calls_failed.load(Ordering::Relaxed),
            translator_latency_avg_ms,
            translator_latency_p95_ms,
            cache_hits,
            cache_misses,
            cache_hit_rate,
            cache_size: self.inner.cache_size.load(Ordering::Relaxed),
            stage_avg_ms,
            circuit_breaker_trips: self.inner.circuit_breaker_trips.load(Ordering::Relaxed),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut out = String::new();

        let _ = writeln!(out, "# HELP frames_received_total Frames delivered to the pipeline");
        let _ = writeln!(out, "# TYPE frames_received_total counter");
        let _ = writeln!(out, "frames_received_total {}", s.frames_received);

        let _ = writeln!(out, "\n# HELP frames_dropped_total Frames dropped before analysis");
        let _ = writeln!(out, "# TYPE frames_dropped_total counter");
        for (reason, count) in &s.frames_dropped {
            let _ = writeln!(out, "frames_dropped_total{{reason=\"{}\"}} {}", reason, count);
        }

        let _ = writeln!(out, "\n# HELP runs_presented_total Runs that presented an overlay");
        let _ = writeln!(out, "# TYPE runs_presented_total counter");
        let _ = writeln!(out, "runs_presented_total {}", s.runs_presented);

        let _ = writeln!(out, "\n# HELP runs_skipped_total Runs that ended without presenting");
        let _ = writeln!(out, "# TYPE runs_skipped_total counter");
        for (reason, count) in &s.runs_skipped {
            let _ = writeln!(out, "runs_skipped_total{{reason=\"{}\"}} {}", reason, count);
        }

        let _ = writeln!(out, "\n# HELP translator_calls_total Translation backend calls");
        let _ = writeln!(out, "# TYPE translator_calls_total counter");
        let _ = writeln!(out, "translator_calls_total {}", s.translator_calls_total);
        let _ = writeln!(out, "translator_calls_failed_total {}", s.translator_calls_failed);

        let _ = writeln!(out, "\n# HELP translator_latency_avg_ms Average backend latency");
        let _ = writeln!(out, "# TYPE translator_latency_avg_ms gauge");
        let _ = writeln!(out, "translator_latency_avg_ms {}", s.translator_latency_avg_ms);

        let _ = writeln!(out, "\n# HELP cache_hit_rate Fingerprint cache hit rate (0.0 to 1.0)");
        let _ = writeln!(out, "# TYPE cache_hit_rate gauge");
        let _ = writeln!(out, "cache_hit_rate {}", s.cache_hit_rate);

        let _ = writeln!(out, "\n# HELP cache_size Live fingerprint cache entries");
        let _ = writeln!(out, "# TYPE cache_size gauge");
        let _ = writeln!(out, "cache_size {}", s.cache_size);

        let _ = writeln!(out, "\n# HELP stage_avg_duration_ms Average stage duration");
        let _ = writeln!(out, "# TYPE stage_avg_duration_ms gauge");
        for (stage, ms) in &s.stage_avg_ms {
            let _ = writeln!(out, "stage_avg_duration_ms{{stage=\"{}\"}} {}", stage, ms);
        }

        let _ = writeln!(out, "\n# HELP circuit_breaker_trips_total Translator circuit trips");
        let _ = writeln!(out, "# TYPE circuit_breaker_trips_total counter");
        let _ = writeln!(out, "circuit_breaker_trips_total {}", s.circuit_breaker_trips);

        let _ = writeln!(out, "\n# HELP uptime_seconds Application uptime in seconds");
        let _ = writeln!(out, "# TYPE uptime_seconds counter");
        let _ = writeln!(out, "uptime_seconds {}", s.uptime_seconds);

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub frames_received: usize,
    pub frames_dropped: BTreeMap<String, usize>,
    pub runs_presented: usize,
    pub runs_skipped: BTreeMap<String, usize>,
    pub translator_calls_total: usize,
    pub translator_calls_failed: usize,
    pub translator_latency_avg_ms: u64,
    pub translator_latency_p95_ms: u64,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_hit_rate: f64,
    pub cache_size: usize,
    pub stage_avg_ms: BTreeMap<String, u64>,
    pub circuit_breaker_trips: usize,
    pub uptime_seconds: u64,
}

fn push_bounded(history: &RwLock<Vec<u64>>, duration: Duration) {
    let mut history = history.write();
    if history.len() >= HISTORY_LIMIT {
        history.remove(0);
    }
    history.push(duration.as_millis() as u64);
}

fn collect_counters(entries: impl Iterator<Item = (String, usize)>) -> BTreeMap<String, usize> {
    entries.collect()
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_frame_received();
        metrics.record_frame_received();
        metrics.record_frame_dropped("throttled");
        metrics.record_run_presented();
        metrics.record_run_skipped("no_balloons");
        metrics.record_translator_call(true, Duration::from_millis(100));
        metrics.record_translator_call(false, Duration::from_millis(50));
        metrics.record_cache_hit();
        metrics.record_cache_miss();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.frames_dropped.get("throttled"), Some(&1));
        assert_eq!(snapshot.runs_presented, 1);
        assert_eq!(snapshot.runs_skipped.get("no_balloons"), Some(&1));
        assert_eq!(snapshot.translator_calls_total, 2);
        assert_eq!(snapshot.translator_calls_failed, 1);
        assert_eq!(snapshot.translator_latency_avg_ms, 75);
        assert_eq!(snapshot.cache_hit_rate, 0.5);
    }

    #[test]
    fn test_stage_averages() {
        let metrics = Metrics::new();
        metrics.record_stage_duration(Stage::Erase, Duration::from_millis(10));
        metrics.record_stage_duration(Stage::Erase, Duration::from_millis(30));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.stage_avg_ms.get("erase"), Some(&20));
        assert_eq!(snapshot.stage_avg_ms.get("detect"), Some(&0));
    }

    #[test]
    fn test_history_is_bounded() {
        let metrics = Metrics::new();
        for _ in 0..(HISTORY_LIMIT + 10) {
            metrics.record_translator_call(true, Duration::from_millis(1));
        }
        assert_eq!(metrics.inner.translator_latency_ms.read().len(), HISTORY_LIMIT);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_frame_received();
        metrics.record_frame_dropped("overlay_active");

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("frames_received_total 1"));
        assert!(prometheus.contains("frames_dropped_total{reason=\"overlay_active\"} 1"));
        assert!(prometheus.contains("stage_avg_duration_ms{stage=\"compose\"} 0"));
    }
}
