// ============================================
// MENULENS - Analysis Metrics
// In-process counters and timings for the orchestrator
// ============================================

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

pub const CACHE_HITS: &str = "cache_hits";
pub const CACHE_MISSES: &str = "cache_misses";
pub const LIVE_CALLS: &str = "live_calls";
pub const FAILURES: &str = "failures";
pub const OFFLINE_FALLBACKS: &str = "offline_fallbacks";
pub const TRIAL_DENIALS: &str = "trial_denials";
pub const ANALYSIS: &str = "analysis";

/// Counters and timing samples, owned by one orchestrator.
pub struct Metrics {
    timers: RwLock<BTreeMap<String, Vec<Duration>>>,
    counters: RwLock<BTreeMap<String, u64>>,
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create an empty collector; uptime starts now
    pub fn new() -> Self {
        Self {
            timers: RwLock::new(BTreeMap::new()),
            counters: RwLock::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a timing measurement
    pub fn record_time(&self, name: &str, duration: Duration) {
        if let Ok(mut timers) = self.timers.write() {
            timers.entry(name.to_string()).or_default().push(duration);
        }
    }

    /// Increment a counter
    pub fn increment(&self, name: &str) {
        if let Ok(mut counters) = self.counters.write() {
            *counters.entry(name.to_string()).or_insert(0) += 1;
        }
    }

    /// Get counter value
    pub fn get_counter(&self, name: &str) -> u64 {
        self.counters
            .read()
            .ok()
            .and_then(|c| c.get(name).copied())
            .unwrap_or(0)
    }

    /// Get timing statistics for a metric
    pub fn get_timing_stats(&self, name: &str) -> Option<TimingStats> {
        let timers = self.timers.read().ok()?;
        TimingStats::from_samples(timers.get(name)?)
    }

    /// Get all metrics as a summary
    pub fn summary(&self) -> MetricsSummary {
        let timings = self
            .timers
            .read()
            .map(|t| {
                t.iter()
                    .filter_map(|(k, v)| TimingStats::from_samples(v).map(|s| (k.clone(), s)))
                    .collect()
            })
            .unwrap_or_default();

        let counters = self.counters.read().map(|c| c.clone()).unwrap_or_default();

        MetricsSummary {
            uptime: self.start_time.elapsed(),
            timings,
            counters,
        }
    }
}

/// Aggregates over the recorded samples of one timer
#[derive(Debug, Clone, PartialEq)]
pub struct TimingStats {
    pub count: usize,
    pub avg: Duration,
    pub min: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p95: Duration,
}

impl TimingStats {
    fn from_samples(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort();
        let count = sorted.len();
        let total: Duration = sorted.iter().sum();
        let p95_index = ((count as f64 * 0.95) as usize).min(count - 1);

        Some(Self {
            count,
            avg: total / count as u32,
            min: sorted[0],
            max: sorted[count - 1],
            p50: sorted[count / 2],
            p95: sorted[p95_index],
        })
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub uptime: Duration,
    pub timings: BTreeMap<String, TimingStats>,
    pub counters: BTreeMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Uptime: {:?}", self.uptime)?;

        for (name, value) in &self.counters {
            writeln!(f, "  {}: {}", name, value)?;
        }

        for (name, stats) in &self.timings {
            writeln!(
                f,
                "  {}: count={}, avg={:?}, p50={:?}, p95={:?}",
                name, stats.count, stats.avg, stats.p50, stats.p95
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let metrics = Metrics::new();
        metrics.increment(CACHE_HITS);
        metrics.increment(CACHE_HITS);

        assert_eq!(metrics.get_counter(CACHE_HITS), 2);
        assert_eq!(metrics.get_counter(CACHE_MISSES), 0);
    }

    #[test]
    fn test_timing_stats() {
        let metrics = Metrics::new();
        metrics.record_time(ANALYSIS, Duration::from_millis(10));
        metrics.record_time(ANALYSIS, Duration::from_millis(30));
        metrics.record_time(ANALYSIS, Duration::from_millis(20));

        let stats = metrics.get_timing_stats(ANALYSIS).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, Duration::from_millis(10));
        assert_eq!(stats.max, Duration::from_millis(30));
        assert_eq!(stats.p50, Duration::from_millis(20));
        assert_eq!(stats.p95, Duration::from_millis(30));
    }

    #[test]
    fn test_summary() {
        let metrics = Metrics::new();
        metrics.increment(LIVE_CALLS);
        metrics.record_time(ANALYSIS, Duration::from_millis(50));

        let summary = metrics.summary();
        assert_eq!(summary.counters.get(LIVE_CALLS), Some(&1));
        assert!(summary.timings.contains_key(ANALYSIS));
        assert!(summary.to_string().contains("live_calls: 1"));
    }
}
