//! Metrics collection and aggregation

use crate::threshold::{Aggregation, Metric};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Aggregated metrics from a load test run
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSummary {
    /// Wall time covered by the samples
    pub duration: Duration,

    /// Total requests attempted
    pub total_requests: usize,

    /// Requests that errored or returned a status outside 200..400
    pub failed_requests: usize,

    /// Request latencies in microseconds
    pub latencies_us: Vec<u64>,

    /// Completed iterations
    pub iterations: usize,

    /// Iteration durations in microseconds, pause included
    pub iteration_durations_us: Vec<u64>,

    /// Peak concurrent VUs
    pub vus_max: u32,

    /// Responses per HTTP status code
    pub status_counts: BTreeMap<u16, usize>,

    /// Transport errors grouped by message
    pub errors: BTreeMap<String, usize>,
}

impl MetricsSummary {
    /// Successful requests
    pub fn successful_requests(&self) -> usize {
        self.total_requests - self.failed_requests
    }

    /// Calculate error rate (0.0-1.0)
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.failed_requests as f64 / self.total_requests as f64
    }

    /// Calculate throughput (requests per second)
    pub fn throughput_rps(&self) -> f64 {
        per_second(self.total_requests, self.duration)
    }

    /// Get P50 latency
    pub fn p50_latency(&self) -> Duration {
        micros(percentile_us(&self.latencies_us, 50.0))
    }

    /// Get P90 latency
    pub fn p90_latency(&self) -> Duration {
        micros(percentile_us(&self.latencies_us, 90.0))
    }

    /// Get P95 latency
    pub fn p95_latency(&self) -> Duration {
        micros(percentile_us(&self.latencies_us, 95.0))
    }

    /// Get P99 latency
    pub fn p99_latency(&self) -> Duration {
        micros(percentile_us(&self.latencies_us, 99.0))
    }

    /// Get max latency
    pub fn max_latency(&self) -> Duration {
        Duration::from_micros(self.latencies_us.iter().copied().max().unwrap_or(0))
    }

    /// Value a threshold on `metric` compares against.
    ///
    /// Trend values are in milliseconds. Aggregations a metric kind does not
    /// support yield 0; thresholds reject them at load time.
    pub fn aggregate(&self, metric: Metric, aggregation: Aggregation) -> f64 {
        match metric {
            Metric::HttpReqDuration => trend(&self.latencies_us, aggregation),
            Metric::IterationDuration => trend(&self.iteration_durations_us, aggregation),
            Metric::HttpReqFailed => match aggregation {
                Aggregation::Rate => self.error_rate(),
                _ => 0.0,
            },
            Metric::HttpReqs => counter(self.total_requests, self.duration, aggregation),
            Metric::Iterations => counter(self.iterations, self.duration, aggregation),
            Metric::VusMax => match aggregation {
                Aggregation::Max => f64::from(self.vus_max),
                _ => 0.0,
            },
        }
    }
}

fn per_second(count: usize, duration: Duration) -> f64 {
    let secs = duration.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    count as f64 / secs
}

fn counter(count: usize, duration: Duration, aggregation: Aggregation) -> f64 {
    match aggregation {
        Aggregation::Count => count as f64,
        Aggregation::Rate => per_second(count, duration),
        _ => 0.0,
    }
}

fn trend(samples_us: &[u64], aggregation: Aggregation) -> f64 {
    if samples_us.is_empty() {
        return 0.0;
    }
    let us = match aggregation {
        Aggregation::Avg => samples_us.iter().sum::<u64>() as f64 / samples_us.len() as f64,
        Aggregation::Min => samples_us.iter().copied().min().unwrap_or(0) as f64,
        Aggregation::Max => samples_us.iter().copied().max().unwrap_or(0) as f64,
        Aggregation::Med => percentile_us(samples_us, 50.0),
        Aggregation::Percentile(p) => percentile_us(samples_us, p),
        Aggregation::Rate | Aggregation::Count => return 0.0,
    };
    us / 1000.0
}

/// Calculate a percentile (0-100] over unsorted samples.
///
/// Interpolates linearly between the two samples around rank
/// `p / 100 * (n - 1)`, so `med` of an even-sized set is the mean of the
/// middle pair.
fn percentile_us(samples: &[u64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();

    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    sorted[lower] as f64 + (sorted[upper] as f64 - sorted[lower] as f64) * weight
}

fn micros(us: f64) -> Duration {
    Duration::from_nanos((us * 1000.0).round() as u64)
}

/// Metrics collector for real-time metrics gathering
#[derive(Debug)]
pub struct MetricsCollector {
    start_time: Instant,
    summary: MetricsSummary,
}

impl MetricsCollector {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            summary: MetricsSummary::default(),
        }
    }

    /// Record a request that got a passing response
    pub fn record_success(&mut self, latency: Duration, status: u16) {
        self.summary.total_requests += 1;
        self.summary.latencies_us.push(latency.as_micros() as u64);
        *self.summary.status_counts.entry(status).or_default() += 1;
    }

    /// Record a failed request; `status` is absent when no response arrived
    pub fn record_failure(&mut self, latency: Duration, status: Option<u16>, error: Option<String>) {
        self.summary.total_requests += 1;
        self.summary.failed_requests += 1;
        self.summary.latencies_us.push(latency.as_micros() as u64);
        if let Some(status) = status {
            *self.summary.status_counts.entry(status).or_default() += 1;
        }
        if let Some(error) = error {
            *self.summary.errors.entry(error).or_default() += 1;
        }
    }

    /// Record a completed iteration
    pub fn record_iteration(&mut self, duration: Duration) {
        self.summary.iterations += 1;
        self.summary
            .iteration_durations_us
            .push(duration.as_micros() as u64);
    }

    /// Track the number of concurrently running VUs
    pub fn observe_vus(&mut self, active: u32) {
        self.summary.vus_max = self.summary.vus_max.max(active);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSummary {
        let mut summary = self.summary.clone();
        summary.duration = self.start_time.elapsed();
        summary
    }

    /// Finalize metrics collection
    pub fn finalize(mut self) -> MetricsSummary {
        self.summary.duration = self.start_time.elapsed();
        self.summary
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_error_rate() {
        let metrics = MetricsSummary {
            total_requests: 100,
            failed_requests: 2,
            ..Default::default()
        };

        assert_eq!(metrics.error_rate(), 0.02);
        assert_eq!(metrics.successful_requests(), 98);
        assert_eq!(MetricsSummary::default().error_rate(), 0.0);
    }

    #[test]
    fn test_metrics_throughput() {
        let metrics = MetricsSummary {
            duration: Duration::from_secs(10),
            total_requests: 1000,
            ..Default::default()
        };

        assert_eq!(metrics.throughput_rps(), 100.0);
        assert_eq!(metrics.aggregate(Metric::HttpReqs, Aggregation::Rate), 100.0);
        assert_eq!(metrics.aggregate(Metric::HttpReqs, Aggregation::Count), 1000.0);
    }

    #[test]
    fn test_metrics_percentiles() {
        let metrics = MetricsSummary {
            // 100 samples: 0us, 100us, ..., 9900us
            latencies_us: (0..100).map(|i| i * 100).collect(),
            ..Default::default()
        };

        assert_eq!(metrics.p50_latency(), Duration::from_micros(4950));
        assert_eq!(metrics.p95_latency(), Duration::from_micros(9405));
        assert_eq!(metrics.p99_latency(), Duration::from_micros(9801));
        assert_eq!(metrics.max_latency(), Duration::from_micros(9900));
    }

    #[test]
    fn test_percentile_interpolates_between_samples() {
        assert_eq!(percentile_us(&[400, 100, 300, 200], 50.0), 250.0);
        assert_eq!(percentile_us(&[7], 95.0), 7.0);
        assert_eq!(percentile_us(&[], 95.0), 0.0);

        // 1ms..=10ms: p(95) sits between the two slowest samples
        let samples: Vec<u64> = (1..=10).map(|ms| ms * 1000).collect();
        assert!((percentile_us(&samples, 95.0) - 9_550.0).abs() < 1e-6);
    }

    #[test]
    fn test_trend_aggregations_in_millis() {
        let metrics = MetricsSummary {
            latencies_us: vec![100_000, 200_000, 300_000, 400_000],
            ..Default::default()
        };

        let agg = |a| metrics.aggregate(Metric::HttpReqDuration, a);
        assert_eq!(agg(Aggregation::Avg), 250.0);
        assert_eq!(agg(Aggregation::Min), 100.0);
        assert_eq!(agg(Aggregation::Max), 400.0);
        assert_eq!(agg(Aggregation::Med), 250.0);
        assert!((agg(Aggregation::Percentile(95.0)) - 385.0).abs() < 1e-9);
        assert_eq!(agg(Aggregation::Percentile(100.0)), 400.0);
        assert_eq!(
            MetricsSummary::default().aggregate(Metric::IterationDuration, Aggregation::Avg),
            0.0
        );
    }

    #[tokio::test]
    async fn test_collector() {
        let mut collector = MetricsCollector::new();

        collector.record_success(Duration::from_millis(10), 200);
        collector.record_success(Duration::from_millis(20), 200);
        collector.record_failure(Duration::from_millis(100), Some(503), None);
        collector.record_failure(
            Duration::from_millis(5),
            None,
            Some("connection refused".to_string()),
        );
        collector.record_iteration(Duration::from_millis(1010));
        collector.observe_vus(3);
        collector.observe_vus(1);

        let metrics = collector.finalize();

        assert_eq!(metrics.total_requests, 4);
        assert_eq!(metrics.successful_requests(), 2);
        assert_eq!(metrics.failed_requests, 2);
        assert_eq!(metrics.error_rate(), 0.5);
        assert_eq!(metrics.status_counts.get(&200), Some(&2));
        assert_eq!(metrics.status_counts.get(&503), Some(&1));
        assert_eq!(metrics.errors.get("connection refused"), Some(&1));
        assert_eq!(metrics.iterations, 1);
        assert_eq!(metrics.vus_max, 3);
        assert_eq!(metrics.aggregate(Metric::VusMax, Aggregation::Max), 3.0);
    }
}
