//! Report generation for load test results

use crate::error::LoadTestResult;
use crate::metrics::MetricsSummary;
use crate::threshold::ThresholdOutcome;
use std::fmt::Write as _;
use std::path::Path;

/// Report format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Markdown,
    Json,
}

/// Result writer for generating load test reports
#[derive(Debug, Clone)]
pub struct ResultWriter {
    pub metrics: MetricsSummary,
    outcomes: Vec<ThresholdOutcome>,
    scenario_name: String,
    target_url: String,
}

impl ResultWriter {
    /// Create new result writer
    pub fn new(
        scenario_name: impl Into<String>,
        target_url: impl Into<String>,
        metrics: MetricsSummary,
        outcomes: Vec<ThresholdOutcome>,
    ) -> Self {
        Self {
            metrics,
            outcomes,
            scenario_name: scenario_name.into(),
            target_url: target_url.into(),
        }
    }

    pub fn outcomes(&self) -> &[ThresholdOutcome] {
        &self.outcomes
    }

    /// Check if every threshold passed
    pub fn passes(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    /// Get failure summary
    pub fn failure_summary(&self) -> String {
        let failures: Vec<String> = self
            .outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| {
                format!(
                    "{} `{}` crossed (observed {:.4})",
                    o.metric, o.expression, o.observed
                )
            })
            .collect();

        if failures.is_empty() {
            return "All thresholds passed".to_string();
        }

        failures.join("\n")
    }

    /// Write report to file
    pub fn write_report(&self, path: impl AsRef<Path>, format: ReportFormat) -> LoadTestResult<()> {
        let content = match format {
            ReportFormat::Markdown => self.generate_markdown(),
            ReportFormat::Json => self.generate_json()?,
        };

        std::fs::write(path, content)?;
        Ok(())
    }

    /// End-of-run summary for the terminal
    pub fn render_summary(&self) -> String {
        let m = &self.metrics;
        let mut out = String::new();

        let _ = writeln!(out, "scenario: {} -> {}", self.scenario_name, self.target_url);
        let _ = writeln!(
            out,
            "  http_reqs.............: {} ({:.1}/s)",
            m.total_requests,
            m.throughput_rps()
        );
        let _ = writeln!(
            out,
            "  http_req_failed.......: {:.2}% ({} of {})",
            m.error_rate() * 100.0,
            m.failed_requests,
            m.total_requests
        );
        let _ = writeln!(
            out,
            "  http_req_duration.....: p50={:.2}ms p90={:.2}ms p95={:.2}ms p99={:.2}ms max={:.2}ms",
            ms(m.p50_latency()),
            ms(m.p90_latency()),
            ms(m.p95_latency()),
            ms(m.p99_latency()),
            ms(m.max_latency())
        );
        let _ = writeln!(out, "  iterations............: {}", m.iterations);
        let _ = writeln!(out, "  vus_max...............: {}", m.vus_max);

        for o in &self.outcomes {
            let _ = writeln!(
                out,
                "  {} {} {} (observed {:.4})",
                if o.passed { "✓" } else { "✗" },
                o.metric,
                o.expression,
                o.observed
            );
        }

        out
    }

    /// Generate Markdown report
    fn generate_markdown(&self) -> String {
        let pass_emoji = if self.passes() { "✅" } else { "❌" };
        let m = &self.metrics;

        let mut thresholds = String::new();
        if self.outcomes.is_empty() {
            thresholds.push_str("No thresholds configured\n");
        } else {
            thresholds.push_str("| Metric | Threshold | Observed | Status |\n");
            thresholds.push_str("|--------|-----------|----------|--------|\n");
            for o in &self.outcomes {
                let _ = writeln!(
                    thresholds,
                    "| {} | `{}` | {:.4} | {} |",
                    o.metric,
                    o.expression,
                    o.observed,
                    if o.passed { "✅" } else { "❌" }
                );
            }
        }

        let statuses = if m.status_counts.is_empty() {
            "No responses received".to_string()
        } else {
            m.status_counts
                .iter()
                .map(|(status, count)| format!("- **{}**: {}", status, count))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let errors = if m.errors.is_empty() {
            "No errors recorded".to_string()
        } else {
            m.errors
                .iter()
                .map(|(error, count)| format!("- {} × {}", count, error))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            r#"# Load Test Report: {}

**Target**: {}

**Status**: {} {}

---

## Summary

- **Duration**: {:.1} seconds
- **Total Requests**: {}
- **Successful**: {}
- **Failed**: {}
- **Error Rate**: {:.4}%
- **Iterations**: {}
- **Peak VUs**: {}

---

## Latency

| Percentile | Latency |
|------------|---------|
| P50 | {:.2}ms |
| P90 | {:.2}ms |
| P95 | {:.2}ms |
| P99 | {:.2}ms |
| Max | {:.2}ms |

---

## Throughput

- **Average**: {:.1} req/s

---

## Thresholds

{}
---

## Status Codes

{}

---

## Errors

{}

---

**Report Generated**: {}
"#,
            self.scenario_name,
            self.target_url,
            pass_emoji,
            if self.passes() { "PASSED" } else { "FAILED" },
            m.duration.as_secs_f64(),
            m.total_requests,
            m.successful_requests(),
            m.failed_requests,
            m.error_rate() * 100.0,
            m.iterations,
            m.vus_max,
            ms(m.p50_latency()),
            ms(m.p90_latency()),
            ms(m.p95_latency()),
            ms(m.p99_latency()),
            ms(m.max_latency()),
            m.throughput_rps(),
            thresholds,
            statuses,
            errors,
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        )
    }

    /// Generate JSON report
    fn generate_json(&self) -> LoadTestResult<String> {
        let m = &self.metrics;
        let report = serde_json::json!({
            "scenario": self.scenario_name,
            "target": self.target_url,
            "status": if self.passes() { "passed" } else { "failed" },
            "duration_seconds": m.duration.as_secs_f64(),
            "total_requests": m.total_requests,
            "successful_requests": m.successful_requests(),
            "failed_requests": m.failed_requests,
            "error_rate": m.error_rate(),
            "iterations": m.iterations,
            "vus_max": m.vus_max,
            "latency_ms": {
                "p50": ms(m.p50_latency()),
                "p90": ms(m.p90_latency()),
                "p95": ms(m.p95_latency()),
                "p99": ms(m.p99_latency()),
                "max": ms(m.max_latency()),
            },
            "throughput_rps": m.throughput_rps(),
            "status_codes": m.status_counts,
            "thresholds": {
                "passed": self.passes(),
                "results": self.outcomes,
            },
            "errors": m.errors,
            "generated_at": chrono::Utc::now().to_rfc3339(),
        });

        Ok(serde_json::to_string_pretty(&report)?)
    }
}

fn ms(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
