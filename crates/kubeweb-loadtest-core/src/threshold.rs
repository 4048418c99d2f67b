//! Threshold expressions (`p(95)<500`, `rate<0.01`) and their evaluation.

use crate::error::{LoadTestError, LoadTestResult};
use crate::metrics::MetricsSummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How samples of a metric are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Distribution of values (latencies)
    Trend,
    /// Fraction of non-zero samples
    Rate,
    /// Monotonic count
    Counter,
    /// Last/peak observed value
    Gauge,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trend => "trend",
            Self::Rate => "rate",
            Self::Counter => "counter",
            Self::Gauge => "gauge",
        }
    }

    fn supports(self, aggregation: &Aggregation) -> bool {
        match self {
            Self::Trend => matches!(
                aggregation,
                Aggregation::Avg
                    | Aggregation::Min
                    | Aggregation::Max
                    | Aggregation::Med
                    | Aggregation::Percentile(_)
            ),
            Self::Rate => matches!(aggregation, Aggregation::Rate),
            Self::Counter => matches!(aggregation, Aggregation::Count | Aggregation::Rate),
            Self::Gauge => matches!(aggregation, Aggregation::Max),
        }
    }
}

/// Metrics the runtime records and thresholds may refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    /// Request latency in milliseconds
    HttpReqDuration,
    /// Whether a request failed (transport error or status outside 200..400)
    HttpReqFailed,
    /// Number of requests issued
    HttpReqs,
    /// Whole-iteration latency in milliseconds, pause included
    IterationDuration,
    /// Number of completed iterations
    Iterations,
    /// Peak concurrent VUs
    VusMax,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::HttpReqDuration,
        Metric::HttpReqFailed,
        Metric::HttpReqs,
        Metric::IterationDuration,
        Metric::Iterations,
        Metric::VusMax,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::HttpReqDuration => "http_req_duration",
            Self::HttpReqFailed => "http_req_failed",
            Self::HttpReqs => "http_reqs",
            Self::IterationDuration => "iteration_duration",
            Self::Iterations => "iterations",
            Self::VusMax => "vus_max",
        }
    }

    pub fn kind(self) -> MetricKind {
        match self {
            Self::HttpReqDuration | Self::IterationDuration => MetricKind::Trend,
            Self::HttpReqFailed => MetricKind::Rate,
            Self::HttpReqs | Self::Iterations => MetricKind::Counter,
            Self::VusMax => MetricKind::Gauge,
        }
    }
}

impl FromStr for Metric {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| LoadTestError::UnknownMetric(s.to_string()))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Aggregation applied to a metric before comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    /// Percentile in `(0, 100]`
    Percentile(f64),
    Rate,
    Count,
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avg" => Ok(Self::Avg),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "med" => Ok(Self::Med),
            "rate" => Ok(Self::Rate),
            "count" => Ok(Self::Count),
            _ => {
                let inner = s
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| format!("unknown aggregation `{}`", s))?;
                let p: f64 = inner
                    .trim()
                    .parse()
                    .map_err(|_| format!("percentile `{}` is not a number", inner))?;
                if !p.is_finite() || p <= 0.0 || p > 100.0 {
                    return Err(format!("percentile {} must be in (0, 100]", p));
                }
                Ok(Self::Percentile(p))
            }
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::Percentile(p) => write!(f, "p({})", p),
            Self::Rate => f.write_str("rate"),
            Self::Count => f.write_str("count"),
        }
    }
}

/// Comparison operator of a threshold expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    // Two-character operators first so `<=` is not read as `<`.
    const TOKENS: [(&'static str, Comparison); 6] = [
        ("<=", Comparison::Le),
        (">=", Comparison::Ge),
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    pub fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Self::Lt => observed < bound,
            Self::Le => observed <= bound,
            Self::Gt => observed > bound,
            Self::Ge => observed >= bound,
            Self::Eq => observed == bound,
            Self::Ne => observed != bound,
        }
    }
}

/// A single `<aggregation> <op> <value>` assertion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub aggregation: Aggregation,
    pub op: Comparison,
    pub value: f64,
}

impl ThresholdExpr {
    pub fn parse(expression: &str) -> LoadTestResult<Self> {
        let invalid = |reason: String| LoadTestError::invalid_threshold(expression, reason);

        let op_start = expression
            .find(['<', '>', '=', '!'])
            .ok_or_else(|| invalid("missing comparison operator".to_string()))?;
        let rest = &expression[op_start..];
        let (token, op) = Comparison::TOKENS
            .iter()
            .find(|(token, _)| rest.starts_with(token))
            .copied()
            .ok_or_else(|| invalid(format!("unknown operator in `{}`", rest)))?;

        let aggregation = expression[..op_start]
            .trim()
            .parse::<Aggregation>()
            .map_err(invalid)?;

        let raw_value = rest[token.len()..].trim();
        let value: f64 = raw_value
            .parse()
            .map_err(|_| invalid(format!("`{}` is not a number", raw_value)))?;
        if !value.is_finite() {
            return Err(invalid("threshold value must be finite".to_string()));
        }

        Ok(Self {
            aggregation,
            op,
            value,
        })
    }

    /// Whether an aggregated observation satisfies this expression
    pub fn check(&self, observed: f64) -> bool {
        self.op.holds(observed, self.value)
    }
}

impl FromStr for ThresholdExpr {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.aggregation, self.op.as_str(), self.value)
    }
}

/// Result of evaluating one expression at run end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub expression: String,
    pub observed: f64,
    pub passed: bool,
}

/// Thresholds keyed by metric. Any failing expression fails the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Vec<String>>",
    into = "BTreeMap<String, Vec<String>>"
)]
pub struct ThresholdSet {
    entries: BTreeMap<Metric, Vec<ThresholdExpr>>,
}

impl Default for ThresholdSet {
    /// p95 request latency under 500ms and fewer than 1% failed requests.
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            Metric::HttpReqDuration,
            vec![ThresholdExpr {
                aggregation: Aggregation::Percentile(95.0),
                op: Comparison::Lt,
                value: 500.0,
            }],
        );
        entries.insert(
            Metric::HttpReqFailed,
            vec![ThresholdExpr {
                aggregation: Aggregation::Rate,
                op: Comparison::Lt,
                value: 0.01,
            }],
        );
        Self { entries }
    }
}

impl ThresholdSet {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Add an expression after checking it suits the metric kind.
    pub fn insert(&mut self, metric: Metric, expr: ThresholdExpr) -> LoadTestResult<()> {
        let kind = metric.kind();
        if !kind.supports(&expr.aggregation) {
            return Err(LoadTestError::IncompatibleAggregation {
                metric: metric.name().to_string(),
                kind: kind.as_str(),
                aggregation: expr.aggregation.to_string(),
            });
        }
        self.entries.entry(metric).or_default().push(expr);
        Ok(())
    }

    pub fn get(&self, metric: Metric) -> &[ThresholdExpr] {
        self.entries.get(&metric).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, &ThresholdExpr)> {
        self.entries
            .iter()
            .flat_map(|(metric, exprs)| exprs.iter().map(move |e| (*metric, e)))
    }

    /// Evaluate every expression against the aggregated run metrics.
    pub fn evaluate(&self, summary: &MetricsSummary) -> Vec<ThresholdOutcome> {
        self.iter()
            .map(|(metric, expr)| {
                let observed = summary.aggregate(metric, expr.aggregation);
                ThresholdOutcome {
                    metric: metric.name().to_string(),
                    expression: expr.to_string(),
                    observed,
                    passed: expr.check(observed),
                }
            })
            .collect()
    }
}

impl TryFrom<BTreeMap<String, Vec<String>>> for ThresholdSet {
    type Error = LoadTestError;

    fn try_from(raw: BTreeMap<String, Vec<String>>) -> Result<Self, Self::Error> {
        let mut set = Self::empty();
        for (name, expressions) in raw {
            let metric: Metric = name.parse()?;
            for expression in expressions {
                set.insert(metric, ThresholdExpr::parse(&expression)?)?;
            }
        }
        Ok(set)
    }
}

impl From<ThresholdSet> for BTreeMap<String, Vec<String>> {
    fn from(set: ThresholdSet) -> Self {
        set.entries
            .into_iter()
            .map(|(metric, exprs)| {
                (
                    metric.name().to_string(),
                    exprs.iter().map(ToString::to_string).collect(),
                )
            })
            .collect()
    }
}
