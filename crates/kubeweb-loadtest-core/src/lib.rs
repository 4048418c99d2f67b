//! Staged virtual-user load test for the kubeweb index page.
//!
//! A scenario is a [`LoadProfile`] plus a [`ThresholdSet`]; virtual users loop
//! an [`Iteration`] that the [`RampingExecutor`] schedules against a
//! [`LoadRuntime`].

pub mod config;
pub mod duration;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod profile;
pub mod reporter;
pub mod runner;
pub mod runtime;
pub mod scenario;
pub mod threshold;

pub use config::LoadTestConfig;
pub use error::{LoadTestError, LoadTestResult};
pub use executor::RampingExecutor;
pub use metrics::{MetricsCollector, MetricsSummary};
pub use profile::{LoadProfile, Stage};
pub use reporter::{ReportFormat, ResultWriter};
pub use runner::{run_load_test, run_with_runtime};
pub use runtime::ReqwestRuntime;
pub use scenario::{IndexPageIteration, Iteration, LoadRuntime, RequestOutcome};
pub use threshold::{Aggregation, Comparison, Metric, ThresholdExpr, ThresholdOutcome, ThresholdSet};
