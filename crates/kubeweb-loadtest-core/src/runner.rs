//! Wires a validated configuration to the executor and evaluates thresholds.

use crate::config::LoadTestConfig;
use crate::error::LoadTestResult;
use crate::executor::RampingExecutor;
use crate::metrics::MetricsCollector;
use crate::reporter::ResultWriter;
use crate::runtime::ReqwestRuntime;
use crate::scenario::{IndexPageIteration, Iteration, LoadRuntime};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const SCENARIO_NAME: &str = "kubeweb index page";

/// Run the configured scenario against its target over real HTTP.
pub async fn run_load_test(config: &LoadTestConfig) -> LoadTestResult<ResultWriter> {
    let collector = Arc::new(RwLock::new(MetricsCollector::new()));
    let runtime = ReqwestRuntime::new(config.target.timeout(), Arc::clone(&collector))?;
    run_with_runtime(config, Arc::new(runtime), collector).await
}

/// Run the configured scenario on a caller-supplied runtime.
///
/// `collector` must be the one the runtime records into.
pub async fn run_with_runtime(
    config: &LoadTestConfig,
    runtime: Arc<dyn LoadRuntime>,
    collector: Arc<RwLock<MetricsCollector>>,
) -> LoadTestResult<ResultWriter> {
    config.validate()?;

    let iteration: Arc<dyn Iteration> = Arc::new(
        IndexPageIteration::new(config.target.url.clone()).with_pause(config.scenario.pause),
    );

    info!(
        scenario = SCENARIO_NAME,
        url = %config.target.url,
        thresholds = config.scenario.thresholds.iter().count(),
        "starting load test"
    );

    let executor = RampingExecutor::new(config.scenario.profile(), collector)
        .with_tick(config.executor.tick())
        .with_graceful_stop(config.scenario.graceful_stop);
    let metrics = executor.run(iteration, runtime).await?;

    let outcomes = config.scenario.thresholds.evaluate(&metrics);
    for outcome in outcomes.iter().filter(|o| !o.passed) {
        warn!(
            metric = %outcome.metric,
            threshold = %outcome.expression,
            observed = outcome.observed,
            "threshold crossed"
        );
    }

    Ok(ResultWriter::new(
        SCENARIO_NAME,
        config.target.url.clone(),
        metrics,
        outcomes,
    ))
}
