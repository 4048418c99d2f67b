//! End-to-end runs against a local axum server

use axum::{http::StatusCode, routing::get, Router};
use kubeweb_loadtest_core::{
    run_load_test, LoadRuntime, LoadTestConfig, MetricsCollector, ReqwestRuntime, Stage,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

/// Initialize tracing for tests (call once)
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("kubeweb_loadtest_core=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Two VUs for two seconds with a short pause
fn short_config(addr: SocketAddr) -> LoadTestConfig {
    let mut config = LoadTestConfig::default();
    config.target.url = format!("http://{}/", addr);
    config.target.timeout_secs = 5;
    config.scenario.start_vus = 2;
    config.scenario.stages = vec![Stage::new(Duration::from_secs(2), 2)];
    config.scenario.pause = Duration::from_millis(200);
    config.scenario.graceful_stop = Duration::from_secs(5);
    config.executor.tick_ms = 50;
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_healthy_target_passes_thresholds() {
    init_tracing();
    let addr = serve(Router::new().route("/", get(|| async { "kubeweb" }))).await;

    let writer = run_load_test(&short_config(addr)).await.unwrap();

    assert!(writer.passes(), "{}", writer.failure_summary());
    let metrics = &writer.metrics;
    assert!(metrics.total_requests >= 4, "requests: {}", metrics.total_requests);
    assert_eq!(metrics.failed_requests, 0);
    assert_eq!(metrics.vus_max, 2);
    assert_eq!(metrics.status_counts.get(&200), Some(&metrics.total_requests));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_errors_fail_the_run() {
    init_tracing();
    let addr = serve(Router::new().route(
        "/",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    ))
    .await;

    let writer = run_load_test(&short_config(addr)).await.unwrap();

    assert!(!writer.passes());
    assert!(writer.failure_summary().contains("http_req_failed"));
    assert_eq!(writer.metrics.error_rate(), 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_target_is_recorded_not_fatal() {
    init_tracing();
    // grab a free port, then close it
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let writer = run_load_test(&short_config(addr)).await.unwrap();

    assert!(!writer.passes());
    let metrics = &writer.metrics;
    assert!(metrics.total_requests > 0);
    assert_eq!(metrics.failed_requests, metrics.total_requests);
    assert!(metrics.status_counts.is_empty());
    assert!(metrics.errors.contains_key("connection failed"));
}

#[tokio::test]
async fn test_reqwest_runtime_records_each_request() {
    let addr = serve(Router::new().route("/", get(|| async { "kubeweb" }))).await;
    let collector = Arc::new(RwLock::new(MetricsCollector::new()));
    let runtime = ReqwestRuntime::new(Duration::from_secs(5), Arc::clone(&collector)).unwrap();

    let outcome = runtime.get(&format!("http://{}/", addr)).await;

    assert_eq!(outcome.status, Some(200));
    assert!(!outcome.failed());
    let summary = collector.read().await.snapshot();
    assert_eq!(summary.total_requests, 1);
    assert_eq!(summary.latencies_us.len(), 1);
}

#[tokio::test]
async fn test_reqwest_runtime_timeout_is_a_failed_sample() {
    let addr = serve(Router::new().route(
        "/",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            "late"
        }),
    ))
    .await;
    let collector = Arc::new(RwLock::new(MetricsCollector::new()));
    let runtime = ReqwestRuntime::new(Duration::from_millis(200), Arc::clone(&collector)).unwrap();

    let outcome = runtime.get(&format!("http://{}/", addr)).await;

    assert!(outcome.failed());
    assert_eq!(outcome.error.as_deref(), Some("request timeout"));
    assert_eq!(collector.read().await.snapshot().failed_requests, 1);
}
