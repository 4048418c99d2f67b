//! Ramping virtual-user executor

use crate::error::LoadTestResult;
use crate::metrics::{MetricsCollector, MetricsSummary};
use crate::profile::LoadProfile;
use crate::scenario::{Iteration, LoadRuntime};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// What the controller tells the VUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VuSignal {
    /// VUs with an id below this may start iterations
    target: u32,
    /// Run is over, exit after the current iteration
    stopping: bool,
}

/// Drives VUs according to a [`LoadProfile`].
///
/// VUs are spawned lazily the first time the profile reaches them and parked
/// (not killed) when it drops below them, so ramp-down only takes effect
/// between iterations.
pub struct RampingExecutor {
    profile: LoadProfile,
    tick: Duration,
    graceful_stop: Duration,
    collector: Arc<RwLock<MetricsCollector>>,
}

impl RampingExecutor {
    pub fn new(profile: LoadProfile, collector: Arc<RwLock<MetricsCollector>>) -> Self {
        Self {
            profile,
            tick: Duration::from_millis(100),
            graceful_stop: Duration::from_secs(30),
            collector,
        }
    }

    /// How often the VU target is recomputed
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// How long in-flight iterations may run once the profile is over
    pub fn with_graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    pub fn profile(&self) -> &LoadProfile {
        &self.profile
    }

    /// Run the profile to completion and return the collected metrics.
    pub async fn run(
        &self,
        iteration: Arc<dyn Iteration>,
        runtime: Arc<dyn LoadRuntime>,
    ) -> LoadTestResult<MetricsSummary> {
        self.profile.validate()?;

        info!(
            profile = %self.profile.description(),
            graceful_stop = ?self.graceful_stop,
            "starting ramping executor"
        );

        let total = self.profile.total_duration();
        let (signal_tx, signal_rx) = watch::channel(VuSignal {
            target: 0,
            stopping: false,
        });
        let active = Arc::new(AtomicU32::new(0));
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        let start = Instant::now();
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_report = Duration::ZERO;

        loop {
            ticker.tick().await;
            let elapsed = start.elapsed();
            if elapsed >= total {
                break;
            }

            let target = self.profile.target_at(elapsed);

            while (handles.len() as u32) < target {
                let id = handles.len() as u32;
                debug!(vu = id, "spawning virtual user");
                handles.push(tokio::spawn(vu_loop(
                    id,
                    signal_rx.clone(),
                    Arc::clone(&iteration),
                    Arc::clone(&runtime),
                    Arc::clone(&self.collector),
                    Arc::clone(&active),
                )));
            }

            signal_tx.send_if_modified(|signal| {
                if signal.target == target {
                    return false;
                }
                signal.target = target;
                true
            });

            if elapsed - last_report >= REPORT_INTERVAL {
                last_report = elapsed;
                let snapshot = self.collector.read().await.snapshot();
                info!(
                    elapsed_secs = elapsed.as_secs(),
                    stage = ?self.profile.stage_at(elapsed),
                    vus = target,
                    requests = snapshot.total_requests,
                    p95_ms = snapshot.p95_latency().as_secs_f64() * 1000.0,
                    error_pct = snapshot.error_rate() * 100.0,
                    "progress"
                );
            }
        }

        signal_tx.send_replace(VuSignal {
            target: 0,
            stopping: true,
        });
        self.drain(&mut handles).await;

        let summary = self.collector.read().await.snapshot();
        info!(
            requests = summary.total_requests,
            failed = summary.failed_requests,
            iterations = summary.iterations,
            vus_max = summary.vus_max,
            "executor finished"
        );
        Ok(summary)
    }

    /// Wait for VUs to finish their current iteration, aborting stragglers.
    async fn drain(&self, handles: &mut [JoinHandle<()>]) {
        let joined = tokio::time::timeout(
            self.graceful_stop,
            futures::future::join_all(handles.iter_mut()),
        )
        .await;

        match joined {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        if e.is_panic() {
                            warn!(error = %e, "virtual user panicked");
                        }
                    }
                }
            }
            Err(_) => {
                let remaining = handles.iter().filter(|h| !h.is_finished()).count();
                warn!(
                    remaining,
                    graceful_stop = ?self.graceful_stop,
                    "aborting virtual users still running after graceful stop"
                );
                for handle in handles.iter() {
                    handle.abort();
                }
            }
        }
    }
}

async fn vu_loop(
    id: u32,
    mut signal: watch::Receiver<VuSignal>,
    iteration: Arc<dyn Iteration>,
    runtime: Arc<dyn LoadRuntime>,
    collector: Arc<RwLock<MetricsCollector>>,
    active: Arc<AtomicU32>,
) {
    loop {
        // park until scheduled or stopped
        loop {
            let current = *signal.borrow_and_update();
            if current.stopping {
                return;
            }
            if current.target > id {
                break;
            }
            if signal.changed().await.is_err() {
                return;
            }
        }

        let started = Instant::now();
        let running = active.fetch_add(1, Ordering::SeqCst) + 1;
        collector.write().await.observe_vus(running);

        iteration.run(runtime.as_ref()).await;

        active.fetch_sub(1, Ordering::SeqCst);
        collector.write().await.record_iteration(started.elapsed());
    }
}
