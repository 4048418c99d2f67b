//! The contract between a scenario and the runtime that drives it.
//!
//! A runtime owns request execution, metric recording and scheduling. A
//! scenario only supplies an [`Iteration`] that the runtime invokes once per
//! virtual-user loop.

use async_trait::async_trait;
use std::time::Duration;

/// What happened to one request, as seen by the iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    /// HTTP status, absent when no response arrived
    pub status: Option<u16>,

    /// Time until the full response body was received (or the error surfaced)
    pub latency: Duration,

    /// Transport error message, if any
    pub error: Option<String>,
}

impl RequestOutcome {
    /// A request fails on transport errors and on statuses outside `200..400`.
    pub fn failed(&self) -> bool {
        self.error.is_some() || self.status.map_or(true, is_failed_status)
    }
}

/// Statuses counted as failed requests
pub fn is_failed_status(status: u16) -> bool {
    !(200..400).contains(&status)
}

/// Services a runtime exposes to iterations.
///
/// Implementations record every request into their metrics and never
/// surface request errors to the caller.
#[async_trait]
pub trait LoadRuntime: Send + Sync {
    /// Issue a GET request and record its latency and outcome.
    async fn get(&self, url: &str) -> RequestOutcome;

    /// Suspend the calling VU without blocking other VUs.
    async fn sleep(&self, duration: Duration);
}

/// Unit of work a virtual user repeats until the runtime stops it.
#[async_trait]
pub trait Iteration: Send + Sync {
    async fn run(&self, runtime: &dyn LoadRuntime);
}

/// Fetch the index page, then pause.
#[derive(Debug, Clone)]
pub struct IndexPageIteration {
    url: String,
    pause: Duration,
}

impl IndexPageIteration {
    pub const DEFAULT_PAUSE: Duration = Duration::from_secs(1);

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pause: Self::DEFAULT_PAUSE,
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }
}

#[async_trait]
impl Iteration for IndexPageIteration {
    async fn run(&self, runtime: &dyn LoadRuntime) {
        // failures are already recorded by the runtime
        let _ = runtime.get(&self.url).await;
        runtime.sleep(self.pause).await;
    }
}
