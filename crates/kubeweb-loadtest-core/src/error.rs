use thiserror::Error;

/// Canonical error type for scenario loading and execution.
#[derive(Debug, Error)]
pub enum LoadTestError {
    /// A duration string could not be parsed.
    #[error("invalid duration `{input}`: {reason}")]
    InvalidDuration {
        /// Raw input as written in the configuration.
        input: String,
        /// Why the input was rejected.
        reason: String,
    },

    /// A threshold expression could not be parsed.
    #[error("invalid threshold `{expression}`: {reason}")]
    InvalidThreshold {
        /// Raw expression as written in the configuration.
        expression: String,
        /// Why the expression was rejected.
        reason: String,
    },

    /// A threshold refers to a metric the runtime does not produce.
    #[error("unknown metric `{0}`")]
    UnknownMetric(String),

    /// A threshold uses an aggregation the metric kind cannot provide.
    #[error("aggregation `{aggregation}` is not available for {kind} metric `{metric}`")]
    IncompatibleAggregation {
        /// Metric name.
        metric: String,
        /// Metric kind (`trend`, `rate`, ...).
        kind: &'static str,
        /// Offending aggregation.
        aggregation: String,
    },

    /// The stage list cannot be executed.
    #[error("invalid load profile: {0}")]
    InvalidProfile(String),

    /// The request target is not usable.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Configuration sources could not be read or deserialized.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error while writing reports.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Report serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The executor could not complete the run.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl LoadTestError {
    /// Creates an `InvalidDuration` variant.
    #[must_use]
    pub fn invalid_duration(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidThreshold` variant.
    #[must_use]
    pub fn invalid_threshold(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidThreshold {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    /// Returns true when the error was raised while loading configuration,
    /// as opposed to while running.
    pub fn is_load_time(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Serialization(_) | Self::Runtime(_))
    }
}

/// Convenient result alias for load test operations.
pub type LoadTestResult<T> = Result<T, LoadTestError>;
