//! Configuration management for kubeweb load tests
//!
//! Sources, highest priority first:
//! 1. Environment variables (`KUBEWEB_LOADTEST_TARGET__URL=...`)
//! 2. Config file named by `KUBEWEB_LOADTEST_CONFIG` (or passed to `load_with`)
//! 3. `./config/loadtest.{yaml,toml,json}`
//! 4. Built-in defaults: the three-stage kubeweb scenario

use crate::duration::serde_str;
use crate::error::{LoadTestError, LoadTestResult};
use crate::profile::{LoadProfile, Stage};
use crate::threshold::ThresholdSet;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, Map};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const ENV_PREFIX: &str = "KUBEWEB_LOADTEST";
pub const CONFIG_PATH_ENV: &str = "KUBEWEB_LOADTEST_CONFIG";
pub const DEFAULT_TARGET_URL: &str = "http://130.185.123.245:30080/";

const LOCAL_CONFIG_STEM: &str = "./config/loadtest";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoadTestConfig {
    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub scenario: ScenarioConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LoadTestConfig {
    /// Load configuration from every source and validate it.
    pub fn load() -> LoadTestResult<Self> {
        let config_path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        Self::load_with(config_path.as_deref())
    }

    /// Layered load with `path` in place of `$KUBEWEB_LOADTEST_CONFIG`.
    /// Environment overrides still apply on top of it.
    pub fn load_with(path: Option<&Path>) -> LoadTestResult<Self> {
        Self::layered(Path::new(LOCAL_CONFIG_STEM), path, None)
    }

    /// Load a single explicit file on top of the built-in defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> LoadTestResult<Self> {
        let builder = Self::set_defaults(Config::builder())?
            .add_source(File::from(path.as_ref()).required(true));

        Self::finish(builder)
    }

    /// Later sources win: defaults, local file, explicit file, environment.
    /// `env` replaces the process environment when given.
    fn layered(
        local: &Path,
        path: Option<&Path>,
        env: Option<Map<String, String>>,
    ) -> LoadTestResult<Self> {
        let mut builder = Self::set_defaults(Config::builder())?
            .add_source(File::from(local).required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        Self::finish(builder)
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> LoadTestResult<Self> {
        let config: LoadTestConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Set default values for scalar options
    fn set_defaults(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        builder
            .set_default("target.url", DEFAULT_TARGET_URL)?
            .set_default("target.timeout_secs", 60)?
            .set_default("scenario.start_vus", 0)?
            .set_default("scenario.pause", "1s")?
            .set_default("scenario.graceful_stop", "30s")?
            .set_default("executor.tick_ms", 100)?
            .set_default("logging.level", "info")
    }

    /// Validate configuration values
    pub fn validate(&self) -> LoadTestResult<()> {
        self.target.validate()?;
        self.scenario.profile().validate()?;

        if self.executor.tick_ms == 0 {
            return Err(LoadTestError::Config(ConfigError::Message(
                "executor.tick_ms must be > 0".to_string(),
            )));
        }

        if let Err(e) = EnvFilter::try_new(&self.logging.level) {
            return Err(LoadTestError::Config(ConfigError::Message(format!(
                "logging.level `{}`: {}",
                self.logging.level, e
            ))));
        }

        Ok(())
    }
}

/// Endpoint under test
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    /// Absolute http(s) URL requested by every iteration
    #[serde(default = "default_url")]
    pub url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl TargetConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> LoadTestResult<()> {
        let url = reqwest::Url::parse(&self.url)
            .map_err(|e| LoadTestError::InvalidTarget(format!("`{}`: {}", self.url, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(LoadTestError::InvalidTarget(format!(
                "`{}`: scheme must be http or https",
                self.url
            )));
        }
        if url.host_str().is_none() {
            return Err(LoadTestError::InvalidTarget(format!(
                "`{}`: missing host",
                self.url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(LoadTestError::InvalidTarget(
                "timeout_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Load profile, thresholds and per-iteration pacing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub start_vus: u32,

    #[serde(default = "default_stages")]
    pub stages: Vec<Stage>,

    #[serde(default)]
    pub thresholds: ThresholdSet,

    /// Pause after each request
    #[serde(with = "serde_str", default = "default_pause")]
    pub pause: Duration,

    /// Time in-flight iterations get to finish once the last stage ends
    #[serde(with = "serde_str", default = "default_graceful_stop")]
    pub graceful_stop: Duration,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            start_vus: 0,
            stages: default_stages(),
            thresholds: ThresholdSet::default(),
            pause: default_pause(),
            graceful_stop: default_graceful_stop(),
        }
    }
}

impl ScenarioConfig {
    pub fn profile(&self) -> LoadProfile {
        LoadProfile {
            start_vus: self.start_vus,
            stages: self.stages.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutorConfig {
    /// How often the VU target is recomputed, in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

impl ExecutorConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level or filter directives, e.g. "info" or "kubeweb_loadtest_core=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_url() -> String {
    DEFAULT_TARGET_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_stages() -> Vec<Stage> {
    LoadProfile::default().stages
}

fn default_pause() -> Duration {
    Duration::from_secs(1)
}

fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}

fn default_tick_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold::Metric;
    use std::io::Write;

    fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = LoadTestConfig::default();

        assert_eq!(config.target.url, DEFAULT_TARGET_URL);
        assert_eq!(config.target.timeout(), Duration::from_secs(60));
        assert_eq!(config.scenario.profile(), LoadProfile::default());
        assert_eq!(config.scenario.thresholds, ThresholdSet::default());
        assert_eq!(config.scenario.pause, Duration::from_secs(1));
        assert_eq!(config.executor.tick(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_overrides() {
        let file = write_config(
            ".yaml",
            r#"
target:
  url: "http://127.0.0.1:8080/healthz/"
scenario:
  stages:
    - duration: 30s
      target: 5
    - duration: 1m30s
      target: 0
  thresholds:
    http_req_duration: ["p(99)<800", "avg<300"]
  pause: 500ms
"#,
        );

        let config = LoadTestConfig::from_file(file.path()).unwrap();

        assert_eq!(config.target.url, "http://127.0.0.1:8080/healthz/");
        assert_eq!(config.target.timeout_secs, 60);
        assert_eq!(
            config.scenario.stages,
            vec![
                Stage::new(Duration::from_secs(30), 5),
                Stage::new(Duration::from_secs(90), 0),
            ]
        );
        assert_eq!(config.scenario.thresholds.get(Metric::HttpReqDuration).len(), 2);
        assert!(config.scenario.thresholds.get(Metric::HttpReqFailed).is_empty());
        assert_eq!(config.scenario.pause, Duration::from_millis(500));
        assert_eq!(config.scenario.graceful_stop, Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_keeps_default_scenario() {
        let file = write_config(".toml", "[target]\ntimeout_secs = 5\n");

        let config = LoadTestConfig::from_file(file.path()).unwrap();

        assert_eq!(config.target.timeout_secs, 5);
        assert_eq!(config.scenario.profile().targets(), vec![20, 60, 0]);
    }

    #[test]
    fn test_negative_duration_rejected_at_load() {
        let file = write_config(
            ".yaml",
            "scenario:\n  stages:\n    - duration: -1m\n      target: 20\n",
        );

        let err = LoadTestConfig::from_file(file.path()).unwrap_err();
        assert!(err.is_load_time());
        assert!(err.to_string().contains("negative"), "{}", err);
    }

    #[test]
    fn test_negative_target_rejected_at_load() {
        let file = write_config(
            ".yaml",
            "scenario:\n  stages:\n    - duration: 1m\n      target: -20\n",
        );

        assert!(LoadTestConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_bad_threshold_rejected_at_load() {
        let file = write_config(
            ".json",
            r#"{"scenario": {"thresholds": {"http_req_failed": ["p(95)<0.01"]}}}"#,
        );

        let err = LoadTestConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("http_req_failed"), "{}", err);
    }

    #[test]
    fn test_invalid_target_rejected() {
        let mut config = LoadTestConfig::default();

        config.target.url = "ftp://example.com/".to_string();
        assert!(matches!(config.validate(), Err(LoadTestError::InvalidTarget(_))));

        config.target.url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.target.url = DEFAULT_TARGET_URL.to_string();
        config.target.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_length_profile_rejected() {
        let file = write_config(
            ".json",
            r#"{"scenario": {"stages": [{"duration": "0s", "target": 5}]}}"#,
        );

        assert!(matches!(
            LoadTestConfig::from_file(file.path()),
            Err(LoadTestError::InvalidProfile(_))
        ));
    }

    fn env(vars: &[(&str, &str)]) -> Option<Map<String, String>> {
        Some(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_env_overrides_use_single_underscore_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let vars = env(&[
            ("KUBEWEB_LOADTEST_TARGET__URL", "http://10.9.9.9:1234/"),
            ("KUBEWEB_LOADTEST_TARGET__TIMEOUT_SECS", "12"),
            ("KUBEWEB_LOADTEST_SCENARIO__PAUSE", "250ms"),
        ]);

        let config = LoadTestConfig::layered(&dir.path().join("loadtest"), None, vars).unwrap();

        assert_eq!(config.target.url, "http://10.9.9.9:1234/");
        assert_eq!(config.target.timeout_secs, 12);
        assert_eq!(config.scenario.pause, Duration::from_millis(250));
        assert_eq!(config.scenario.profile(), LoadProfile::default());
    }

    #[test]
    fn test_layer_precedence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("loadtest.yaml"),
            "target:\n  timeout_secs: 7\nscenario:\n  pause: 2s\n",
        )
        .unwrap();
        let explicit = write_config(".yaml", "target:\n  timeout_secs: 42\n");
        let local = dir.path().join("loadtest");

        let config = LoadTestConfig::layered(&local, None, env(&[])).unwrap();
        assert_eq!(config.target.timeout_secs, 7);

        let config = LoadTestConfig::layered(&local, Some(explicit.path()), env(&[])).unwrap();
        assert_eq!(config.target.timeout_secs, 42);
        assert_eq!(config.scenario.pause, Duration::from_secs(2));

        let vars = env(&[("KUBEWEB_LOADTEST_TARGET__TIMEOUT_SECS", "3")]);
        let config = LoadTestConfig::layered(&local, Some(explicit.path()), vars).unwrap();
        assert_eq!(config.target.timeout_secs, 3);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");

        let result = LoadTestConfig::layered(&dir.path().join("loadtest"), Some(&missing), env(&[]));

        assert!(matches!(result, Err(LoadTestError::Config(_))));
    }

    #[test]
    fn test_invalid_log_filter_rejected() {
        let mut config = LoadTestConfig::default();

        config.logging.level = "kubeweb_loadtest=debug,warn".to_string();
        assert!(config.validate().is_ok());

        config.logging.level = "kubeweb_loadtest=loud".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logging.level"), "{}", err);
    }

    #[test]
    fn test_overflowing_profile_rejected_at_load() {
        let file = write_config(
            ".yaml",
            "scenario:\n  stages:\n    - duration: 5000000000000000h\n      target: 5\n    - duration: 5000000000000000h\n      target: 0\n",
        );

        assert!(matches!(
            LoadTestConfig::from_file(file.path()),
            Err(LoadTestError::InvalidProfile(_))
        ));
    }
}
