//! Loader for `sweep.yaml` with environment overlays.
//!
//! Sources are merged in the order they are added, later sources winning,
//! with `SWEEP__`-prefixed environment variables applied last
//! (`SWEEP__DRIVER__HEADLESS=true` sets `driver.headless`). String values may
//! reference other environment variables as `${VAR}`; references are expanded
//! recursively after merging. Every section is optional.
//!
//! ```yaml
//! version: "1"
//! driver:
//!   webdriver_url: http://localhost:9515
//!   headless: true
//! timing:
//!   action_delay_ms: 800
//!   jitter_ms: 400
//! logging:
//!   format: json
//! behaviors:
//!   - name: instagramUserBehavior
//!     enabled: false
//! ```
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sweep_common::observability::{LogConfig, LogFormat};
use sweep_core::delay::Pacing;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

/// File name looked up by [`SweepConfigLoader::discover`].
pub const CONFIG_FILE_NAME: &str = "sweep.yaml";

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Source(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub version: Option<String>,
    pub driver: DriverConfig,
    pub timing: TimingConfig,
    pub logging: LoggingConfig,
    pub behaviors: Vec<BehaviorToggle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".into(),
            headless: false,
            window_width: 1280,
            window_height: 800,
            user_agent: None,
        }
    }
}

/// Pacing and wait limits, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub action_delay_ms: u64,
    pub jitter_ms: u64,
    pub poll_interval_ms: u64,
    pub max_wait_ms: u64,
    pub element_timeout_ms: u64,
    /// Upper bound on auto-scroll steps; unset means scroll until the page stops growing.
    pub max_scrolls: Option<u32>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            action_delay_ms: 1000,
            jitter_ms: 0,
            poll_interval_ms: 500,
            max_wait_ms: 60_000,
            element_timeout_ms: 15_000,
            max_scrolls: None,
        }
    }
}

impl TimingConfig {
    pub fn pacing(&self) -> Pacing {
        Pacing::new(
            Duration::from_millis(self.action_delay_ms),
            Duration::from_millis(self.jitter_ms),
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub stderr: bool,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            format: LogFormat::Text,
            stderr: false,
            filter: "info".into(),
        }
    }
}

impl LoggingConfig {
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            log_dir: self.dir.clone(),
            emit_stderr: self.stderr,
            format: self.format,
            default_filter: self.filter.clone(),
            ..LogConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorToggle {
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl SweepConfig {
    /// Behaviors not listed are enabled.
    pub fn is_enabled(&self, behavior: &str) -> bool {
        self.behaviors
            .iter()
            .find(|b| b.name == behavior)
            .is_none_or(|b| b.enabled)
    }

    /// Effective configuration as YAML, for `--print-config`.
    pub fn to_yaml(&self) -> Result<String, LoadError> {
        serde_yaml::to_string(self).map_err(|e| LoadError::Invalid(e.to_string()))
    }

    fn validate(&self) -> Result<(), LoadError> {
        if self.timing.poll_interval_ms == 0 {
            return Err(LoadError::Invalid("timing.poll_interval_ms must be greater than zero".into()));
        }
        if self.driver.window_width == 0 || self.driver.window_height == 0 {
            return Err(LoadError::Invalid("driver window size must be non-zero".into()));
        }
        if self.driver.webdriver_url.trim().is_empty() {
            return Err(LoadError::Invalid("driver.webdriver_url is empty".into()));
        }
        Ok(())
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder over the `config` crate (YAML sources + env overrides).
pub struct SweepConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for SweepConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SweepConfigLoader {
    /// Defaults only; add files or snippets before calling [`load`](Self::load).
    ///
    /// ```
    /// use sweep_config::SweepConfigLoader;
    ///
    /// let config = SweepConfigLoader::new().load().expect("defaults are valid");
    /// assert_eq!(config.driver.webdriver_url, "http://localhost:9515");
    /// assert_eq!(config.timing.action_delay_ms, 1000);
    /// assert!(config.behaviors.is_empty());
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a required YAML/TOML/JSON file; the format is inferred from the suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that is skipped when missing.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Look for `sweep.yaml` in the user config dir, then the working directory.
    pub fn discover(self) -> Self {
        let mut loader = self;
        if let Some(dir) = dirs::config_dir() {
            loader = loader.with_optional_file(dir.join("sweep").join(CONFIG_FILE_NAME));
        }
        loader.with_optional_file(CONFIG_FILE_NAME)
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use sweep_config::SweepConfigLoader;
    ///
    /// let cfg = SweepConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// version: "test"
    /// timing:
    ///   poll_interval_ms: 2500
    /// behaviors:
    ///   - name: autoscroll
    ///     enabled: false
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.version.as_deref(), Some("test"));
    /// assert_eq!(cfg.timing.poll_interval_ms, 2500);
    /// assert!(!cfg.is_enabled("autoscroll"));
    /// assert!(cfg.is_enabled("deathImitatesLanguageBehavior"));
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Merge the sources, apply `SWEEP__` overrides, expand `${VAR}` and validate.
    pub fn load(self) -> Result<SweepConfig, LoadError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("SWEEP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: SweepConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed.validate()?;
        Ok(typed)
    }
}
