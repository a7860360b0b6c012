#![forbid(unsafe_code)]

//! Test scheduler configuration.
//!
//! # Environment variables
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `RILL_MAX_FRAMES` | `max_frames` | 750 |
//! | `RILL_RUN_MAX_FRAMES` | `run_max_frames` | 1 000 000 |
//! | `RILL_FRAME_TIME_FACTOR` | `frame_time_factor` | 1 |
//! | `RILL_FLUSH_REPORT` | `report_path` | unset |
//!
//! The environment is read once per process; malformed values are ignored
//! with a warning and the default is kept.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use rill_core::scheduler::Frame;

const ENV_MAX_FRAMES: &str = "RILL_MAX_FRAMES";
const ENV_RUN_MAX_FRAMES: &str = "RILL_RUN_MAX_FRAMES";
const ENV_FRAME_TIME_FACTOR: &str = "RILL_FRAME_TIME_FACTOR";
const ENV_FLUSH_REPORT: &str = "RILL_FLUSH_REPORT";

/// Configuration for [`TestScheduler`](crate::TestScheduler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSchedulerConfig {
    /// Frames per marble character outside run mode.
    pub frame_time_factor: Frame,
    /// Frame ceiling for `flush` outside `run`.
    pub max_frames: Frame,
    /// Frame ceiling while inside `run`.
    pub run_max_frames: Frame,
    /// Append each flush report as JSONL to this file.
    pub report_path: Option<PathBuf>,
}

impl Default for TestSchedulerConfig {
    fn default() -> Self {
        Self {
            frame_time_factor: 1,
            max_frames: 750,
            run_max_frames: 1_000_000,
            report_path: None,
        }
    }
}

/// Rejected configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// Field the value was meant for.
    pub field: &'static str,
    /// The raw value.
    pub value: String,
    /// What was expected instead.
    pub message: &'static str,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({})", self.field, self.value, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Configuration parsed from the environment, with any rejected values.
#[derive(Debug, Clone)]
pub struct ConfigParse {
    /// Resulting configuration.
    pub config: TestSchedulerConfig,
    /// Values that could not be applied.
    pub errors: Vec<ConfigError>,
}

impl TestSchedulerConfig {
    /// Defaults with environment overrides applied. Cached per process.
    #[must_use]
    pub fn from_env() -> Self {
        static CACHED: OnceLock<TestSchedulerConfig> = OnceLock::new();
        CACHED
            .get_or_init(|| {
                let parsed = Self::from_env_with_diagnostics();
                for err in &parsed.errors {
                    tracing::warn!(%err, "ignoring test scheduler override");
                }
                parsed.config
            })
            .clone()
    }

    /// Parse environment overrides, reporting rejected values.
    #[must_use]
    pub fn from_env_with_diagnostics() -> ConfigParse {
        from_env_with(|key| env::var(key).ok())
    }

    /// Set the frame time factor (at least 1).
    #[must_use]
    pub fn with_frame_time_factor(mut self, factor: Frame) -> Self {
        self.frame_time_factor = factor.max(1);
        self
    }

    /// Set the frame ceiling.
    #[must_use]
    pub fn with_max_frames(mut self, max_frames: Frame) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Set the frame ceiling used inside `run`.
    #[must_use]
    pub fn with_run_max_frames(mut self, max_frames: Frame) -> Self {
        self.run_max_frames = max_frames;
        self
    }

    /// Append flush reports to `path`.
    #[must_use]
    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }
}

fn parse_frames(value: &str) -> Option<Frame> {
    value.trim().parse::<Frame>().ok().filter(|frames| *frames > 0)
}

fn from_env_with<F>(mut get: F) -> ConfigParse
where
    F: FnMut(&str) -> Option<String>,
{
    let mut config = TestSchedulerConfig::default();
    let mut errors = Vec::new();

    if let Some(value) = get(ENV_MAX_FRAMES) {
        match parse_frames(&value) {
            Some(parsed) => config.max_frames = parsed,
            None => errors.push(ConfigError {
                field: "max_frames",
                value,
                message: "expected positive integer",
            }),
        }
    }

    if let Some(value) = get(ENV_RUN_MAX_FRAMES) {
        match parse_frames(&value) {
            Some(parsed) => config.run_max_frames = parsed,
            None => errors.push(ConfigError {
                field: "run_max_frames",
                value,
                message: "expected positive integer",
            }),
        }
    }

    if let Some(value) = get(ENV_FRAME_TIME_FACTOR) {
        match parse_frames(&value) {
            Some(parsed) => config.frame_time_factor = parsed,
            None => errors.push(ConfigError {
                field: "frame_time_factor",
                value,
                message: "expected positive integer",
            }),
        }
    }

    if let Some(value) = get(ENV_FLUSH_REPORT)
        && !value.trim().is_empty()
    {
        config.report_path = Some(PathBuf::from(value));
    }

    ConfigParse { config, errors }
}
