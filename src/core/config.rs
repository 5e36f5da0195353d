/*!
 * Monitoring Configuration
 *
 * Read-only settings consumed at service initialization. Loaded from JSON,
 * from `CORE_MONITOR_*` environment variables, or built in code.
 */

use super::errors::{MonitoringError, MonitoringResult};
use super::limits::{
    DEFAULT_MEMORY_CHANNEL_CAPACITY, DEFAULT_SYSTEM_MEMORY_BASELINE, FUNCTION_REPORT_THRESHOLD,
    INTERVAL_NORMAL,
};
use crate::monitoring::events::Severity;
use crate::monitoring::sampler::CategoryFlags;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const ENV_PREFIX: &str = "CORE_MONITOR_";

/// Settings for the dispatcher, tracers and sampler
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Optional file channel target
    pub log_path: Option<PathBuf>,
    /// Global dispatcher minimum severity
    pub min_severity: Severity,
    /// Capacity of the default in-memory channel
    pub memory_channel_capacity: usize,
    /// Start the metrics sampler
    pub sampler_enabled: bool,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "sampling_interval_ms")]
    pub sampling_interval: Duration,
    pub categories: CategoryFlags,
    /// Record a backtrace for every tracked allocation
    pub capture_callsites: bool,
    pub track_system_allocations: bool,
    /// Call tracer starts enabled
    pub tracing_enabled: bool,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "function_report_threshold_ms")]
    pub function_report_threshold: Duration,
    /// Total memory assumed by the high-usage alert (bytes)
    pub system_memory_baseline: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            min_severity: Severity::Info,
            memory_channel_capacity: DEFAULT_MEMORY_CHANNEL_CAPACITY,
            sampler_enabled: false,
            sampling_interval: INTERVAL_NORMAL,
            categories: CategoryFlags::all(),
            capture_callsites: true,
            track_system_allocations: false,
            tracing_enabled: true,
            function_report_threshold: FUNCTION_REPORT_THRESHOLD,
            system_memory_baseline: DEFAULT_SYSTEM_MEMORY_BASELINE,
        }
    }
}

impl MonitoringConfig {
    /// Quiet preset for tests: no file, no sampler, no callsite capture
    pub const fn minimal() -> Self {
        Self {
            log_path: None,
            min_severity: Severity::Trace,
            memory_channel_capacity: DEFAULT_MEMORY_CHANNEL_CAPACITY,
            sampler_enabled: false,
            sampling_interval: INTERVAL_NORMAL,
            categories: CategoryFlags::none(),
            capture_callsites: false,
            track_system_allocations: false,
            tracing_enabled: true,
            function_report_threshold: FUNCTION_REPORT_THRESHOLD,
            system_memory_baseline: DEFAULT_SYSTEM_MEMORY_BASELINE,
        }
    }

    pub fn from_json_str(json: &str) -> MonitoringResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by any `CORE_MONITOR_*` variables present
    pub fn from_env() -> MonitoringResult<Self> {
        let mut config = Self::default();

        if let Some(path) = env_var("LOG_PATH") {
            config.log_path = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        if let Some(value) = env_var("MIN_SEVERITY") {
            config.min_severity = Severity::from_str(&value)?;
        }
        if let Some(value) = env_var("MEMORY_CHANNEL_CAPACITY") {
            config.memory_channel_capacity = parse_number("MEMORY_CHANNEL_CAPACITY", &value)?;
        }
        if let Some(value) = env_var("SAMPLER_ENABLED") {
            config.sampler_enabled = parse_bool("SAMPLER_ENABLED", &value)?;
        }
        if let Some(value) = env_var("SAMPLING_INTERVAL_MS") {
            let ms: u64 = parse_number("SAMPLING_INTERVAL_MS", &value)?;
            config.sampling_interval = Duration::from_millis(ms);
        }
        if let Some(value) = env_var("CATEGORIES") {
            config.categories = CategoryFlags::from_str(&value)?;
        }
        if let Some(value) = env_var("CAPTURE_CALLSITES") {
            config.capture_callsites = parse_bool("CAPTURE_CALLSITES", &value)?;
        }
        if let Some(value) = env_var("TRACING_ENABLED") {
            config.tracing_enabled = parse_bool("TRACING_ENABLED", &value)?;
        }
        if let Some(value) = env_var("MEMORY_BASELINE_BYTES") {
            config.system_memory_baseline = parse_number("MEMORY_BASELINE_BYTES", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MonitoringResult<()> {
        if self.memory_channel_capacity == 0 {
            return Err(MonitoringError::Configuration(
                "memory_channel_capacity must be greater than zero".into(),
            ));
        }
        if self.sampling_interval.is_zero() {
            return Err(MonitoringError::Configuration(
                "sampling_interval_ms must be greater than zero".into(),
            ));
        }
        if self.system_memory_baseline == 0 {
            return Err(MonitoringError::Configuration(
                "system_memory_baseline must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{key}")).ok()
}

fn parse_bool(key: &str, value: &str) -> MonitoringResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(MonitoringError::Configuration(format!(
            "{ENV_PREFIX}{key}: expected a boolean, got {other:?}"
        ))),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> MonitoringResult<T> {
    value.trim().parse().map_err(|_| {
        MonitoringError::Configuration(format!("{ENV_PREFIX}{key}: expected a number, got {value:?}"))
    })
}
