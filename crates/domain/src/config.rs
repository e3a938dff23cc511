mod calendar;
mod executor;
mod observability;
mod scheduler;
mod storage;

pub use calendar::*;
pub use executor::*;
pub use observability::*;
pub use scheduler::*;
pub use storage::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        // Executor bounds.
        if self.executor.max_concurrent_jobs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "executor.max_concurrent_jobs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.executor.max_concurrent_jobs > 20 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "executor.max_concurrent_jobs".into(),
                message: "values above 20 will be clamped at runtime".into(),
            });
        }
        if self.executor.default_timeout_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "executor.default_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.executor.history_capacity == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "executor.history_capacity".into(),
                message: "must be greater than 0".into(),
            });
        }

        // Scheduler bounds.
        if self.scheduler.poll_interval_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "scheduler.poll_interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // Calendar bounds.
        if self.calendar.max_videos_per_day == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "calendar.max_videos_per_day".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.calendar.daily_capacity_minutes == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "calendar.daily_capacity_minutes".into(),
                message: "must be greater than 0".into(),
            });
        }
        for hour in &self.calendar.preferred_hours {
            if *hour > 23 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "calendar.preferred_hours".into(),
                    message: format!("hour {hour} is not a valid hour of day (0-23)"),
                });
            }
        }
        for day in &self.calendar.blackout_days {
            if *day > 6 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "calendar.blackout_days".into(),
                    message: format!("day {day} is not a valid day of week (0-6)"),
                });
            }
        }
        if !(0.0..=1.0).contains(&self.calendar.topic_similarity_threshold) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "calendar.topic_similarity_threshold".into(),
                message: "must be between 0.0 and 1.0".into(),
            });
        }

        // Storage.
        if self.storage.root.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "storage.root".into(),
                message: "must not be empty".into(),
            });
        }

        // Observability.
        if let Some(endpoint) = &self.observability.otlp_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "observability.otlp_endpoint".into(),
                    message: format!(
                        "otlp_endpoint must start with http:// or https:// (got \"{endpoint}\")"
                    ),
                });
            }
        }
        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "observability.sample_rate".into(),
                message: "must be between 0.0 and 1.0".into(),
            });
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
