use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Bounded-concurrency execution settings for C3.
///
/// The executor's semaphore is the only admission gate for running
/// jobs; everything above `max_concurrent_jobs` queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum number of jobs that may execute concurrently.
    /// Clamped to the range `1..=20`.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Default retry ceiling applied when a job doesn't specify its own.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Default per-attempt timeout in seconds, applied when a job
    /// doesn't specify its own.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Number of completed executions kept in the in-memory history
    /// ring before the oldest entries are evicted.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Base delay, in seconds, fed to `RetryStrategy::delay` for `fixed`,
    /// `linear`, and `exponential` strategies.
    #[serde(default = "default_retry_base_delay_secs")]
    pub retry_base_delay_secs: u64,

    /// Ceiling, in seconds, that every computed retry delay is clamped to.
    #[serde(default = "default_retry_max_delay_secs")]
    pub retry_max_delay_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            default_max_retries: default_max_retries(),
            default_timeout_secs: default_timeout_secs(),
            history_capacity: default_history_capacity(),
            retry_base_delay_secs: default_retry_base_delay_secs(),
            retry_max_delay_secs: default_retry_max_delay_secs(),
        }
    }
}

impl ExecutorConfig {
    /// Clamp `max_concurrent_jobs` to the allowed range `1..=20`.
    pub fn clamped(&self) -> Self {
        Self {
            max_concurrent_jobs: self.max_concurrent_jobs.clamp(1, 20),
            ..self.clone()
        }
    }
}

fn default_max_concurrent_jobs() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_history_capacity() -> usize {
    2000
}

fn default_retry_base_delay_secs() -> u64 {
    5
}

fn default_retry_max_delay_secs() -> u64 {
    300
}
