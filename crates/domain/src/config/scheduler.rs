use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// C5 main-loop and recurring-dispatcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the main loop polls for due jobs and the recurring
    /// dispatcher scans rules for fire windows, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Base delay, in seconds, used by the scheduler-level stage-retry
    /// reschedule (`scheduled_at = now + delay * retry_count`).
    #[serde(default = "default_stage_retry_delay_secs")]
    pub stage_retry_delay_secs: u64,

    /// Maximum number of stage retries before a job is marked failed.
    #[serde(default = "default_max_stage_retries")]
    pub max_stage_retries: u32,

    /// Cap on how many missed firings a `catch_up` recurring rule expands
    /// in one dispatcher pass, so a long-paused rule can't flood the job
    /// store on resume.
    #[serde(default = "default_max_missed_catchup")]
    pub max_missed_catchup: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            stage_retry_delay_secs: default_stage_retry_delay_secs(),
            max_stage_retries: default_max_stage_retries(),
            max_missed_catchup: default_max_missed_catchup(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_stage_retry_delay_secs() -> u64 {
    30
}

fn default_max_stage_retries() -> u32 {
    3
}

fn default_max_missed_catchup() -> u32 {
    5
}
