use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Calendar configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// C4 conflict-detection and utilization tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Minimum gap, in hours, required between two reserved slots.
    #[serde(default = "default_min_gap_hours")]
    pub min_gap_hours: u32,

    /// Maximum number of videos that may be scheduled on a single day.
    #[serde(default = "default_max_videos_per_day")]
    pub max_videos_per_day: u32,

    /// Hours of the day (0-23) considered a preferred publishing window.
    #[serde(default = "default_preferred_hours")]
    pub preferred_hours: Vec<u32>,

    /// Specific calendar dates on which no slot may be reserved (e.g.
    /// holidays), not weekday indices.
    #[serde(default)]
    pub blackout_days: Vec<NaiveDate>,

    /// Whether to additionally reject slots whose topic is too similar
    /// to another slot already reserved nearby.
    #[serde(default)]
    pub detect_topic_conflicts: bool,

    /// Jaccard similarity threshold (whitespace tokenization) above
    /// which two topics are considered conflicting.
    #[serde(default = "default_topic_similarity_threshold")]
    pub topic_similarity_threshold: f64,

    /// Notional minutes of publishing capacity per day, used to compute
    /// `utilization_percent` in calendar views.
    #[serde(default = "default_daily_capacity_minutes")]
    pub daily_capacity_minutes: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            min_gap_hours: default_min_gap_hours(),
            max_videos_per_day: default_max_videos_per_day(),
            preferred_hours: default_preferred_hours(),
            blackout_days: Vec::new(),
            detect_topic_conflicts: false,
            topic_similarity_threshold: default_topic_similarity_threshold(),
            daily_capacity_minutes: default_daily_capacity_minutes(),
        }
    }
}

fn default_min_gap_hours() -> u32 {
    2
}

fn default_max_videos_per_day() -> u32 {
    3
}

fn default_preferred_hours() -> Vec<u32> {
    vec![9, 12, 15, 18]
}

fn default_topic_similarity_threshold() -> f64 {
    0.6
}

fn default_daily_capacity_minutes() -> u32 {
    480
}
